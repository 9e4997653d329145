use crate::blob::UploadOptions;
use crate::error::ServiceError;
use crate::identity::{self, Principal};
use crate::multipart::FormData;
use crate::types::{
    MemberStatus, PaperStandard, Project, ProjectMembership, ProjectRole, ProjectStatus,
    ProjectSummary, UploadedFile,
};
use crate::AppState;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_DOCUMENT_TYPES: [&str; 3] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const PROJECT_TYPE: &str = "independent";

#[derive(Debug, Clone, Default)]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: String,
    /// Paper standard as submitted: IMRAD, IAAA or custom
    pub research_type: String,
    pub program: Option<String>,
    pub course: Option<String>,
    pub section: Option<String>,
    /// JSON array of strings
    pub keywords: Option<String>,
    pub document: Option<UploadedFile>,
}

impl CreateProjectRequest {
    /// Read the project form. The description may arrive as `abstract` or
    /// `description`.
    pub fn from_form(mut form: FormData) -> Self {
        let text = |name: &str| form.text(name).map(|v| v.to_string());
        let description = text("abstract").or_else(|| text("description"));
        Self {
            title: text("title").unwrap_or_default(),
            description: description.unwrap_or_default(),
            research_type: text("researchType").unwrap_or_default(),
            program: text("program"),
            course: text("course"),
            section: text("section"),
            keywords: text("keywords"),
            document: form.take_file("file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectOutcome {
    pub success: bool,
    pub project_id: String,
    pub project_code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A membership of the caller together with the project it points at
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipView {
    pub membership_id: String,
    pub project_id: String,
    pub role: ProjectRole,
    pub status: MemberStatus,
    pub created_at: String,
    pub responded_at: Option<String>,
    pub project: Option<ProjectSummary>,
}

/// Create a project owned by the caller, with an optional document
pub async fn create_project(
    state: &AppState,
    bearer: Option<&str>,
    req: CreateProjectRequest,
) -> Result<CreateProjectOutcome, ServiceError> {
    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;

    let title = req.title.trim();
    let description = req.description.trim();
    if title.is_empty() || description.is_empty() {
        return Err(ServiceError::Validation(
            "Title and description are required".to_string(),
        ));
    }

    let paper_standard: PaperStandard = req.research_type.trim().parse().map_err(|_| {
        ServiceError::Validation(
            "Valid paper standard is required (IMRAD, IAAA, or custom)".to_string(),
        )
    })?;

    if let Some(document) = &req.document {
        validate_document(document)?;
    }

    let keywords = parse_keywords(req.keywords.as_deref());

    // Step 1: identifiers
    let project_id = Uuid::new_v4().to_string();
    let project_code = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // Step 2: project row and code reservation
    let project = Project {
        id: project_id.clone(),
        project_code: project_code.clone(),
        title: title.to_string(),
        description: description.to_string(),
        abstract_text: description.to_string(),
        program: trimmed(req.program),
        course: trimmed(req.course),
        section: trimmed(req.section),
        project_type: PROJECT_TYPE.to_string(),
        status: ProjectStatus::Draft,
        paper_standard,
        created_by: principal.id.clone(),
        keywords,
        document_reference: None,
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    state.records.insert_project(&project).await.map_err(|e| {
        tracing::error!("Project insert failed for {}: {}", principal.id, e);
        ServiceError::Upstream(format!("Failed to create project: {}", e))
    })?;
    tracing::info!("Created project {} for {}", project_id, principal.id);

    // Step 3: document
    if let Some(document) = req.document {
        if let Err(warning) = attach_document(state, &project_id, document).await {
            return Ok(CreateProjectOutcome {
                success: true,
                project_id,
                project_code,
                message: "Project created successfully".to_string(),
                warning: Some(warning),
            });
        }
    }

    // Step 4: creator membership
    let leader = ProjectMembership {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.clone(),
        user_id: principal.id.clone(),
        role: ProjectRole::Leader,
        status: MemberStatus::Accepted,
        created_at: now.clone(),
        responded_at: Some(now),
    };
    if let Err(e) = state.records.insert_membership(&leader).await {
        tracing::error!(
            "Could not add {} as leader of {}: {}",
            principal.id,
            project_id,
            e
        );
    }

    Ok(CreateProjectOutcome {
        success: true,
        project_id,
        project_code,
        message: "Project created successfully".to_string(),
        warning: None,
    })
}

/// Upload the document and point the project at it. Returns the warning to
/// surface when the upload itself fails.
async fn attach_document(
    state: &AppState,
    project_id: &str,
    document: UploadedFile,
) -> Result<(), String> {
    let bucket = &state.config.project_documents_bucket;
    let path = format!(
        "projects/{}/{}_{}",
        project_id,
        Utc::now().timestamp_millis(),
        sanitize_file_name(&document.file_name)
    );

    if let Err(e) = state
        .blobs
        .upload(
            bucket,
            &path,
            document.bytes,
            &document.content_type,
            UploadOptions { overwrite: false },
        )
        .await
    {
        tracing::warn!("Document upload failed for project {}: {}", project_id, e);
        return Err(format!("Project created but document upload failed: {}", e));
    }

    let url = state.blobs.public_url(bucket, &path);
    if let Err(e) = state
        .records
        .set_document_reference(project_id, &url, &Utc::now().to_rfc3339())
        .await
    {
        tracing::error!("Could not store document reference for {}: {}", project_id, e);
    }
    Ok(())
}

fn validate_document(document: &UploadedFile) -> Result<(), ServiceError> {
    if !ALLOWED_DOCUMENT_TYPES.contains(&document.content_type.as_str()) {
        return Err(ServiceError::Validation(
            "Only PDF, DOC, and DOCX files are allowed".to_string(),
        ));
    }
    if document.size() > MAX_DOCUMENT_BYTES {
        return Err(ServiceError::Validation(
            "File size must be less than 10MB".to_string(),
        ));
    }
    Ok(())
}

/// Keywords arrive as a JSON array; anything else is an empty list
pub fn parse_keywords(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_default()
}

/// Replace every character outside `[a-zA-Z0-9.-]` with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Projects the caller has accepted membership in
pub async fn list_projects(
    state: &AppState,
    bearer: Option<&str>,
) -> Result<Vec<MembershipView>, ServiceError> {
    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;
    memberships_with_status(state, &principal, MemberStatus::Accepted).await
}

pub(crate) async fn memberships_with_status(
    state: &AppState,
    principal: &Principal,
    status: MemberStatus,
) -> Result<Vec<MembershipView>, ServiceError> {
    let memberships = state
        .records
        .list_memberships(&principal.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list memberships for {}: {}", principal.id, e);
            ServiceError::Upstream(format!("Failed to load memberships: {}", e))
        })?;

    let mut views = Vec::new();
    for membership in memberships.into_iter().filter(|m| m.status == status) {
        let project = state
            .records
            .get_project(&membership.project_id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load project {}: {}", membership.project_id, e);
                ServiceError::Upstream(format!("Failed to load project: {}", e))
            })?;

        views.push(MembershipView {
            membership_id: membership.id,
            project_id: membership.project_id,
            role: membership.role,
            status: membership.status,
            created_at: membership.created_at,
            responded_at: membership.responded_at,
            project: project.as_ref().map(ProjectSummary::from),
        });
    }

    Ok(views)
}
