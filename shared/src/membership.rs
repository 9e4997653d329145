use crate::error::{ServiceError, StoreError};
use crate::identity;
use crate::types::{MemberStatus, ProjectMembership, ProjectRole, ProjectSummary};
use crate::AppState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ALREADY_MEMBER: &str = "You are already a member of this project";
const PROJECT_NOT_FOUND: &str = "Invalid project code. Project not found.";
const NO_ROLE: &str = "Unable to determine user role";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinProjectRequest {
    #[serde(default)]
    pub project_code: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinProjectOutcome {
    pub success: bool,
    pub message: String,
    pub project: ProjectSummary,
    /// Present when a new membership row was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<ProjectMembership>,
}

impl JoinProjectOutcome {
    fn joined(project: ProjectSummary, member: Option<ProjectMembership>) -> Self {
        Self {
            success: true,
            message: "Successfully joined the project".to_string(),
            project,
            member,
        }
    }
}

/// Join a project by its shareable code
pub async fn join_project(
    state: &AppState,
    bearer: Option<&str>,
    req: JoinProjectRequest,
) -> Result<JoinProjectOutcome, ServiceError> {
    let project_code = req.project_code.trim();
    let user_id = req.user_id.trim();

    if project_code.is_empty() || user_id.is_empty() {
        return Err(ServiceError::Validation(
            "Project code and user ID are required".to_string(),
        ));
    }

    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;
    if principal.id != user_id {
        tracing::warn!(
            "Join rejected: token belongs to {} but request names {}",
            principal.id,
            user_id
        );
        return Err(ServiceError::unauthorized());
    }

    // Step 1: project
    let project = match state.records.find_project_by_code(project_code).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            tracing::info!("No project with code {}", project_code);
            return Err(ServiceError::NotFound(PROJECT_NOT_FOUND.to_string()));
        }
        Err(e) => {
            tracing::error!("Project lookup failed for code {}: {}", project_code, e);
            return Err(ServiceError::NotFound(format!(
                "{} Details: {}",
                PROJECT_NOT_FOUND, e
            )));
        }
    };

    // Step 2: system role
    let system_role = match state.records.get_role(user_id).await {
        Ok(Some(role)) => role.role,
        Ok(None) => return Err(ServiceError::Validation(NO_ROLE.to_string())),
        Err(e) => {
            tracing::error!("Role lookup failed for {}: {}", user_id, e);
            return Err(ServiceError::Validation(format!("{}. Details: {}", NO_ROLE, e)));
        }
    };

    // Step 3: project role
    let project_role = ProjectRole::for_system_role(&system_role);

    // Step 4: membership
    let existing = state
        .records
        .find_membership(&project.id, user_id)
        .await
        .map_err(|e| {
            tracing::error!("Membership lookup failed for {} in {}: {}", user_id, project.id, e);
            ServiceError::Upstream(format!("Failed to check membership status: {}", e))
        })?;

    let now = Utc::now().to_rfc3339();
    let summary = ProjectSummary::from(&project);

    match existing {
        Some(membership) if membership.status == MemberStatus::Accepted => {
            Err(ServiceError::Conflict(ALREADY_MEMBER.to_string()))
        }
        Some(membership) => {
            state
                .records
                .accept_membership(&project.id, user_id, &now)
                .await
                .map_err(join_failed)?;

            tracing::info!(
                "User {} accepted pending membership in {} as {}",
                user_id,
                project.id,
                membership.role.as_str()
            );
            Ok(JoinProjectOutcome::joined(summary, None))
        }
        None => {
            let member = ProjectMembership {
                id: Uuid::new_v4().to_string(),
                project_id: project.id.clone(),
                user_id: user_id.to_string(),
                role: project_role,
                status: MemberStatus::Accepted,
                created_at: now.clone(),
                responded_at: Some(now),
            };

            match state.records.insert_membership(&member).await {
                Ok(()) => {}
                // Lost a race with a concurrent join by the same user
                Err(StoreError::Conflict(_)) => {
                    return Err(ServiceError::Conflict(ALREADY_MEMBER.to_string()))
                }
                Err(e) => return Err(join_failed(e)),
            }

            tracing::info!(
                "User {} joined project {} as {}",
                user_id,
                project.id,
                project_role.as_str()
            );
            Ok(JoinProjectOutcome::joined(summary, Some(member)))
        }
    }
}

fn join_failed(e: StoreError) -> ServiceError {
    tracing::error!("Join write failed: {}", e);
    ServiceError::Upstream(format!("Failed to join project. Details: {}", e))
}
