use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ========== ROLES ==========

/// Role picked by the user on the onboarding form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedRole {
    Student,
    Teacher,
}

impl SelectedRole {
    /// Storage vocabulary for the selected role
    pub fn app_role(self) -> AppRole {
        match self {
            SelectedRole::Student => AppRole::Student,
            SelectedRole::Teacher => AppRole::Adviser,
        }
    }

    pub fn redirect_path(self) -> &'static str {
        self.app_role().home_path()
    }
}

impl FromStr for SelectedRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(SelectedRole::Student),
            "teacher" => Ok(SelectedRole::Teacher),
            other => Err(format!("Invalid role '{}': expected student or teacher", other)),
        }
    }
}

/// System-wide role stored in `user_roles`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    Student,
    Adviser,
    Coordinator,
}

impl AppRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AppRole::Student => "student",
            AppRole::Adviser => "adviser",
            AppRole::Coordinator => "coordinator",
        }
    }

    /// Dashboard area for this role
    pub fn home_path(self) -> &'static str {
        match self {
            AppRole::Student => "/student",
            AppRole::Adviser => "/adviser",
            AppRole::Coordinator => "/coordinator",
        }
    }
}

impl FromStr for AppRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(AppRole::Student),
            "adviser" => Ok(AppRole::Adviser),
            "coordinator" => Ok(AppRole::Coordinator),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

impl fmt::Display for AppRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a principal holds inside one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Leader,
    Adviser,
    CoAdviser,
    Student,
}

impl ProjectRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectRole::Leader => "leader",
            ProjectRole::Adviser => "adviser",
            ProjectRole::CoAdviser => "co_adviser",
            ProjectRole::Student => "student",
        }
    }

    /// Project role granted when joining by code. Never fails: anything
    /// that is not an adviser joins as a student.
    pub fn for_system_role(role: &str) -> ProjectRole {
        match role {
            "student" => ProjectRole::Student,
            "adviser" => ProjectRole::Adviser,
            _ => ProjectRole::Student,
        }
    }
}

impl FromStr for ProjectRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leader" => Ok(ProjectRole::Leader),
            "adviser" => Ok(ProjectRole::Adviser),
            "co_adviser" => Ok(ProjectRole::CoAdviser),
            "student" => Ok(ProjectRole::Student),
            other => Err(format!("Unknown project role '{}'", other)),
        }
    }
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Row of `user_roles`. The role is kept as stored so that values written
/// by other tools still reach the permissive mappings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role: String,
    pub created_at: String,
}

// ========== PROJECT ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Draft,
    Proposal,
    Review,
    Approved,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Proposal => "proposal",
            ProjectStatus::Review => "review",
            ProjectStatus::Approved => "approved",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "proposal" => Ok(ProjectStatus::Proposal),
            "review" => Ok(ProjectStatus::Review),
            "approved" => Ok(ProjectStatus::Approved),
            other => Err(format!("Unknown project status '{}'", other)),
        }
    }
}

/// Paper standard (the project's classification)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperStandard {
    #[serde(rename = "IMRAD")]
    Imrad,
    #[serde(rename = "IAAA")]
    Iaaa,
    #[serde(rename = "custom")]
    Custom,
}

impl PaperStandard {
    pub fn as_str(self) -> &'static str {
        match self {
            PaperStandard::Imrad => "IMRAD",
            PaperStandard::Iaaa => "IAAA",
            PaperStandard::Custom => "custom",
        }
    }
}

impl FromStr for PaperStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IMRAD" => Ok(PaperStandard::Imrad),
            "IAAA" => Ok(PaperStandard::Iaaa),
            "custom" => Ok(PaperStandard::Custom),
            other => Err(format!("Unknown paper standard '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub project_code: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub program: Option<String>,
    pub course: Option<String>,
    pub section: Option<String>,
    pub project_type: String, // independent
    pub status: ProjectStatus,
    pub paper_standard: PaperStandard,
    pub created_by: String,
    pub keywords: Vec<String>,
    pub document_reference: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
}

impl From<&Project> for ProjectSummary {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            title: project.title.clone(),
        }
    }
}

// ========== MEMBERSHIP ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Accepted,
}

impl MemberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Accepted => "accepted",
        }
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MemberStatus::Pending),
            "accepted" => Ok(MemberStatus::Accepted),
            other => Err(format!("Unknown membership status '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProjectMembership {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub role: ProjectRole,
    pub status: MemberStatus,
    pub created_at: String,
    pub responded_at: Option<String>,
}

// ========== UPLOADS ==========

/// A file received in a multipart body
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Extension taken from the original file name, falling back to the
    /// content type when the name has none
    pub fn extension(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => match self.content_type.as_str() {
                "image/png" => "png".to_string(),
                "image/jpeg" | "image/jpg" => "jpg".to_string(),
                "application/pdf" => "pdf".to_string(),
                _ => "bin".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_role_mapping() {
        assert_eq!(SelectedRole::Student.app_role(), AppRole::Student);
        assert_eq!(SelectedRole::Teacher.app_role(), AppRole::Adviser);
        assert_eq!(SelectedRole::Student.redirect_path(), "/student");
        assert_eq!(SelectedRole::Teacher.redirect_path(), "/adviser");
        assert!("adviser".parse::<SelectedRole>().is_err());
    }

    #[test]
    fn test_project_role_for_system_role() {
        assert_eq!(ProjectRole::for_system_role("student"), ProjectRole::Student);
        assert_eq!(ProjectRole::for_system_role("adviser"), ProjectRole::Adviser);
        assert_eq!(ProjectRole::for_system_role("coordinator"), ProjectRole::Student);
        assert_eq!(ProjectRole::for_system_role(""), ProjectRole::Student);
    }

    #[test]
    fn test_serde_vocabulary() {
        assert_eq!(serde_json::to_string(&PaperStandard::Imrad).unwrap(), "\"IMRAD\"");
        assert_eq!(serde_json::to_string(&ProjectRole::CoAdviser).unwrap(), "\"co_adviser\"");
        assert_eq!(serde_json::to_string(&MemberStatus::Accepted).unwrap(), "\"accepted\"");
    }

    #[test]
    fn test_uploaded_file_extension() {
        let file = UploadedFile {
            file_name: "Thesis Draft.DOCX".to_string(),
            content_type: "application/msword".to_string(),
            bytes: vec![],
        };
        assert_eq!(file.extension(), "docx");

        let file = UploadedFile {
            file_name: "avatar".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![],
        };
        assert_eq!(file.extension(), "png");
    }
}
