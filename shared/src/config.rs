use std::env;

const DEFAULT_TABLE_NAME: &str = "thesis-hub";
const DEFAULT_PROFILE_PICTURES_BUCKET: &str = "Profile_pictures";
const DEFAULT_PROJECT_DOCUMENTS_BUCKET: &str = "project_documents";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub table_name: String,
    pub profile_pictures_bucket: String,
    pub project_documents_bucket: String,
    /// Endpoint override for the AWS SDK (local stacks) and public URLs
    pub backend_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. A missing endpoint only
    /// produces a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend_url = non_empty("BACKEND_URL").map(|u| u.trim_end_matches('/').to_string());

        if backend_url.is_none() {
            tracing::warn!("BACKEND_URL is not set, using the default AWS endpoints");
        }

        Self {
            table_name: non_empty("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            profile_pictures_bucket: non_empty("PROFILE_PICTURES_BUCKET")
                .unwrap_or_else(|| DEFAULT_PROFILE_PICTURES_BUCKET.to_string()),
            project_documents_bucket: non_empty("PROJECT_DOCUMENTS_BUCKET")
                .unwrap_or_else(|| DEFAULT_PROJECT_DOCUMENTS_BUCKET.to_string()),
            backend_url,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            profile_pictures_bucket: DEFAULT_PROFILE_PICTURES_BUCKET.to_string(),
            project_documents_bucket: DEFAULT_PROJECT_DOCUMENTS_BUCKET.to_string(),
            backend_url: None,
        }
    }
}
