pub mod types;
pub mod error;
pub mod config;
pub mod http;
pub mod multipart;
pub mod store;
pub mod blob;
pub mod identity;
pub mod dynamo;
pub mod s3;
pub mod cognito;
pub mod onboarding;
pub mod users;
pub mod membership;
pub mod projects;
pub mod invites;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

use blob::BlobStore;
use config::AppConfig;
use identity::IdentityProvider;
use std::sync::Arc;
use store::RecordStore;

/// Shared application state
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityProvider>,
        config: AppConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            records,
            blobs,
            identity,
            config,
        })
    }
}
