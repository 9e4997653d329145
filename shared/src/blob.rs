use crate::error::BlobError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Replace an object already stored at the same path
    pub overwrite: bool,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: UploadOptions,
    ) -> Result<(), BlobError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}
