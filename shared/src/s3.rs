use crate::blob::{BlobStore, UploadOptions};
use crate::error::BlobError;
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

const CACHE_CONTROL: &str = "max-age=3600";

/// Blob store backed by S3 buckets with public-read objects
pub struct S3BlobStore {
    client: S3Client,
    /// Path-style base URL when running against a custom endpoint
    public_base_url: Option<String>,
}

impl S3BlobStore {
    pub fn new(client: S3Client, public_base_url: Option<String>) -> Self {
        Self {
            client,
            public_base_url,
        }
    }
}

pub(crate) fn object_url(public_base_url: Option<&str>, bucket: &str, key: &str) -> String {
    match public_base_url {
        Some(base) => format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
    }
}

/// Keep the S3 cause in the message; an `SdkError` displays only its kind
fn upload_error<E: std::error::Error>(path: &str, e: E) -> BlobError {
    let message = DisplayErrorContext(e).to_string();
    if message.contains("PreconditionFailed") {
        BlobError(format!("The resource already exists: {}", path))
    } else {
        BlobError(format!("Failed to upload to S3: {}", message))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: UploadOptions,
    ) -> Result<(), BlobError> {
        let size = bytes.len();
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .cache_control(CACHE_CONTROL);

        // Conditional write: fail instead of replacing an existing object
        if !options.overwrite {
            request = request.if_none_match("*");
        }

        request.send().await.map_err(|e| {
            tracing::error!("S3 put_object failed for {}/{}: {:?}", bucket, path, e);
            upload_error(path, e)
        })?;

        tracing::info!("Uploaded {} bytes to {}/{}", size, bucket, path);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        object_url(self.public_base_url.as_deref(), bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::SdkError;
    use aws_sdk_s3::operation::put_object::PutObjectError;

    #[test]
    fn test_upload_error_keeps_cause() {
        let e = SdkError::<PutObjectError, ()>::construction_failure(
            "AccessDenied: bucket policy forbids PutObject",
        );
        let BlobError(message) = upload_error("u1/u1-1.png", e);
        assert!(message.starts_with("Failed to upload to S3: "));
        assert!(message.contains("AccessDenied: bucket policy forbids PutObject"));
    }

    #[test]
    fn test_upload_error_precondition() {
        let e = SdkError::<PutObjectError, ()>::construction_failure("PreconditionFailed");
        assert_eq!(
            upload_error("projects/p1/1_a.pdf", e),
            BlobError("The resource already exists: projects/p1/1_a.pdf".to_string())
        );
    }

    #[test]
    fn test_object_url() {
        assert_eq!(
            object_url(None, "project_documents", "projects/p1/1_a.pdf"),
            "https://project_documents.s3.amazonaws.com/projects/p1/1_a.pdf"
        );
        assert_eq!(
            object_url(Some("http://localhost:4566/"), "Profile_pictures", "u1/u1-1.png"),
            "http://localhost:4566/Profile_pictures/u1/u1-1.png"
        );
    }
}
