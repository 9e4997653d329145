use lambda_http::{http::StatusCode, Body, Error, Response};
use thiserror::Error;

/// Failure reported by a record store adapter
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Insert rejected because the key already exists
    #[error("duplicate key: {0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
}

/// Failure reported by a blob store adapter
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct BlobError(pub String);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

/// Typed failure of a service operation. The message is what the caller
/// sees in the `error` field of the response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Already a member or already invited
    #[error("{0}")]
    Conflict(String),
    /// Store or blob failure, diagnostic appended
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Unexpected(String),
}

impl ServiceError {
    pub fn unauthorized() -> Self {
        ServiceError::Unauthorized("Unauthorized".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::Conflict(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Upstream(_) | ServiceError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn into_response(self) -> Result<Response<Body>, Error> {
        crate::http::json_response(
            self.status(),
            &serde_json::json!({
                "success": false,
                "error": self.to_string(),
            }),
        )
    }
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        tracing::warn!("Authentication rejected: {}", e);
        ServiceError::unauthorized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::unauthorized().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::Upstream("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body() {
        let resp = ServiceError::NotFound("Invalid project code. Project not found.".into())
            .into_response()
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid project code. Project not found.");
    }
}
