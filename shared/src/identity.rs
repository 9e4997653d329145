use crate::error::AuthError;
use async_trait::async_trait;

/// Authenticated identity making a request
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: String,
    pub email: String,
    /// Photo from the OAuth provider, when it supplies one
    pub photo_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;
}

/// Resolve an optional bearer token to a principal
pub async fn authenticate(
    provider: &dyn IdentityProvider,
    token: Option<&str>,
) -> Result<Principal, AuthError> {
    match token {
        Some(token) => provider.authenticate(token).await,
        None => Err(AuthError::MissingCredential),
    }
}
