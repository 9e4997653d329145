use crate::error::AuthError;
use crate::identity::{IdentityProvider, Principal};
use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::types::AttributeType;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;

/// Identity gateway backed by a Cognito user pool. The bearer token is the
/// pool's access token.
pub struct CognitoIdentity {
    client: CognitoClient,
}

impl CognitoIdentity {
    pub fn new(client: CognitoClient) -> Self {
        Self { client }
    }
}

/// Turn Cognito user attributes into a principal. `sub` is the stable id;
/// federated users carry their provider photo in `picture`.
fn principal_from_attributes(username: &str, attributes: &[AttributeType]) -> Principal {
    let attr = |name: &str| {
        attributes
            .iter()
            .find(|a| a.name() == name)
            .and_then(|a| a.value())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };

    Principal {
        id: attr("sub").unwrap_or_else(|| username.to_string()),
        email: attr("email").unwrap_or_default(),
        photo_url: attr("picture"),
    }
}

/// Map a Cognito error to a short reason, the same way the login flow used
/// to surface Cognito exceptions
fn describe_error(error_message: &str) -> String {
    if error_message.contains("NotAuthorizedException") {
        "Access token is invalid or expired".to_string()
    } else if error_message.contains("UserNotFoundException") {
        "No account found for this token".to_string()
    } else if error_message.contains("TooManyRequestsException") {
        "Too many requests. Please try again later".to_string()
    } else {
        "Identity provider request failed".to_string()
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let result = self.client.get_user().access_token(token).send().await;

        match result {
            Ok(output) => {
                let principal = principal_from_attributes(output.username(), output.user_attributes());
                tracing::info!("Authenticated principal: {}", principal.id);
                Ok(principal)
            }
            Err(e) => {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito get_user error: {}", error_message);
                Err(AuthError::InvalidCredential(describe_error(&error_message)))
            }
        }
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        self.client
            .global_sign_out()
            .access_token(token)
            .send()
            .await
            .map_err(|e| {
                let error_message = format!("{:?}", e);
                tracing::error!("Cognito global_sign_out error: {}", error_message);
                AuthError::InvalidCredential(describe_error(&error_message))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(name: &str, value: &str) -> AttributeType {
        AttributeType::builder().name(name).value(value).build().unwrap()
    }

    #[test]
    fn test_principal_from_attributes() {
        let attributes = vec![
            attribute("sub", "6f1c-uuid"),
            attribute("email", "a@b.com"),
            attribute("picture", "https://lh3.googleusercontent.com/a/photo"),
        ];
        let principal = principal_from_attributes("google_1234", &attributes);
        assert_eq!(principal.id, "6f1c-uuid");
        assert_eq!(principal.email, "a@b.com");
        assert_eq!(
            principal.photo_url.as_deref(),
            Some("https://lh3.googleusercontent.com/a/photo")
        );
    }

    #[test]
    fn test_principal_falls_back_to_username() {
        let principal = principal_from_attributes("plain-user", &[attribute("picture", "")]);
        assert_eq!(principal.id, "plain-user");
        assert_eq!(principal.email, "");
        assert_eq!(principal.photo_url, None);
    }

    #[test]
    fn test_describe_error() {
        assert_eq!(
            describe_error("ServiceError { NotAuthorizedException: .. }"),
            "Access token is invalid or expired"
        );
        assert_eq!(describe_error("DispatchFailure"), "Identity provider request failed");
    }
}
