use crate::blob::UploadOptions;
use crate::error::ServiceError;
use crate::identity;
use crate::types::{ProfileUpdate, UploadedFile};
use crate::AppState;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const MAX_PICTURE_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_PICTURE_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// Profile of the caller as shown by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
    pub profile_complete: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PictureUploadOutcome {
    pub success: bool,
    pub public_url: String,
    pub message: String,
}

/// Get the caller's profile and role
pub async fn get_profile(state: &AppState, bearer: Option<&str>) -> Result<ProfileView, ServiceError> {
    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;

    let profile = state.records.get_profile(&principal.id).await.map_err(|e| {
        tracing::error!("Profile lookup failed for {}: {}", principal.id, e);
        ServiceError::Upstream(format!("Failed to load profile: {}", e))
    })?;
    let role = state.records.get_role(&principal.id).await.map_err(|e| {
        tracing::error!("Role lookup failed for {}: {}", principal.id, e);
        ServiceError::Upstream(format!("Failed to load role: {}", e))
    })?;
    let role = role.map(|r| r.role);

    Ok(match profile {
        Some(profile) => ProfileView {
            id: profile.id,
            full_name: profile.full_name,
            email: profile.email,
            avatar_url: profile.avatar_url,
            role,
            profile_complete: true,
        },
        // Signed in but onboarding not finished yet
        None => ProfileView {
            id: principal.id,
            full_name: principal.email.clone(),
            email: principal.email,
            avatar_url: principal.photo_url,
            role,
            profile_complete: false,
        },
    })
}

/// Rename the caller
pub async fn update_profile(
    state: &AppState,
    bearer: Option<&str>,
    req: UpdateProfileRequest,
) -> Result<ProfileView, ServiceError> {
    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;

    let full_name = req.full_name.trim();
    if full_name.is_empty() {
        return Err(ServiceError::Validation("Full name is required".to_string()));
    }

    let update = ProfileUpdate {
        full_name: Some(full_name.to_string()),
        ..Default::default()
    };
    let updated = state
        .records
        .update_profile(&principal.id, &update, &Utc::now().to_rfc3339())
        .await
        .map_err(|e| {
            tracing::error!("Profile update failed for {}: {}", principal.id, e);
            ServiceError::Upstream(format!("Failed to update profile: {}", e))
        })?
        .ok_or_else(|| ServiceError::NotFound("Profile not found".to_string()))?;

    let role = match state.records.get_role(&principal.id).await {
        Ok(role) => role.map(|r| r.role),
        Err(e) => {
            tracing::warn!("Role lookup failed for {}: {}", principal.id, e);
            None
        }
    };

    Ok(ProfileView {
        id: updated.id,
        full_name: updated.full_name,
        email: updated.email,
        avatar_url: updated.avatar_url,
        role,
        profile_complete: true,
    })
}

/// Replace the caller's profile picture
pub async fn upload_profile_picture(
    state: &AppState,
    bearer: Option<&str>,
    user_id: Option<&str>,
    file: Option<UploadedFile>,
) -> Result<PictureUploadOutcome, ServiceError> {
    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;

    let file = file.ok_or_else(|| ServiceError::Validation("No file provided".to_string()))?;
    let user_id = user_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServiceError::Validation("No userId provided".to_string()))?;

    if user_id != principal.id {
        return Err(ServiceError::Forbidden(
            "Cannot upload picture for another user".to_string(),
        ));
    }

    let content_type = file.content_type.to_ascii_lowercase();
    if !ALLOWED_PICTURE_TYPES.contains(&content_type.as_str()) {
        return Err(ServiceError::Validation(
            "Invalid file type. Only JPG, JPEG, and PNG are allowed".to_string(),
        ));
    }
    if file.size() > MAX_PICTURE_BYTES {
        return Err(ServiceError::Validation(
            "File too large. Maximum size is 10MB".to_string(),
        ));
    }

    let bucket = &state.config.profile_pictures_bucket;
    let path = format!(
        "{}-{}.{}",
        principal.id,
        Utc::now().timestamp_millis(),
        file.extension()
    );

    state
        .blobs
        .upload(
            bucket,
            &path,
            file.bytes,
            &content_type,
            UploadOptions { overwrite: true },
        )
        .await
        .map_err(|e| {
            tracing::error!("Profile picture upload failed for {}: {}", principal.id, e);
            ServiceError::Upstream(format!("Upload failed: {}", e))
        })?;

    let public_url = state.blobs.public_url(bucket, &path);

    let update = ProfileUpdate {
        avatar_url: Some(public_url.clone()),
        ..Default::default()
    };
    match state
        .records
        .update_profile(&principal.id, &update, &Utc::now().to_rfc3339())
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => tracing::warn!("No profile to attach picture to for {}", principal.id),
        Err(e) => tracing::error!("Could not save avatar URL for {}: {}", principal.id, e),
    }

    Ok(PictureUploadOutcome {
        success: true,
        public_url,
        message: "Profile picture uploaded successfully".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BlobError, StoreError};
    use crate::memory::{StoreOp, TestBackend};
    use crate::types::UserProfile;
    use lambda_http::http::StatusCode;

    fn setup() -> TestBackend {
        let backend = TestBackend::new();
        backend.sign_in("tok", "u1", "a@b.com");
        backend
    }

    fn seed_profile(backend: &TestBackend) {
        backend.records.seed_profile(UserProfile {
            id: "u1".to_string(),
            full_name: "John Doe".to_string(),
            email: "a@b.com".to_string(),
            avatar_url: None,
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        });
        backend.records.seed_role("u1", "student");
    }

    fn picture(content_type: &str, size: usize) -> UploadedFile {
        UploadedFile {
            file_name: "me.PNG".to_string(),
            content_type: content_type.to_string(),
            bytes: vec![1u8; size],
        }
    }

    #[tokio::test]
    async fn test_get_profile() {
        let backend = setup();
        seed_profile(&backend);

        let view = get_profile(&backend.state, Some("tok")).await.unwrap();
        assert_eq!(view.full_name, "John Doe");
        assert_eq!(view.role.as_deref(), Some("student"));
        assert!(view.profile_complete);
    }

    #[tokio::test]
    async fn test_get_profile_before_onboarding() {
        let backend = setup();

        let view = get_profile(&backend.state, Some("tok")).await.unwrap();
        assert_eq!(view.full_name, "a@b.com");
        assert_eq!(view.role, None);
        assert!(!view.profile_complete);

        let err = get_profile(&backend.state, None).await.unwrap_err();
        assert_eq!(err, ServiceError::unauthorized());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let backend = setup();

        let err = update_profile(
            &backend.state,
            Some("tok"),
            UpdateProfileRequest { full_name: "Jane".to_string() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        seed_profile(&backend);
        let err = update_profile(&backend.state, Some("tok"), UpdateProfileRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let view = update_profile(
            &backend.state,
            Some("tok"),
            UpdateProfileRequest { full_name: " Jane Doe ".to_string() },
        )
        .await
        .unwrap();
        assert_eq!(view.full_name, "Jane Doe");
        assert_eq!(backend.records.profile("u1").unwrap().full_name, "Jane Doe");
    }

    #[tokio::test]
    async fn test_upload_picture() {
        let backend = setup();
        seed_profile(&backend);

        let outcome = upload_profile_picture(
            &backend.state,
            Some("tok"),
            Some("u1"),
            Some(picture("IMAGE/PNG", 512)),
        )
        .await
        .unwrap();
        assert!(outcome.success);

        let bucket = &backend.state.config.profile_pictures_bucket;
        let paths = backend.blobs.paths(bucket);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with("u1-"));
        assert!(paths[0].ends_with(".png"));
        assert_eq!(outcome.public_url, backend.state.blobs.public_url(bucket, &paths[0]));
        assert_eq!(
            backend.records.profile("u1").unwrap().avatar_url,
            Some(outcome.public_url)
        );
    }

    #[tokio::test]
    async fn test_upload_picture_rejections() {
        let backend = setup();

        // file is checked before the user id
        let err = upload_profile_picture(&backend.state, Some("tok"), Some("u2"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Validation("No file provided".to_string()));

        for user_id in [None, Some("  ")] {
            let err = upload_profile_picture(&backend.state, Some("tok"), user_id, Some(picture("image/png", 1)))
                .await
                .unwrap_err();
            assert_eq!(err, ServiceError::Validation("No userId provided".to_string()));
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }

        let err = upload_profile_picture(&backend.state, Some("tok"), Some("u2"), Some(picture("image/png", 1)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Forbidden("Cannot upload picture for another user".to_string())
        );

        // caller check comes before type validation
        let err = upload_profile_picture(&backend.state, Some("tok"), Some("u2"), Some(picture("image/gif", 1)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = upload_profile_picture(&backend.state, Some("tok"), Some("u1"), Some(picture("image/gif", 1)))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid file type"));

        let err = upload_profile_picture(
            &backend.state,
            Some("tok"),
            Some("u1"),
            Some(picture("image/jpeg", MAX_PICTURE_BYTES + 1)),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Validation("File too large. Maximum size is 10MB".to_string())
        );

        assert_eq!(backend.blobs.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_picture_failures() {
        let backend = setup();
        seed_profile(&backend);
        backend
            .records
            .fail_on(StoreOp::UpdateProfile, StoreError::Backend("throttled".to_string()));

        // avatar update failure is only logged
        let outcome = upload_profile_picture(&backend.state, Some("tok"), Some("u1"), Some(picture("image/jpeg", 8)))
            .await
            .unwrap();
        assert!(outcome.success);

        backend.blobs.fail_uploads(BlobError("access denied".to_string()));
        let err = upload_profile_picture(&backend.state, Some("tok"), Some("u1"), Some(picture("image/jpeg", 8)))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Upstream("Upload failed: access denied".to_string()));
    }
}
