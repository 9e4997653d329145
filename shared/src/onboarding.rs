//! First-login onboarding: profile completion and post-login routing.
//!
//! `complete_profile` runs its steps in a fixed order and stops at the first
//! failure. Nothing already written is rolled back; the profile upsert and
//! the idempotent role step make a retry converge.

use crate::blob::UploadOptions;
use crate::error::{ServiceError, StoreError};
use crate::identity::Principal;
use crate::types::{AppRole, ProfileUpdate, RoleAssignment, SelectedRole, UploadedFile, UserProfile};
use crate::AppState;
use chrono::Utc;
use serde::Serialize;

const MISSING_FIELDS: &str =
    "Missing required fields: userId, displayName, role, and email are required";

pub const ONBOARDING_PATH: &str = "/onboarding";
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Default)]
pub struct CompleteProfileRequest {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub avatar: Option<UploadedFile>,
    /// Photo offered by the OAuth provider
    pub external_photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteProfileOutcome {
    pub success: bool,
    pub redirect_path: String,
}

/// Provision profile and role for a newly authenticated principal
pub async fn complete_profile(
    state: &AppState,
    req: CompleteProfileRequest,
) -> Result<CompleteProfileOutcome, ServiceError> {
    let CompleteProfileRequest {
        user_id,
        email,
        display_name,
        role,
        avatar,
        external_photo_url,
    } = req;

    if [&user_id, &display_name, &role, &email]
        .iter()
        .any(|v| v.trim().is_empty())
    {
        return Err(ServiceError::Validation(MISSING_FIELDS.to_string()));
    }

    let selected: SelectedRole = role.trim().parse().map_err(ServiceError::Validation)?;

    let external_photo_url = external_photo_url.filter(|u| !u.trim().is_empty());
    if let Some(url) = &external_photo_url {
        validate_photo_url(url)?;
    }

    tracing::info!("Completing profile for user {} as {:?}", user_id, selected);

    // Step 1: avatar
    let avatar_url = match avatar {
        Some(file) => Some(upload_avatar(state, &user_id, file).await?),
        None => external_photo_url,
    };

    // Step 2: profile
    let profile = UserProfile {
        id: user_id.clone(),
        full_name: display_name.trim().to_string(),
        email: email.trim().to_string(),
        avatar_url,
        updated_at: Utc::now().to_rfc3339(),
    };
    state.records.upsert_profile(&profile).await.map_err(|e| {
        tracing::error!("Profile upsert error for {}: {}", user_id, e);
        ServiceError::Upstream(format!("Failed to save profile: {}", e))
    })?;

    // Step 3: role
    let app_role = selected.app_role();
    let assignment = RoleAssignment {
        user_id: user_id.clone(),
        role: app_role.as_str().to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    let redirect_path = match state.records.insert_role(&assignment).await {
        Ok(()) => selected.redirect_path().to_string(),
        Err(StoreError::Conflict(_)) => existing_role_path(state, &user_id, app_role).await,
        Err(e) => {
            tracing::error!("User role insert error for {}: {}", user_id, e);
            return Err(ServiceError::Upstream(format!("Failed to assign role: {}", e)));
        }
    };

    tracing::info!("Profile completed for {}, redirecting to {}", user_id, redirect_path);
    Ok(CompleteProfileOutcome {
        success: true,
        redirect_path,
    })
}

/// A role row already exists, so onboarding ran before. The stored role
/// wins; the role picked this time is ignored.
async fn existing_role_path(state: &AppState, user_id: &str, requested: AppRole) -> String {
    match state.records.get_role(user_id).await {
        Ok(Some(existing)) => match existing.role.parse::<AppRole>() {
            Ok(stored) => {
                if stored != requested {
                    tracing::warn!(
                        "User {} re-submitted onboarding as {} but is stored as {}",
                        user_id,
                        requested,
                        stored
                    );
                }
                stored.home_path().to_string()
            }
            Err(e) => {
                tracing::warn!("Stored role for {} is unusable: {}", user_id, e);
                requested.home_path().to_string()
            }
        },
        Ok(None) | Err(_) => requested.home_path().to_string(),
    }
}

fn validate_photo_url(url: &str) -> Result<(), ServiceError> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ServiceError::Validation(format!("malformed URL: {}", url))),
    }
}

async fn upload_avatar(
    state: &AppState,
    user_id: &str,
    file: UploadedFile,
) -> Result<String, ServiceError> {
    let bucket = &state.config.profile_pictures_bucket;
    let file_name = format!(
        "{}-{}.{}",
        user_id,
        Utc::now().timestamp_millis(),
        file.extension()
    );
    let path = format!("{}/{}", user_id, file_name);

    state
        .blobs
        .upload(
            bucket,
            &path,
            file.bytes,
            &file.content_type,
            UploadOptions { overwrite: true },
        )
        .await
        .map_err(|e| {
            tracing::error!("Avatar upload error for {}: {}", user_id, e);
            ServiceError::Upstream(format!("Failed to upload avatar: {}", e))
        })?;

    Ok(state.blobs.public_url(bucket, &path))
}

/// Where a freshly signed-in principal should land
pub async fn resolve_landing(state: &AppState, principal: &Principal) -> String {
    let profile = match state.records.get_profile(&principal.id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return ONBOARDING_PATH.to_string(),
        Err(e) => {
            tracing::error!("Profile lookup failed for {}: {}", principal.id, e);
            return LOGIN_PATH.to_string();
        }
    };

    if profile.avatar_url.is_none() {
        if let Some(photo_url) = &principal.photo_url {
            let update = ProfileUpdate {
                avatar_url: Some(photo_url.clone()),
                ..Default::default()
            };
            if let Err(e) = state
                .records
                .update_profile(&principal.id, &update, &Utc::now().to_rfc3339())
                .await
            {
                tracing::warn!("Could not backfill provider photo for {}: {}", principal.id, e);
            }
        }
    }

    match state.records.get_role(&principal.id).await {
        Ok(Some(role)) => role
            .role
            .parse::<AppRole>()
            .map(|r| r.home_path().to_string())
            .unwrap_or_else(|_| LOGIN_PATH.to_string()),
        Ok(None) => LOGIN_PATH.to_string(),
        Err(e) => {
            tracing::error!("Role lookup failed for {}: {}", principal.id, e);
            LOGIN_PATH.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlobError;
    use crate::memory::{StoreOp, TestBackend};

    fn request(user_id: &str, display_name: &str, role: &str, email: &str) -> CompleteProfileRequest {
        CompleteProfileRequest {
            user_id: user_id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role: role.to_string(),
            ..Default::default()
        }
    }

    fn avatar() -> UploadedFile {
        UploadedFile {
            file_name: "avatar.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: b"jpeg-bytes".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_student_without_avatar() {
        let backend = TestBackend::new();

        let outcome = complete_profile(&backend.state, request("u1", "John Doe", "student", "a@b.com"))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.redirect_path, "/student");

        let profile = backend.records.profile("u1").unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.full_name, "John Doe");
        assert_eq!(profile.email, "a@b.com");
        assert_eq!(profile.avatar_url, None);

        let role = backend.records.role("u1").unwrap();
        assert_eq!(role.user_id, "u1");
        assert_eq!(role.role, "student");
        assert_eq!(backend.blobs.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_teacher_maps_to_adviser() {
        let backend = TestBackend::new();

        let outcome = complete_profile(&backend.state, request("u2", "Dr. Reyes", "teacher", "r@uni.edu"))
            .await
            .unwrap();
        assert_eq!(outcome.redirect_path, "/adviser");
        assert_eq!(backend.records.role("u2").unwrap().role, "adviser");
    }

    #[tokio::test]
    async fn test_missing_fields_make_no_store_calls() {
        let cases = [
            request("", "John Doe", "student", "a@b.com"),
            request("u1", "", "student", "a@b.com"),
            request("u1", "John Doe", "", "a@b.com"),
            request("u1", "John Doe", "student", ""),
        ];

        for case in cases {
            let backend = TestBackend::new();
            let err = complete_profile(&backend.state, case).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
            assert!(err.to_string().contains("Missing required fields"));
            assert!(backend.records.calls().is_empty());
            assert_eq!(backend.blobs.upload_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let backend = TestBackend::new();
        let err = complete_profile(&backend.state, request("u1", "John", "coordinator", "a@b.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(backend.records.calls().is_empty());
    }

    #[tokio::test]
    async fn test_avatar_url_is_the_uploaded_public_url() {
        let backend = TestBackend::new();
        let mut req = request("user-123", "John Doe", "student", "john@example.com");
        req.avatar = Some(avatar());
        req.external_photo_url = Some("https://lh3.googleusercontent.com/photo".to_string());

        complete_profile(&backend.state, req).await.unwrap();

        let bucket = &backend.state.config.profile_pictures_bucket;
        let paths = backend.blobs.paths(bucket);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with("user-123/user-123-"));
        assert!(paths[0].ends_with(".jpg"));

        let stored = backend.blobs.object(bucket, &paths[0]).unwrap();
        assert_eq!(stored.content_type, "image/jpeg");
        assert_eq!(stored.bytes, b"jpeg-bytes".to_vec());

        let profile = backend.records.profile("user-123").unwrap();
        assert_eq!(
            profile.avatar_url,
            Some(backend.state.blobs.public_url(bucket, &paths[0]))
        );
    }

    #[tokio::test]
    async fn test_external_photo_used_without_upload() {
        let backend = TestBackend::new();
        let mut req = request("u1", "John Doe", "student", "a@b.com");
        req.external_photo_url = Some("https://lh3.googleusercontent.com/photo".to_string());

        complete_profile(&backend.state, req).await.unwrap();

        assert_eq!(backend.blobs.upload_count(), 0);
        assert_eq!(
            backend.records.profile("u1").unwrap().avatar_url.as_deref(),
            Some("https://lh3.googleusercontent.com/photo")
        );
    }

    #[tokio::test]
    async fn test_malformed_photo_url_is_rejected() {
        let backend = TestBackend::new();
        let mut req = request("u1", "John Doe", "student", "a@b.com");
        req.external_photo_url = Some("not a url".to_string());

        let err = complete_profile(&backend.state, req).await.unwrap_err();
        assert!(err.to_string().contains("malformed URL"));
        assert!(backend.records.calls().is_empty());
    }

    #[tokio::test]
    async fn test_avatar_upload_failure_writes_nothing() {
        let backend = TestBackend::new();
        backend.blobs.fail_uploads(BlobError("Upload failed".to_string()));
        let mut req = request("user-123", "John Doe", "student", "john@example.com");
        req.avatar = Some(avatar());

        let err = complete_profile(&backend.state, req).await.unwrap_err();
        assert!(err.to_string().contains("Failed to upload avatar"));
        assert!(err.to_string().contains("Upload failed"));
        assert!(backend.records.calls().is_empty());
    }

    #[tokio::test]
    async fn test_profile_failure_skips_role() {
        let backend = TestBackend::new();
        backend
            .records
            .fail_on(StoreOp::UpsertProfile, StoreError::Backend("connection reset".to_string()));

        let err = complete_profile(&backend.state, request("u1", "John Doe", "student", "a@b.com"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("save"));
        assert_eq!(backend.records.call_count(StoreOp::InsertRole), 0);
        assert!(backend.records.role("u1").is_none());
    }

    #[tokio::test]
    async fn test_role_failure_after_profile_written() {
        let backend = TestBackend::new();
        backend
            .records
            .fail_on(StoreOp::InsertRole, StoreError::Backend("permission denied".to_string()));

        let err = complete_profile(&backend.state, request("u1", "John Doe", "student", "a@b.com"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("role"));
        assert!(matches!(err, ServiceError::Upstream(_)));
        assert!(backend.records.profile("u1").is_some());
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let backend = TestBackend::new();
        complete_profile(&backend.state, request("u1", "John", "student", "a@b.com"))
            .await
            .unwrap();

        let outcome = complete_profile(&backend.state, request("u1", "John Doe", "teacher", "a@b.com"))
            .await
            .unwrap();

        // stored role wins, profile is overwritten
        assert_eq!(outcome.redirect_path, "/student");
        assert_eq!(backend.records.role("u1").unwrap().role, "student");
        assert_eq!(backend.records.profile("u1").unwrap().full_name, "John Doe");
    }

    #[tokio::test]
    async fn test_landing_without_profile_goes_to_onboarding() {
        let backend = TestBackend::new();
        let principal = backend.sign_in("t1", "u1", "a@b.com");
        assert_eq!(resolve_landing(&backend.state, &principal).await, "/onboarding");
    }

    #[tokio::test]
    async fn test_landing_routes_by_role_and_backfills_photo() {
        let backend = TestBackend::new();
        complete_profile(&backend.state, request("u1", "John", "teacher", "a@b.com"))
            .await
            .unwrap();

        let mut principal = backend.sign_in("t1", "u1", "a@b.com");
        principal.photo_url = Some("https://lh3.googleusercontent.com/p".to_string());

        assert_eq!(resolve_landing(&backend.state, &principal).await, "/adviser");
        assert_eq!(
            backend.records.profile("u1").unwrap().avatar_url.as_deref(),
            Some("https://lh3.googleusercontent.com/p")
        );
    }

    #[tokio::test]
    async fn test_landing_for_coordinator_and_missing_role() {
        let backend = TestBackend::new();
        complete_profile(&backend.state, request("u1", "John", "student", "a@b.com"))
            .await
            .unwrap();
        complete_profile(&backend.state, request("u2", "Jane", "student", "j@b.com"))
            .await
            .unwrap();
        // u3 has a profile but onboarding stopped before the role step
        backend
            .records
            .fail_on(StoreOp::InsertRole, StoreError::Backend("timeout".to_string()));
        let _ = complete_profile(&backend.state, request("u3", "Jim", "student", "k@b.com")).await;

        backend.records.seed_role("u2", "coordinator");
        let u1 = backend.sign_in("t1", "u1", "a@b.com");
        let u2 = backend.sign_in("t2", "u2", "j@b.com");
        let u3 = backend.sign_in("t3", "u3", "k@b.com");

        assert_eq!(resolve_landing(&backend.state, &u1).await, "/student");
        assert_eq!(resolve_landing(&backend.state, &u2).await, "/coordinator");
        assert_eq!(resolve_landing(&backend.state, &u3).await, "/login");
    }
}
