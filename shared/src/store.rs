//! Record store boundary.
//!
//! Services talk to durable state only through [`RecordStore`]. The
//! production adapter is [`crate::dynamo::DynamoRecordStore`]; tests use the
//! in-memory store from [`crate::memory`].

use crate::error::StoreError;
use crate::types::{Project, ProjectMembership, ProfileUpdate, RoleAssignment, UserProfile};
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or overwrite the profile keyed on `profile.id`
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Apply the set fields of `update`. Returns `None` when no profile
    /// exists for `user_id`.
    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        updated_at: &str,
    ) -> Result<Option<UserProfile>, StoreError>;

    /// Insert-or-fail: `StoreError::Conflict` when a role already exists
    async fn insert_role(&self, role: &RoleAssignment) -> Result<(), StoreError>;

    async fn get_role(&self, user_id: &str) -> Result<Option<RoleAssignment>, StoreError>;

    /// Insert-or-fail on both the project id and its join code
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError>;

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;

    async fn find_project_by_code(&self, code: &str) -> Result<Option<Project>, StoreError>;

    async fn set_document_reference(
        &self,
        project_id: &str,
        url: &str,
        updated_at: &str,
    ) -> Result<(), StoreError>;

    async fn find_membership(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Option<ProjectMembership>, StoreError>;

    /// Insert-or-fail on the (project, user) pair
    async fn insert_membership(&self, membership: &ProjectMembership) -> Result<(), StoreError>;

    /// Mark an existing membership accepted; its role is left untouched
    async fn accept_membership(
        &self,
        project_id: &str,
        user_id: &str,
        responded_at: &str,
    ) -> Result<(), StoreError>;

    async fn list_memberships(&self, user_id: &str) -> Result<Vec<ProjectMembership>, StoreError>;
}
