//! In-memory fakes of the store, blob and identity boundaries.
//!
//! Every record store call is logged so tests can assert which steps ran,
//! and any operation can be made to fail with a chosen error.

use crate::blob::{BlobStore, UploadOptions};
use crate::config::AppConfig;
use crate::error::{AuthError, BlobError, StoreError};
use crate::identity::{IdentityProvider, Principal};
use crate::store::RecordStore;
use crate::types::{
    MemberStatus, Project, ProjectMembership, ProfileUpdate, RoleAssignment, UserProfile,
};
use crate::AppState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    UpsertProfile,
    GetProfile,
    UpdateProfile,
    InsertRole,
    GetRole,
    InsertProject,
    GetProject,
    FindProjectByCode,
    SetDocumentReference,
    FindMembership,
    InsertMembership,
    AcceptMembership,
    ListMemberships,
}

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, UserProfile>,
    roles: HashMap<String, RoleAssignment>,
    projects: HashMap<String, Project>,
    codes: HashMap<String, String>,
    memberships: HashMap<(String, String), ProjectMembership>,
}

#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<Tables>,
    calls: Mutex<Vec<StoreOp>>,
    faults: Mutex<HashMap<StoreOp, StoreError>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call of `op` fail with `error`
    pub fn fail_on(&self, op: StoreOp, error: StoreError) {
        self.faults.lock().insert(op, error);
    }

    pub fn calls(&self) -> Vec<StoreOp> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls.lock().iter().filter(|c| **c == op).count()
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.tables.lock().profiles.get(user_id).cloned()
    }

    pub fn role(&self, user_id: &str) -> Option<RoleAssignment> {
        self.tables.lock().roles.get(user_id).cloned()
    }

    pub fn project(&self, project_id: &str) -> Option<Project> {
        self.tables.lock().projects.get(project_id).cloned()
    }

    pub fn project_count(&self) -> usize {
        self.tables.lock().projects.len()
    }

    pub fn membership(&self, project_id: &str, user_id: &str) -> Option<ProjectMembership> {
        self.tables
            .lock()
            .memberships
            .get(&(project_id.to_string(), user_id.to_string()))
            .cloned()
    }

    pub fn membership_count(&self) -> usize {
        self.tables.lock().memberships.len()
    }

    // Seeding bypasses the call log and fault injection

    pub fn seed_profile(&self, profile: UserProfile) {
        self.tables.lock().profiles.insert(profile.id.clone(), profile);
    }

    pub fn seed_role(&self, user_id: &str, role: &str) {
        self.tables.lock().roles.insert(
            user_id.to_string(),
            RoleAssignment {
                user_id: user_id.to_string(),
                role: role.to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        );
    }

    pub fn seed_project(&self, project: Project) {
        let mut tables = self.tables.lock();
        tables.codes.insert(project.project_code.clone(), project.id.clone());
        tables.projects.insert(project.id.clone(), project);
    }

    pub fn seed_membership(&self, membership: ProjectMembership) {
        self.tables.lock().memberships.insert(
            (membership.project_id.clone(), membership.user_id.clone()),
            membership,
        );
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.calls.lock().push(op);
        match self.faults.lock().get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.enter(StoreOp::UpsertProfile)?;
        self.tables
            .lock()
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.enter(StoreOp::GetProfile)?;
        Ok(self.tables.lock().profiles.get(user_id).cloned())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        updated_at: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        self.enter(StoreOp::UpdateProfile)?;
        let mut tables = self.tables.lock();
        let Some(profile) = tables.profiles.get_mut(user_id) else {
            return Ok(None);
        };
        if let Some(full_name) = &update.full_name {
            profile.full_name = full_name.clone();
        }
        if let Some(avatar_url) = &update.avatar_url {
            profile.avatar_url = Some(avatar_url.clone());
        }
        profile.updated_at = updated_at.to_string();
        Ok(Some(profile.clone()))
    }

    async fn insert_role(&self, role: &RoleAssignment) -> Result<(), StoreError> {
        self.enter(StoreOp::InsertRole)?;
        let mut tables = self.tables.lock();
        if tables.roles.contains_key(&role.user_id) {
            return Err(StoreError::Conflict(format!("role for user {}", role.user_id)));
        }
        tables.roles.insert(role.user_id.clone(), role.clone());
        Ok(())
    }

    async fn get_role(&self, user_id: &str) -> Result<Option<RoleAssignment>, StoreError> {
        self.enter(StoreOp::GetRole)?;
        Ok(self.tables.lock().roles.get(user_id).cloned())
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.enter(StoreOp::InsertProject)?;
        let mut tables = self.tables.lock();
        if tables.projects.contains_key(&project.id) || tables.codes.contains_key(&project.project_code) {
            return Err(StoreError::Conflict(format!(
                "project {} or code {}",
                project.id, project.project_code
            )));
        }
        tables
            .codes
            .insert(project.project_code.clone(), project.id.clone());
        tables.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        self.enter(StoreOp::GetProject)?;
        Ok(self.tables.lock().projects.get(project_id).cloned())
    }

    async fn find_project_by_code(&self, code: &str) -> Result<Option<Project>, StoreError> {
        self.enter(StoreOp::FindProjectByCode)?;
        let tables = self.tables.lock();
        Ok(tables
            .codes
            .get(code)
            .and_then(|id| tables.projects.get(id))
            .cloned())
    }

    async fn set_document_reference(
        &self,
        project_id: &str,
        url: &str,
        updated_at: &str,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::SetDocumentReference)?;
        let mut tables = self.tables.lock();
        let project = tables
            .projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::Backend(format!("project {} does not exist", project_id)))?;
        project.document_reference = Some(url.to_string());
        project.updated_at = updated_at.to_string();
        Ok(())
    }

    async fn find_membership(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Option<ProjectMembership>, StoreError> {
        self.enter(StoreOp::FindMembership)?;
        let found = self.membership(project_id, user_id);
        // Let a concurrent request read the same state before anyone writes
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn insert_membership(&self, membership: &ProjectMembership) -> Result<(), StoreError> {
        self.enter(StoreOp::InsertMembership)?;
        let key = (membership.project_id.clone(), membership.user_id.clone());
        let mut tables = self.tables.lock();
        if tables.memberships.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "membership of user {} in project {}",
                membership.user_id, membership.project_id
            )));
        }
        tables.memberships.insert(key, membership.clone());
        Ok(())
    }

    async fn accept_membership(
        &self,
        project_id: &str,
        user_id: &str,
        responded_at: &str,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::AcceptMembership)?;
        let key = (project_id.to_string(), user_id.to_string());
        let mut tables = self.tables.lock();
        let membership = tables
            .memberships
            .get_mut(&key)
            .ok_or_else(|| StoreError::Backend("membership does not exist".to_string()))?;
        membership.status = MemberStatus::Accepted;
        membership.responded_at = Some(responded_at.to_string());
        Ok(())
    }

    async fn list_memberships(&self, user_id: &str) -> Result<Vec<ProjectMembership>, StoreError> {
        self.enter(StoreOp::ListMemberships)?;
        let mut memberships: Vec<_> = self
            .tables
            .lock()
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        memberships.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(memberships)
    }
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), StoredBlob>>,
    fault: Mutex<Option<BlobError>>,
    uploads: Mutex<usize>,
}

impl MemoryBlobStore {
    pub const BASE_URL: &'static str = "https://blobs.test";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, error: BlobError) {
        *self.fault.lock() = Some(error);
    }

    pub fn upload_count(&self) -> usize {
        *self.uploads.lock()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredBlob> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths stored in `bucket`, sorted
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<_> = self
            .objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: UploadOptions,
    ) -> Result<(), BlobError> {
        *self.uploads.lock() += 1;
        if let Some(error) = self.fault.lock().clone() {
            return Err(error);
        }

        let key = (bucket.to_string(), path.to_string());
        let mut objects = self.objects.lock();
        if !options.overwrite && objects.contains_key(&key) {
            return Err(BlobError(format!("The resource already exists: {}", path)));
        }
        objects.insert(
            key,
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", Self::BASE_URL, bucket, path)
    }
}

/// Identity provider that knows a fixed set of tokens
#[derive(Default)]
pub struct MemoryIdentity {
    tokens: Mutex<HashMap<String, Principal>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: &str, principal: Principal) {
        self.tokens.lock().insert(token.to_string(), principal);
    }

    pub fn is_active(&self, token: &str) -> bool {
        self.tokens.lock().contains_key(token)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredential("unknown token".to_string()))
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        match self.tokens.lock().remove(token) {
            Some(_) => Ok(()),
            None => Err(AuthError::InvalidCredential("unknown token".to_string())),
        }
    }
}

pub fn principal(id: &str, email: &str) -> Principal {
    Principal {
        id: id.to_string(),
        email: email.to_string(),
        photo_url: None,
    }
}

/// `AppState` wired to fresh in-memory fakes, with handles kept for
/// inspection
pub struct TestBackend {
    pub state: Arc<AppState>,
    pub records: Arc<MemoryRecordStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub identity: Arc<MemoryIdentity>,
}

impl TestBackend {
    pub fn new() -> Self {
        let records = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let identity = Arc::new(MemoryIdentity::new());
        let state = AppState::new(
            records.clone(),
            blobs.clone(),
            identity.clone(),
            AppConfig::default(),
        );
        Self {
            state,
            records,
            blobs,
            identity,
        }
    }

    /// Register `token` for a principal and return the principal
    pub fn sign_in(&self, token: &str, user_id: &str, email: &str) -> Principal {
        let principal = principal(user_id, email);
        self.identity.register(token, principal.clone());
        principal
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}
