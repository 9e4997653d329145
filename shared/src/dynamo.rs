//! DynamoDB record store.
//!
//! Single-table layout:
//!
//! | entity      | PK            | SK                 |
//! |-------------|---------------|--------------------|
//! | profile     | `USER#id`     | `PROFILE`          |
//! | role        | `USER#id`     | `ROLE`             |
//! | project     | `PROJECT#id`  | `PROJECT#id`       |
//! | join code   | `CODE#code`   | `CODE`             |
//! | membership  | `USER#uid`    | `MEMBERSHIP#pid`   |
//!
//! Keying memberships on (user, project) makes the pair unique; conditional
//! writes turn a second insert into `StoreError::Conflict`.

use crate::error::StoreError;
use crate::store::RecordStore;
use crate::types::{
    MemberStatus, PaperStandard, Project, ProjectMembership, ProjectRole, ProjectStatus,
    ProfileUpdate, RoleAssignment, UserProfile,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, Put, ReturnValue, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;

type Item = HashMap<String, AttributeValue>;

const PROFILE_SK: &str = "PROFILE";
const ROLE_SK: &str = "ROLE";
const CODE_SK: &str = "CODE";
const INSERT_ONLY: &str = "attribute_not_exists(PK)";
const MUST_EXIST: &str = "attribute_exists(PK)";

pub struct DynamoRecordStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoRecordStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get(&self, pk: String, sk: String) -> Result<Option<Item>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(sk))
            .send()
            .await
            .map_err(|e| backend("get_item", e))?;

        Ok(result.item().cloned())
    }
}

// ========== KEYS ==========

fn user_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

fn project_pk(project_id: &str) -> String {
    format!("PROJECT#{}", project_id)
}

fn code_pk(code: &str) -> String {
    format!("CODE#{}", code)
}

fn membership_sk(project_id: &str) -> String {
    format!("MEMBERSHIP#{}", project_id)
}

// ========== ATTRIBUTE HELPERS ==========

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn opt_s(value: Option<&str>) -> AttributeValue {
    match value {
        Some(v) => AttributeValue::S(v.to_string()),
        None => AttributeValue::Null(true),
    }
}

fn get_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).map(|v| v.to_string())
}

fn require_s(item: &Item, key: &str) -> Result<String, StoreError> {
    get_s(item, key).ok_or_else(|| StoreError::Backend(format!("Item is missing attribute '{}'", key)))
}

fn parse_attr<T>(item: &Item, key: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    require_s(item, key)?
        .parse()
        .map_err(|e: String| StoreError::Backend(format!("Corrupt attribute '{}': {}", key, e)))
}

fn backend<E>(operation: &str, e: E) -> StoreError
where
    E: std::error::Error,
{
    let message = format!("{} failed: {}", operation, DisplayErrorContext(e));
    tracing::error!("DynamoDB {}", message);
    StoreError::Backend(message)
}

// ========== ITEM CONVERSION ==========

fn profile_to_item(profile: &UserProfile) -> Item {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(user_pk(&profile.id)));
    item.insert("SK".to_string(), s(PROFILE_SK));
    item.insert("id".to_string(), s(&profile.id));
    item.insert("full_name".to_string(), s(&profile.full_name));
    item.insert("email".to_string(), s(&profile.email));
    item.insert("avatar_url".to_string(), opt_s(profile.avatar_url.as_deref()));
    item.insert("updated_at".to_string(), s(&profile.updated_at));
    item
}

fn profile_from_item(item: &Item) -> Result<UserProfile, StoreError> {
    Ok(UserProfile {
        id: require_s(item, "id")?,
        full_name: get_s(item, "full_name").unwrap_or_default(),
        email: get_s(item, "email").unwrap_or_default(),
        avatar_url: get_s(item, "avatar_url"),
        updated_at: get_s(item, "updated_at").unwrap_or_default(),
    })
}

fn role_to_item(role: &RoleAssignment) -> Item {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(user_pk(&role.user_id)));
    item.insert("SK".to_string(), s(ROLE_SK));
    item.insert("user_id".to_string(), s(&role.user_id));
    item.insert("role".to_string(), s(&role.role));
    item.insert("created_at".to_string(), s(&role.created_at));
    item
}

fn role_from_item(item: &Item) -> Result<RoleAssignment, StoreError> {
    Ok(RoleAssignment {
        user_id: require_s(item, "user_id")?,
        role: require_s(item, "role")?,
        created_at: get_s(item, "created_at").unwrap_or_default(),
    })
}

fn project_to_item(project: &Project) -> Result<Item, StoreError> {
    let pk = project_pk(&project.id);
    let keywords = serde_json::to_string(&project.keywords)
        .map_err(|e| StoreError::Backend(format!("Failed to encode keywords: {}", e)))?;

    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(&pk));
    item.insert("SK".to_string(), s(&pk));
    item.insert("id".to_string(), s(&project.id));
    item.insert("project_code".to_string(), s(&project.project_code));
    item.insert("title".to_string(), s(&project.title));
    item.insert("description".to_string(), s(&project.description));
    item.insert("abstract".to_string(), s(&project.abstract_text));
    item.insert("program".to_string(), opt_s(project.program.as_deref()));
    item.insert("course".to_string(), opt_s(project.course.as_deref()));
    item.insert("section".to_string(), opt_s(project.section.as_deref()));
    item.insert("project_type".to_string(), s(&project.project_type));
    item.insert("status".to_string(), s(project.status.as_str()));
    item.insert("paper_standard".to_string(), s(project.paper_standard.as_str()));
    item.insert("created_by".to_string(), s(&project.created_by));
    item.insert("keywords".to_string(), s(keywords));
    item.insert(
        "document_reference".to_string(),
        opt_s(project.document_reference.as_deref()),
    );
    item.insert("created_at".to_string(), s(&project.created_at));
    item.insert("updated_at".to_string(), s(&project.updated_at));
    Ok(item)
}

fn project_from_item(item: &Item) -> Result<Project, StoreError> {
    let status: ProjectStatus = parse_attr(item, "status")?;
    let paper_standard: PaperStandard = parse_attr(item, "paper_standard")?;

    Ok(Project {
        id: require_s(item, "id")?,
        project_code: require_s(item, "project_code")?,
        title: get_s(item, "title").unwrap_or_default(),
        description: get_s(item, "description").unwrap_or_default(),
        abstract_text: get_s(item, "abstract").unwrap_or_default(),
        program: get_s(item, "program"),
        course: get_s(item, "course"),
        section: get_s(item, "section"),
        project_type: get_s(item, "project_type").unwrap_or_default(),
        status,
        paper_standard,
        created_by: require_s(item, "created_by")?,
        keywords: get_s(item, "keywords")
            .map(|k| serde_json::from_str(&k).unwrap_or_default())
            .unwrap_or_default(),
        document_reference: get_s(item, "document_reference"),
        created_at: get_s(item, "created_at").unwrap_or_default(),
        updated_at: get_s(item, "updated_at").unwrap_or_default(),
    })
}

fn code_to_item(project: &Project) -> Item {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(code_pk(&project.project_code)));
    item.insert("SK".to_string(), s(CODE_SK));
    item.insert("project_id".to_string(), s(&project.id));
    item
}

fn membership_to_item(membership: &ProjectMembership) -> Item {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), s(user_pk(&membership.user_id)));
    item.insert("SK".to_string(), s(membership_sk(&membership.project_id)));
    item.insert("id".to_string(), s(&membership.id));
    item.insert("project_id".to_string(), s(&membership.project_id));
    item.insert("user_id".to_string(), s(&membership.user_id));
    item.insert("role".to_string(), s(membership.role.as_str()));
    item.insert("status".to_string(), s(membership.status.as_str()));
    item.insert("created_at".to_string(), s(&membership.created_at));
    item.insert(
        "responded_at".to_string(),
        opt_s(membership.responded_at.as_deref()),
    );
    item
}

fn membership_from_item(item: &Item) -> Result<ProjectMembership, StoreError> {
    let role: ProjectRole = parse_attr(item, "role")?;
    let status: MemberStatus = parse_attr(item, "status")?;

    Ok(ProjectMembership {
        id: require_s(item, "id")?,
        project_id: require_s(item, "project_id")?,
        user_id: require_s(item, "user_id")?,
        role,
        status,
        created_at: get_s(item, "created_at").unwrap_or_default(),
        responded_at: get_s(item, "responded_at"),
    })
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(profile_to_item(profile)))
            .send()
            .await
            .map_err(|e| backend("put_item", e))?;
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.get(user_pk(user_id), PROFILE_SK.to_string())
            .await?
            .map(|item| profile_from_item(&item))
            .transpose()
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        updated_at: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        let mut update_expr = vec!["updated_at = :updated_at"];
        let mut expr_values = HashMap::new();
        expr_values.insert(":updated_at".to_string(), s(updated_at));

        if let Some(full_name) = &update.full_name {
            update_expr.push("full_name = :full_name");
            expr_values.insert(":full_name".to_string(), s(full_name));
        }

        if let Some(avatar_url) = &update.avatar_url {
            update_expr.push("avatar_url = :avatar_url");
            expr_values.insert(":avatar_url".to_string(), s(avatar_url));
        }

        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(user_pk(user_id)))
            .key("SK", s(PROFILE_SK))
            .update_expression(format!("SET {}", update_expr.join(", ")))
            .condition_expression(MUST_EXIST)
            .return_values(ReturnValue::AllNew);

        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }

        match builder.send().await {
            Ok(output) => output.attributes().map(profile_from_item).transpose(),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Ok(None)
            }
            Err(e) => Err(backend("update_item", e)),
        }
    }

    async fn insert_role(&self, role: &RoleAssignment) -> Result<(), StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(role_to_item(role)))
            .condition_expression(INSERT_ONLY)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::Conflict(format!("role for user {}", role.user_id)))
            }
            Err(e) => Err(backend("put_item", e)),
        }
    }

    async fn get_role(&self, user_id: &str) -> Result<Option<RoleAssignment>, StoreError> {
        self.get(user_pk(user_id), ROLE_SK.to_string())
            .await?
            .map(|item| role_from_item(&item))
            .transpose()
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        // Project row and its code reservation are written together so a
        // code can never point at a missing project.
        let build_put = |item: Item| {
            Put::builder()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .condition_expression(INSERT_ONLY)
                .build()
                .map_err(|e| StoreError::Backend(format!("Failed to build put request: {}", e)))
        };

        let project_put = build_put(project_to_item(project)?)?;
        let code_put = build_put(code_to_item(project))?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(project_put).build())
            .transact_items(TransactWriteItem::builder().put(code_put).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_transaction_canceled_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::Conflict(format!(
                    "project {} or code {}",
                    project.id, project.project_code
                )))
            }
            Err(e) => Err(backend("transact_write_items", e)),
        }
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let pk = project_pk(project_id);
        self.get(pk.clone(), pk)
            .await?
            .map(|item| project_from_item(&item))
            .transpose()
    }

    async fn find_project_by_code(&self, code: &str) -> Result<Option<Project>, StoreError> {
        let Some(pointer) = self.get(code_pk(code), CODE_SK.to_string()).await? else {
            return Ok(None);
        };
        let project_id = require_s(&pointer, "project_id")?;
        self.get_project(&project_id).await
    }

    async fn set_document_reference(
        &self,
        project_id: &str,
        url: &str,
        updated_at: &str,
    ) -> Result<(), StoreError> {
        let pk = project_pk(project_id);
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(&pk))
            .key("SK", s(&pk))
            .update_expression("SET document_reference = :url, updated_at = :now")
            .condition_expression(MUST_EXIST)
            .expression_attribute_values(":url", s(url))
            .expression_attribute_values(":now", s(updated_at))
            .send()
            .await
            .map_err(|e| backend("update_item", e))?;
        Ok(())
    }

    async fn find_membership(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> Result<Option<ProjectMembership>, StoreError> {
        self.get(user_pk(user_id), membership_sk(project_id))
            .await?
            .map(|item| membership_from_item(&item))
            .transpose()
    }

    async fn insert_membership(&self, membership: &ProjectMembership) -> Result<(), StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(membership_to_item(membership)))
            .condition_expression(INSERT_ONLY)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::Conflict(format!(
                    "membership of user {} in project {}",
                    membership.user_id, membership.project_id
                )))
            }
            Err(e) => Err(backend("put_item", e)),
        }
    }

    async fn accept_membership(
        &self,
        project_id: &str,
        user_id: &str,
        responded_at: &str,
    ) -> Result<(), StoreError> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", s(user_pk(user_id)))
            .key("SK", s(membership_sk(project_id)))
            .update_expression("SET #status = :accepted, responded_at = :now")
            .condition_expression(MUST_EXIST)
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":accepted", s(MemberStatus::Accepted.as_str()))
            .expression_attribute_values(":now", s(responded_at))
            .send()
            .await
            .map_err(|e| backend("update_item", e))?;
        Ok(())
    }

    async fn list_memberships(&self, user_id: &str) -> Result<Vec<ProjectMembership>, StoreError> {
        let mut memberships = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", s(user_pk(user_id)))
                .expression_attribute_values(":sk_prefix", s("MEMBERSHIP#"))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| backend("query", e))?;

            for item in result.items() {
                memberships.push(membership_from_item(item)?);
            }

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(memberships)
    }
}
