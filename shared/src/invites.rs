use crate::error::{ServiceError, StoreError};
use crate::identity;
use crate::projects::{memberships_with_status, MembershipView};
use crate::types::{MemberStatus, ProjectMembership, ProjectRole};
use crate::AppState;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ALREADY_INVITED: &str = "User is already invited to or a member of this project";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteMemberRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InviteOutcome {
    pub success: bool,
    pub message: String,
    pub invitation: ProjectMembership,
}

/// Invite a user into a project as a pending member. Only the project
/// leader (or its creator) may invite.
pub async fn invite_member(
    state: &AppState,
    bearer: Option<&str>,
    project_id: &str,
    req: InviteMemberRequest,
) -> Result<InviteOutcome, ServiceError> {
    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;

    let invitee = req.user_id.trim();
    if invitee.is_empty() {
        return Err(ServiceError::Validation("User ID is required".to_string()));
    }
    let role = match req.role.trim().parse::<ProjectRole>() {
        Ok(ProjectRole::Leader) | Err(_) => {
            return Err(ServiceError::Validation(
                "Role must be adviser, co_adviser, or student".to_string(),
            ))
        }
        Ok(role) => role,
    };

    let project = state
        .records
        .get_project(project_id)
        .await
        .map_err(|e| {
            tracing::error!("Project lookup failed for {}: {}", project_id, e);
            ServiceError::Upstream(format!("Failed to load project: {}", e))
        })?
        .ok_or_else(|| ServiceError::NotFound("Project not found".to_string()))?;

    if project.created_by != principal.id {
        let caller = state
            .records
            .find_membership(project_id, &principal.id)
            .await
            .map_err(|e| {
                ServiceError::Upstream(format!("Failed to check membership status: {}", e))
            })?;
        let is_leader = matches!(
            caller,
            Some(ProjectMembership {
                role: ProjectRole::Leader,
                status: MemberStatus::Accepted,
                ..
            })
        );
        if !is_leader {
            tracing::warn!("User {} may not invite into project {}", principal.id, project_id);
            return Err(ServiceError::Forbidden(
                "Only the project leader can invite members".to_string(),
            ));
        }
    }

    let invitation = ProjectMembership {
        id: Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        user_id: invitee.to_string(),
        role,
        status: MemberStatus::Pending,
        created_at: Utc::now().to_rfc3339(),
        responded_at: None,
    };

    match state.records.insert_membership(&invitation).await {
        Ok(()) => {}
        Err(StoreError::Conflict(_)) => {
            return Err(ServiceError::Conflict(ALREADY_INVITED.to_string()))
        }
        Err(e) => {
            tracing::error!("Failed to create invitation: {}", e);
            return Err(ServiceError::Upstream(format!(
                "Failed to create invitation: {}",
                e
            )));
        }
    }

    tracing::info!(
        "User {} invited {} to {} as {}",
        principal.id,
        invitee,
        project.id,
        role.as_str()
    );
    Ok(InviteOutcome {
        success: true,
        message: "Invitation sent".to_string(),
        invitation,
    })
}

/// Pending invitations addressed to the caller
pub async fn list_invitations(
    state: &AppState,
    bearer: Option<&str>,
) -> Result<Vec<MembershipView>, ServiceError> {
    let principal = identity::authenticate(state.identity.as_ref(), bearer).await?;
    memberships_with_status(state, &principal, MemberStatus::Pending).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{join_project, JoinProjectRequest};
    use crate::memory::TestBackend;
    use crate::projects::{create_project, CreateProjectRequest};

    fn invite(user_id: &str, role: &str) -> InviteMemberRequest {
        InviteMemberRequest {
            user_id: user_id.to_string(),
            role: role.to_string(),
        }
    }

    async fn setup() -> (TestBackend, String, String) {
        let backend = TestBackend::new();
        backend.sign_in("tok-lead", "lead", "lead@uni.edu");
        backend.sign_in("tok-adv", "adv", "adv@uni.edu");
        backend.records.seed_role("adv", "adviser");

        let created = create_project(
            &backend.state,
            Some("tok-lead"),
            CreateProjectRequest {
                title: "Flood Mapping".to_string(),
                description: "GIS study".to_string(),
                research_type: "IAAA".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        (backend, created.project_id, created.project_code)
    }

    #[tokio::test]
    async fn test_invite_then_accept_by_code() {
        let (backend, project_id, project_code) = setup().await;

        let outcome = invite_member(&backend.state, Some("tok-lead"), &project_id, invite("adv", "co_adviser"))
            .await
            .unwrap();
        assert_eq!(outcome.invitation.status, MemberStatus::Pending);

        let pending = list_invitations(&backend.state, Some("tok-adv")).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].role, ProjectRole::CoAdviser);
        assert_eq!(pending[0].project.as_ref().unwrap().title, "Flood Mapping");

        join_project(
            &backend.state,
            Some("tok-adv"),
            JoinProjectRequest {
                project_code,
                user_id: "adv".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(list_invitations(&backend.state, Some("tok-adv")).await.unwrap().is_empty());
        let membership = backend.records.membership(&project_id, "adv").unwrap();
        assert_eq!(membership.role, ProjectRole::CoAdviser);
        assert_eq!(membership.status, MemberStatus::Accepted);
    }

    #[tokio::test]
    async fn test_only_leader_may_invite() {
        let (backend, project_id, _) = setup().await;

        let err = invite_member(&backend.state, Some("tok-adv"), &project_id, invite("someone", "student"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        assert!(backend.records.membership(&project_id, "someone").is_none());
    }

    #[tokio::test]
    async fn test_invite_rejections() {
        let (backend, project_id, _) = setup().await;

        let err = invite_member(&backend.state, Some("tok-lead"), &project_id, invite("adv", "leader"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = invite_member(&backend.state, Some("tok-lead"), "missing", invite("adv", "student"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // the leader already has a row
        let err = invite_member(&backend.state, Some("tok-lead"), &project_id, invite("lead", "student"))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Conflict(ALREADY_INVITED.to_string()));

        let err = invite_member(&backend.state, None, &project_id, invite("adv", "student"))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::unauthorized());
    }
}
