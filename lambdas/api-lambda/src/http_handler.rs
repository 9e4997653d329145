use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, Response,
};
use serde::Serialize;
use std::sync::Arc;
use thesis_shared::error::ServiceError;
use thesis_shared::http::{self as reply, bearer_token, content_type};
use thesis_shared::identity::{self, Principal};
use thesis_shared::invites::{self, InviteMemberRequest};
use thesis_shared::membership::{self, JoinProjectRequest};
use thesis_shared::multipart::parse_form;
use thesis_shared::onboarding::{self, CompleteProfileRequest, LOGIN_PATH};
use thesis_shared::projects::{self, CreateProjectRequest};
use thesis_shared::users::{self, UpdateProfileRequest};
use thesis_shared::AppState;

/// Main Lambda handler. Any error escaping a route becomes a generic 500.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    tracing::info!(
        "API invoked - Method: {} Path: {}",
        event.method(),
        event.uri().path()
    );

    match route(&event, &state).await {
        Ok(resp) => Ok(resp),
        Err(e) => {
            tracing::error!("Unhandled error on {}: {}", event.uri().path(), e);
            ServiceError::Unexpected("Internal server error".to_string()).into_response()
        }
    }
}

async fn route(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path().trim_end_matches('/');

    // Handle CORS preflight
    if *method == Method::OPTIONS {
        return reply::preflight();
    }

    match path {
        "/profile/complete" => match *method {
            Method::POST => complete_profile(event, state).await,
            _ => reply::method_not_allowed(),
        },
        "/projects/join" => match *method {
            Method::POST => {
                let req: JoinProjectRequest = serde_json::from_slice(event.body())?;
                let result =
                    membership::join_project(state, bearer_token(event.headers()), req).await;
                respond(StatusCode::OK, result)
            }
            _ => reply::method_not_allowed(),
        },
        "/projects" => match *method {
            Method::POST => {
                let form = parse_form(content_type(event.headers()), event.body()).await?;
                let result = projects::create_project(
                    state,
                    bearer_token(event.headers()),
                    CreateProjectRequest::from_form(form),
                )
                .await;
                respond(StatusCode::CREATED, result)
            }
            Method::GET => {
                let result = projects::list_projects(state, bearer_token(event.headers()))
                    .await
                    .map(|projects| serde_json::json!({"success": true, "projects": projects}));
                respond(StatusCode::OK, result)
            }
            _ => reply::method_not_allowed(),
        },
        "/invitations" => match *method {
            Method::GET => {
                let result = invites::list_invitations(state, bearer_token(event.headers()))
                    .await
                    .map(|invitations| {
                        serde_json::json!({"success": true, "invitations": invitations})
                    });
                respond(StatusCode::OK, result)
            }
            _ => reply::method_not_allowed(),
        },
        "/auth/landing" => match *method {
            Method::GET => landing(event, state).await,
            _ => reply::method_not_allowed(),
        },
        "/auth/signout" => match *method {
            Method::POST => sign_out(event, state).await,
            _ => reply::method_not_allowed(),
        },
        "/users/me" => match *method {
            Method::GET => {
                let result = users::get_profile(state, bearer_token(event.headers())).await;
                respond(StatusCode::OK, result)
            }
            Method::PATCH => {
                let req: UpdateProfileRequest = serde_json::from_slice(event.body())?;
                let result =
                    users::update_profile(state, bearer_token(event.headers()), req).await;
                respond(StatusCode::OK, result)
            }
            _ => reply::method_not_allowed(),
        },
        "/users/me/avatar" => match *method {
            Method::POST => {
                let mut form = parse_form(content_type(event.headers()), event.body()).await?;
                let file = form.take_file("file");
                let result = users::upload_profile_picture(
                    state,
                    bearer_token(event.headers()),
                    form.text("userId"),
                    file,
                )
                .await;
                respond(StatusCode::OK, result)
            }
            _ => reply::method_not_allowed(),
        },
        _ => match invitation_project_id(path) {
            Some(project_id) => match *method {
                Method::POST => {
                    let req: InviteMemberRequest = serde_json::from_slice(event.body())?;
                    let result = invites::invite_member(
                        state,
                        bearer_token(event.headers()),
                        project_id,
                        req,
                    )
                    .await;
                    respond(StatusCode::CREATED, result)
                }
                _ => reply::method_not_allowed(),
            },
            None => reply::not_found(),
        },
    }
}

/// `{id}` from `/projects/{id}/invitations`
fn invitation_project_id(path: &str) -> Option<&str> {
    path.strip_prefix("/projects/")?
        .strip_suffix("/invitations")
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

fn respond<T: Serialize>(
    status: StatusCode,
    result: Result<T, ServiceError>,
) -> Result<Response<Body>, Error> {
    match result {
        Ok(value) => reply::json_response(status, &value),
        Err(e) => {
            tracing::info!("Request failed with {}: {}", e.status(), e);
            e.into_response()
        }
    }
}

async fn complete_profile(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let principal = match caller(event, state).await {
        Ok(principal) => principal,
        Err(e) => return e.into_response(),
    };

    let mut form = parse_form(content_type(event.headers()), event.body()).await?;
    let field = |name: &str| form.text(name).map(str::to_string);
    let user_id = field("userId").unwrap_or_default();
    if !user_id.is_empty() && user_id != principal.id {
        tracing::warn!(
            "Profile completion for {} attempted by {}",
            user_id,
            principal.id
        );
        return ServiceError::unauthorized().into_response();
    }

    let req = CompleteProfileRequest {
        user_id,
        email: field("email").unwrap_or_default(),
        display_name: field("displayName").unwrap_or_default(),
        role: field("role").unwrap_or_default(),
        external_photo_url: field("googlePhotoUrl"),
        avatar: form.take_file("avatar"),
    };

    respond(StatusCode::OK, onboarding::complete_profile(state, req).await)
}

async fn landing(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let redirect_path = match caller(event, state).await {
        Ok(principal) => onboarding::resolve_landing(state, &principal).await,
        Err(_) => LOGIN_PATH.to_string(),
    };
    reply::json_response(
        StatusCode::OK,
        &serde_json::json!({"success": true, "redirectPath": redirect_path}),
    )
}

async fn sign_out(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let Some(token) = bearer_token(event.headers()) else {
        return ServiceError::unauthorized().into_response();
    };
    match state.identity.sign_out(token).await {
        Ok(()) => reply::json_response(StatusCode::OK, &serde_json::json!({"success": true})),
        Err(e) => ServiceError::from(e).into_response(),
    }
}

async fn caller(event: &Request, state: &AppState) -> Result<Principal, ServiceError> {
    Ok(identity::authenticate(state.identity.as_ref(), bearer_token(event.headers())).await?)
}
