//! HTTP API for Kinship.

use crate::node::NodeState;
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kinship_core::{Group, GroupId, GroupStore, User, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health (at root and under /api/v1 for compatibility)
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/ready", get(ready))
        .route("/api/v1/ready", get(ready))
        // Accounts
        .route("/api/v1/signup", post(signup))
        .route("/api/v1/signin", post(signin))
        // Groups
        .route("/api/v1/groups/:user_id", get(get_group))
        .route("/api/v1/users/:user_id/assign", post(assign))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Errors ---

/// Error returned by API handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Assignment(kinship_core::Error),
    Unauthorized,
    /// Valid token, but issued for a different user than the path names.
    Forbidden,
    /// Malformed body or path, as reported by the extractor.
    BadRequest(StatusCode, String),
    /// The request outlived the node's request timeout. Retryable.
    Timeout,
    Internal(String),
}

impl From<kinship_core::Error> for ApiError {
    fn from(e: kinship_core::Error) -> Self {
        ApiError::Assignment(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use kinship_core::Error;

        let (status, message) = match &self {
            ApiError::Assignment(Error::UserNotFound(_)) => {
                (StatusCode::NOT_FOUND, "User not found".to_string())
            }
            ApiError::Assignment(Error::GroupNotFound(_) | Error::Unassigned(_)) => {
                (StatusCode::NOT_FOUND, "Group not found".to_string())
            }
            ApiError::Assignment(e @ Error::InvalidInput(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Assignment(e @ Error::StoreUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Assignment(e @ Error::Corrupted(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Missing or invalid token".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Token does not belong to this user".to_string()),
            ApiError::BadRequest(status, message) => (*status, message.clone()),
            ApiError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "Request timed out".to_string()),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.clone()),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, "{}", message);
        }

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Run blocking store work off the async workers, bounded by the request
/// timeout. A timed-out call may still finish in the background; reporting
/// it as retryable is safe because assignment can be re-run.
async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&NodeState) -> kinship_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let timeout = state.config.request_timeout;
    let state = Arc::clone(state);
    let task = tokio::task::spawn_blocking(move || work(&state));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(e)) => Err(ApiError::Internal(format!("worker failed: {}", e))),
        Err(_) => Err(ApiError::Timeout),
    }
}

/// Check the bearer token and return the user it was issued for.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| state.tokens.verify(token.trim()))
        .ok_or(ApiError::Unauthorized)
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready() -> &'static str {
    // The group index is loaded before the router exists.
    "OK"
}

// --- Account endpoints ---

#[derive(Debug, Deserialize)]
struct SignupRequest {
    #[serde(default)]
    attributes: Vec<String>,
}

async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(req) = payload?;
    let user = run_blocking(&state, move |s| s.service.signup(req.attributes)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
struct SigninRequest {
    user_id: u64,
}

#[derive(Debug, Serialize)]
struct SigninResponse {
    token: String,
}

async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<Json<SigninResponse>, ApiError> {
    let Json(req) = payload?;
    let user = UserId(req.user_id);
    run_blocking(&state, move |s| s.service.store().get_user(user)).await?;
    Ok(Json(SigninResponse {
        token: state.tokens.issue(user),
    }))
}

// --- Group endpoints ---

async fn get_group(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    headers: HeaderMap,
) -> Result<Json<Group>, ApiError> {
    let Path(user_id) = path?;
    authorize(&state, &headers)?;
    let group = run_blocking(&state, move |s| s.service.get_group_for_user(UserId(user_id))).await?;
    Ok(Json(group))
}

#[derive(Debug, Default, Deserialize)]
struct AssignRequest {
    /// Attributes to match on; the user's stored attributes when absent
    attributes: Option<Vec<String>>,
}

impl AssignRequest {
    /// An empty body means "reuse the stored attributes".
    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| {
            ApiError::BadRequest(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssignResponse {
    user_id: UserId,
    group_id: GroupId,
}

async fn assign(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AssignResponse>, ApiError> {
    let Path(user_id) = path?;
    let user = UserId(user_id);
    if authorize(&state, &headers)? != user {
        return Err(ApiError::Forbidden);
    }
    let attributes = AssignRequest::parse(&body)?.attributes;

    let group_id = run_blocking(&state, move |s| match attributes {
        Some(attributes) => s.service.assign_user(user, &attributes),
        None => s.service.reassign_user(user),
    })
    .await?;

    Ok(Json(AssignResponse {
        user_id: user,
        group_id,
    }))
}
