//! HTTP route definitions

use axum::{
    extract::{Extension, Query, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::lobby::{GameSummary, LobbyError};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/games", post(create_game_handler).get(list_games_handler))
        .route("/games/join", post(join_game_handler))
        .route("/games/leave", post(leave_game_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    connected_players: usize,
    open_games: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.registry.active_matches(),
        connected_players: state.sessions.connected_count(),
        open_games: state.lobby.open_games(),
    })
}

// ============================================================================
// Lobby endpoints
// ============================================================================

#[derive(Deserialize)]
struct CreateGameRequest {
    name: String,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GameIdResponse {
    id: Uuid,
}

async fn create_game_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<CreateGameRequest>,
) -> Result<Json<GameIdResponse>, AppError> {
    let record = state
        .lobby
        .create(auth.user_id, &req.name, req.password.as_deref())?;

    info!(user_id = %auth.user_id, game_id = %record.id, "Game created");
    Ok(Json(GameIdResponse { id: record.id }))
}

#[derive(Deserialize)]
struct ListGamesQuery {
    #[serde(default)]
    page: usize,
    #[serde(default)]
    name: Option<String>,
}

async fn list_games_handler(
    State(state): State<AppState>,
    Query(query): Query<ListGamesQuery>,
) -> Json<Vec<GameSummary>> {
    Json(state.lobby.list(query.page, query.name.as_deref()))
}

#[derive(Deserialize)]
struct JoinGameRequest {
    id: Uuid,
    #[serde(default)]
    password: Option<String>,
}

async fn join_game_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(req): Json<JoinGameRequest>,
) -> Result<Json<GameIdResponse>, AppError> {
    let record = state
        .lobby
        .join(auth.user_id, req.id, req.password.as_deref())?;

    // The second participant's arrival pairs the record into a match
    if let Some(second) = record.second {
        state.registry.create(record.id, record.creator, second);
    }

    info!(user_id = %auth.user_id, game_id = %record.id, "Game joined");
    Ok(Json(GameIdResponse { id: record.id }))
}

async fn leave_game_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<StatusCode, AppError> {
    let record = state.lobby.leave(auth.user_id)?;

    if let Err(e) = state.coordinator.leave(auth.user_id).await {
        // Unpaired games never had a match
        debug!(user_id = %auth.user_id, error = %e, "No match to tear down");
    }

    info!(user_id = %auth.user_id, game_id = %record.id, "Game left");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<LobbyError> for AppError {
    fn from(err: LobbyError) -> Self {
        let message = err.to_string();
        match err {
            LobbyError::NotFound(_) | LobbyError::NotInGame(_) => AppError::NotFound(message),
            LobbyError::WrongPassword => AppError::Forbidden(message),
            LobbyError::AlreadyInGame(_) | LobbyError::Full(_) => AppError::Conflict(message),
            LobbyError::InvalidName => AppError::BadRequest(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::http::middleware::issue_test_token;
    use crate::util::time::unix_secs;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn bearer(state: &AppState, user: Uuid) -> String {
        let token = issue_test_token(user, &state.config.jwt_secret, unix_secs() + 600);
        format!("Bearer {}", token)
    }

    async fn call(
        state: &AppState,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, bearer(state, user));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let state = AppState::new(test_config());
        let (status, body) = call(&state, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_matches"], 0);
        assert_eq!(body["connected_players"], 0);
        assert_eq!(body["open_games"], 0);
    }

    #[tokio::test]
    async fn lobby_routes_require_bearer() {
        let state = AppState::new(test_config());
        let (status, _) = call(&state, Method::GET, "/games", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/games")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_join_and_leave_game() {
        let state = AppState::new(test_config());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (status, body) = call(
            &state,
            Method::POST,
            "/games",
            Some(alice),
            Some(json!({"name": "harbor", "password": "salt"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &state,
            Method::POST,
            "/games",
            Some(alice),
            Some(json!({"name": "again"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&state, Method::GET, "/games?name=harb", Some(bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], id.as_str());
        assert_eq!(body[0]["with_password"], true);

        let (status, _) = call(
            &state,
            Method::POST,
            "/games/join",
            Some(bob),
            Some(json!({"id": id, "password": "pepper"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &state,
            Method::POST,
            "/games/join",
            Some(bob),
            Some(json!({"id": id, "password": "salt"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.registry.match_for(alice).is_some());
        assert!(state.registry.match_for(bob).is_some());

        let (status, _) = call(&state, Method::POST, "/games/leave", Some(bob), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.registry.match_for(alice).is_none());
        assert!(state.lobby.record_for(alice).is_none());
    }

    #[tokio::test]
    async fn joining_unknown_game_is_not_found() {
        let state = AppState::new(test_config());
        let (status, body) = call(
            &state,
            Method::POST,
            "/games/join",
            Some(Uuid::new_v4()),
            Some(json!({"id": Uuid::new_v4()})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }
}
