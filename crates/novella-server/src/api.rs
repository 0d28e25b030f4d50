use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use novella_shared::codec::{decode_patch, Entity};
use novella_shared::constants::DEFAULT_LIST_LIMIT;
use novella_shared::models::{NewStory, ProfilePatch, ProfileUpsert, Story};
use novella_shared::query::SearchQuery;

use crate::backend::Backend;
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/stories", get(list_stories).post(create_story))
        .route("/stories/import", post(import_story))
        .route("/stories/search", get(search_stories))
        .route("/stories/popular", get(popular_stories))
        .route("/stories/recent", get(recent_stories))
        .route(
            "/stories/:id",
            get(get_story).patch(update_story).delete(delete_story),
        )
        .route("/users/:uid/stories", get(stories_by_owner))
        .route("/profiles", get(list_profiles))
        .route(
            "/profiles/:uid",
            get(get_profile).put(upsert_profile).patch(update_profile),
        );

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    write_protected: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        write_protected: state.config.write_token.is_some(),
    })
}

/// Mutating routes require `Authorization: Bearer <WRITE_TOKEN>` when a token
/// is configured.
fn verify_write_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.write_token else {
        return Ok(());
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid write token".into()));
    }

    Ok(())
}

fn encode_all<E: Entity>(records: &[E]) -> Json<Value> {
    Json(Value::Array(records.iter().map(Entity::encode).collect()))
}

// ─── Stories ───

async fn list_stories(
    State(state): State<AppState>,
    Query(owner): Query<OwnerQuery>,
) -> Json<Value> {
    let stories = match owner.user_id {
        Some(user_id) => state.backend.by_owner(&user_id).await,
        None => state.backend.stories().await,
    };
    encode_all(&stories)
}

async fn get_story(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let story = state.backend.story(&id).await?;
    Ok(Json(story.encode()))
}

async fn create_story(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(new): Json<NewStory>,
) -> Result<Json<Value>, ServerError> {
    verify_write_token(&headers, &state.config)?;
    if new.title.trim().is_empty() {
        return Err(ServerError::BadRequest("Title must not be empty".into()));
    }
    let story = state.backend.create_story(new).await?;
    Ok(Json(story.encode()))
}

/// Create a story under the id and timestamps supplied by the client.
async fn import_story(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    verify_write_token(&headers, &state.config)?;
    let story = Story::decode(body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let story = state.backend.import_story(story).await?;
    Ok(Json(story.encode()))
}

async fn update_story(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    verify_write_token(&headers, &state.config)?;
    let patch = decode_patch(body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let story = state.backend.update_story(&id, patch).await?;
    Ok(Json(story.encode()))
}

async fn delete_story(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    verify_write_token(&headers, &state.config)?;
    state.backend.delete_story(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn search_stories(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Value> {
    let (text, filters) = query.into_parts();
    encode_all(&state.backend.search(&text, &filters).await)
}

async fn popular_stories(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Json<Value> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    encode_all(&state.backend.popular(limit).await)
}

async fn recent_stories(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Json<Value> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    encode_all(&state.backend.recent(limit).await)
}

async fn stories_by_owner(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Json<Value> {
    encode_all(&state.backend.by_owner(&uid).await)
}

// ─── Profiles ───

async fn list_profiles(State(state): State<AppState>) -> Json<Value> {
    encode_all(&state.backend.profiles().await)
}

async fn get_profile(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let profile = state.backend.profile(&uid).await?;
    Ok(Json(profile.encode()))
}

async fn upsert_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(upsert): Json<ProfileUpsert>,
) -> Result<Json<Value>, ServerError> {
    verify_write_token(&headers, &state.config)?;
    let profile = state.backend.upsert_profile(&uid, upsert).await?;
    Ok(Json(profile.encode()))
}

async fn update_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<Value>, ServerError> {
    verify_write_token(&headers, &state.config)?;
    let profile = state.backend.update_profile(&uid, patch).await?;
    Ok(Json(profile.encode()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
