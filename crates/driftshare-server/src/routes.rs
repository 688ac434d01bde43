use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use driftshare_registry::{RegistryError, ShareRegistry};
use driftshare_types::api::{
    CreateShareRequest, CreateShareResponse, ErrorResponse, ResolveShareQuery,
    ResolveShareResponse,
};
use tracing::{info, warn};

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: ShareRegistry,
}

/// Error half of every handler result: status plus `{ "error": ... }`.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

fn registry_error(e: RegistryError) -> ApiError {
    match e {
        RegistryError::NotFound => error(StatusCode::NOT_FOUND, "Share not found"),
        RegistryError::MissingToken => error(StatusCode::BAD_REQUEST, "Share ID not provided"),
        RegistryError::InvalidInput(_) => error(StatusCode::BAD_REQUEST, "Peer ID not provided"),
        RegistryError::Store(msg) => {
            warn!("Share store failure: {}", msg);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/share
///
/// The body is parsed by hand so that a missing or malformed body gets the
/// same answer as a missing `peerId`.
pub async fn create_share(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let peer_id = serde_json::from_slice::<CreateShareRequest>(&body)
        .ok()
        .and_then(|req| req.peer_id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Peer ID not provided"))?;

    let share_id = state.registry.create(&peer_id).map_err(registry_error)?;
    info!(share_id = %share_id, "Share created");

    Ok(Json(CreateShareResponse { share_id }))
}

/// GET /api/share?id=...
pub async fn resolve_share(
    State(state): State<AppState>,
    Query(query): Query<ResolveShareQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let peer_id = state
        .registry
        .resolve(query.id.as_deref())
        .map_err(registry_error)?;

    Ok(Json(ResolveShareResponse { peer_id }))
}

pub async fn health() -> &'static str {
    "ok"
}
