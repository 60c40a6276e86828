use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use catalog::{BrowseFlag, BrowseResult, CatalogError, CatalogStatus};
use tracing::warn;

use crate::media;
use crate::state::{
    json_error, AppState, BrowseQuery, HealthResponse, JsonResult, SearchQuery, TrackUriQuery,
    TrackUriResponse, UpdateResponse,
};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/browse", get(browse))
        .route("/api/v1/search", get(search))
        .route("/api/v1/status", get(status))
        .route("/api/v1/update", post(update))
        .route("/api/v1/trackuri", get(trackuri))
        .route("/media/*path", get(media::serve))
        .route("/waiting", get(waiting))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Target of the transient placeholder entry's URI.
async fn waiting() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

async fn browse(
    State(state): State<AppState>,
    Query(params): Query<BrowseQuery>,
) -> JsonResult<BrowseResult> {
    let flag = match params.flag.as_deref() {
        None => BrowseFlag::Children,
        Some(value) => BrowseFlag::parse(value).map_err(request_error)?,
    };
    state
        .catalog
        .browse(&params.objid, flag)
        .map(Json)
        .map_err(request_error)
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> JsonResult<BrowseResult> {
    state
        .catalog
        .search(&params.objid, &params.criteria)
        .map(Json)
        .map_err(request_error)
}

async fn status(State(state): State<AppState>) -> Json<CatalogStatus> {
    Json(state.catalog.status())
}

async fn update(State(state): State<AppState>) -> Json<UpdateResponse> {
    let started = state.catalog.start_update();
    Json(UpdateResponse { started })
}

/// Resolve an index path to a directly streamable URL through the
/// configured prefix map.
async fn trackuri(
    State(state): State<AppState>,
    Query(params): Query<TrackUriQuery>,
) -> JsonResult<TrackUriResponse> {
    let path = params
        .path
        .strip_prefix("/media")
        .unwrap_or(&params.path)
        .to_string();
    let config = state.config.read().clone();
    let mapped = config
        .effective_path_map()
        .iter()
        .filter(|(from, _)| path.starts_with(from.as_str()))
        .max_by_key(|(from, _)| from.len())
        .map(|(from, to)| format!("{}{}", to, &path[from.len()..]));
    let Some(mapped) = mapped else {
        warn!("trackuri: no path map entry for {}", path);
        return Err(json_error(StatusCode::NOT_FOUND, "path not mapped"));
    };
    let urls = catalog::MediaUrls::new(&config.advertised_host(), "media");
    Ok(Json(TrackUriResponse {
        media_url: urls.file(&mapped),
    }))
}

fn request_error(err: CatalogError) -> (StatusCode, Json<crate::state::ErrorResponse>) {
    match &err {
        CatalogError::BadObjectId(_) | CatalogError::BadSearch(_) => {
            json_error(StatusCode::BAD_REQUEST, err.to_string())
        }
        _ => {
            warn!("request failed: {}", err);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}
