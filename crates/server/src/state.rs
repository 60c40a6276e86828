use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use catalog::Catalog;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub config: Arc<RwLock<ServerConfig>>,
    /// Resolved media roots; media requests outside them are refused.
    pub media_roots: Vec<PathBuf>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub objid: String,
    pub flag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub objid: String,
    pub criteria: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackUriQuery {
    pub path: String,
}

#[derive(Serialize)]
pub struct TrackUriResponse {
    pub media_url: String,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub started: bool,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub fn json_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
