//! Media and cover-art serving: indexed files with byte-range support,
//! and embedded pictures extracted on demand when the `embed` query flag
//! is set.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub embed: Option<u8>,
}

/// Requested byte window of a file, already clamped to its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOutcome {
    Full,
    Partial(u64, u64),
    Unsatisfiable,
}

pub async fn serve(
    State(state): State<AppState>,
    UrlPath(rel_path): UrlPath<String>,
    Query(params): Query<MediaQuery>,
    headers: HeaderMap,
) -> Response {
    let fs_path = common::normalize_path(Path::new(&format!("/{}", rel_path)));
    if !under_media_root(&state, &fs_path) {
        return StatusCode::FORBIDDEN.into_response();
    }

    if params.embed == Some(1) {
        return serve_embedded_cover(fs_path).await;
    }
    serve_file(fs_path, &headers).await
}

fn under_media_root(state: &AppState, path: &PathBuf) -> bool {
    state.media_roots.iter().any(|root| path.starts_with(root))
}

async fn serve_embedded_cover(path: PathBuf) -> Response {
    let extracted =
        tokio::task::spawn_blocking(move || metadata::read_embedded_cover(&path)).await;
    match extracted {
        Ok(Ok(Some(cover))) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, cover.mime)],
            Bytes::from(cover.data),
        )
            .into_response(),
        Ok(Ok(None)) => StatusCode::NOT_FOUND.into_response(),
        Ok(Err(err)) => {
            warn!("embedded cover extraction failed: {}", err);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            warn!("embedded cover task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn serve_file(path: PathBuf, headers: &HeaderMap) -> Response {
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let size = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    let mime = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(|value| requested_range(value, size))
        .unwrap_or(RangeOutcome::Full);

    match range {
        RangeOutcome::Unsatisfiable => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", size))],
        )
            .into_response(),
        RangeOutcome::Full => {
            let stream = ReaderStream::new(file);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime),
                    (header::CONTENT_LENGTH, size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(stream),
            )
                .into_response()
        }
        RangeOutcome::Partial(start, end) => {
            if file.seek(SeekFrom::Start(start)).await.is_err() {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            let len = end - start + 1;
            let stream = ReaderStream::new(file.take(len));
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, mime),
                    (header::CONTENT_LENGTH, len.to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, size),
                    ),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(stream),
            )
                .into_response()
        }
    }
}

/// Interpret a Range header against the file size. Unparseable headers
/// fall back to serving the whole file; a syntactically valid range that
/// lies entirely beyond the file is unsatisfiable.
fn requested_range(value: &str, size: u64) -> RangeOutcome {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    if spec.contains(',') || size == 0 {
        return RangeOutcome::Full;
    }
    if let Some(suffix) = spec.strip_prefix('-') {
        let Ok(count) = suffix.trim().parse::<u64>() else {
            return RangeOutcome::Full;
        };
        if count == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let start = size.saturating_sub(count);
        return RangeOutcome::Partial(start, size - 1);
    }
    let mut parts = spec.splitn(2, '-');
    let start = parts.next().unwrap_or("").trim();
    let end = parts.next().unwrap_or("").trim();
    let Ok(start) = start.parse::<u64>() else {
        return RangeOutcome::Full;
    };
    if start >= size {
        return RangeOutcome::Unsatisfiable;
    }
    let end = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return RangeOutcome::Full,
        }
    };
    RangeOutcome::Partial(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_closed_ranges() {
        assert_eq!(requested_range("bytes=0-", 100), RangeOutcome::Partial(0, 99));
        assert_eq!(requested_range("bytes=10-19", 100), RangeOutcome::Partial(10, 19));
        assert_eq!(requested_range("bytes=90-300", 100), RangeOutcome::Partial(90, 99));
    }

    #[test]
    fn suffix_range() {
        assert_eq!(requested_range("bytes=-10", 100), RangeOutcome::Partial(90, 99));
        assert_eq!(requested_range("bytes=-1000", 100), RangeOutcome::Partial(0, 99));
    }

    #[test]
    fn unsatisfiable_ranges() {
        assert_eq!(requested_range("bytes=100-", 100), RangeOutcome::Unsatisfiable);
        assert_eq!(requested_range("bytes=-0", 100), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn garbage_serves_whole_file() {
        assert_eq!(requested_range("items=0-1", 100), RangeOutcome::Full);
        assert_eq!(requested_range("bytes=a-b", 100), RangeOutcome::Full);
        assert_eq!(requested_range("bytes=0-1,5-6", 100), RangeOutcome::Full);
        assert_eq!(requested_range("bytes=9-5", 100), RangeOutcome::Full);
    }
}
