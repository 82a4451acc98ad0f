use crate::downloads::DownloadView;
use crate::error::DownloadError;
use crate::history::DownloadRecord;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub id: String,
}

pub async fn start_download(
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    match state.manager.start(&req.url).await {
        Ok(id) => Ok(Json(serde_json::json!({ "id": id }))),
        Err(e @ (DownloadError::Duplicate { .. } | DownloadError::InvalidUrl(_))) => {
            info!("Rejected download of {:?}: {}", req.url, e);
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub async fn cancel_download(
    State(state): State<AppState>,
    Json(req): Json<CancelRequest>,
) -> Json<serde_json::Value> {
    let cancelled = state.manager.cancel(&req.id).await;
    Json(serde_json::json!({ "cancelled": cancelled }))
}

pub async fn progress(State(state): State<AppState>) -> Json<Vec<DownloadView>> {
    Json(state.manager.snapshot())
}

pub async fn history(State(state): State<AppState>) -> Json<Vec<DownloadRecord>> {
    Json(state.manager.history().await)
}

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.tx.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .map(|msg| match msg {
            Ok(msg) => Ok(Event::default().data(msg)),
            Err(_) => Ok(Event::default().comment("keepalive")),
        })
        .take_until(state.shutdown.cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}
