// src/server/mod.rs
// HTTP surface through which application windows observe change events
// and trigger an immediate sync.

pub mod db;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use tracing::debug;

use crate::poller::ChangePoller;

#[derive(Clone)]
pub struct ServerState {
    pub poller: Arc<ChangePoller>,
}

pub fn router(poller: Arc<ChangePoller>) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .route("/sync", post(sync_handler))
        .route("/status", get(status_handler))
        .with_state(ServerState { poller })
}

/// SSE stream of change events; each open window holds one of these.
/// A window that disconnects simply drops its receiver.
async fn events_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.poller.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    // Missed some events, continue
                    debug!("Change event stream lagged by {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Immediate-sync trigger: run one poll cycle now instead of waiting for
/// the next scheduled tick. Serialized against the schedule by the
/// poller's cycle lock.
async fn sync_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let summary = state.poller.poll_once().await;
    Json(serde_json::json!({
        "status": "ok",
        "tables_checked": summary.tables_checked,
        "events_emitted": summary.events_emitted,
        "rows_emitted": summary.rows_emitted,
        "tables_failed": summary.tables_failed,
    }))
}

async fn status_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let watermarks = state.poller.watermarks().await;
    let tables: Vec<serde_json::Value> = state
        .poller
        .tables()
        .iter()
        .map(|table| {
            serde_json::json!({
                "table": table.name,
                "change_column": table.change_column,
                "watermark": watermarks.get(&table.name).map(|mark| mark.to_string()),
            })
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "tables": tables,
    }))
}
