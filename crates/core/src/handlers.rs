pub mod assets;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc, time::Duration};

use crate::coral::CoralCheck;
use crate::db::{self, AgentRow, MessageRow, MirrorStats, ThreadRow};
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub thread_id: Option<String>,
    pub limit: Option<i64>,
}

/// List mirrored agents, most recently seen first.
///
/// **Route:** `GET /api/agents`
///
/// **200 OK:**
/// ```json
/// [{ "id": "search_agent", "description": "...", "status": "active", "last_seen": "2026-10-14 09:30:00" }]
/// ```
pub async fn get_agents(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<AgentRow>>> {
    Ok(Json(db::list_agents(&state.pool).await?))
}

/// List mirrored threads, newest first.
///
/// **Route:** `GET /api/threads`
pub async fn get_threads(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<ThreadRow>>> {
    Ok(Json(db::list_threads(&state.pool).await?))
}

/// List mirrored messages.
///
/// **Route:** `GET /api/messages?thread_id=<id>&limit=<n>`
///
/// With `thread_id` the thread's messages come back oldest first; without it,
/// the latest `limit` (default 100, max 1000) messages newest first. An empty
/// `thread_id` is treated as absent. A `limit` below 1 is rejected with 400.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> AppResult<Json<Vec<MessageRow>>> {
    if let Some(limit) = query.limit.filter(|l| *l < 1) {
        return Err(AppError::Validation(format!(
            "limit must be at least 1 (got {limit})"
        )));
    }
    let thread_id = query.thread_id.as_deref().filter(|t| !t.is_empty());
    Ok(Json(
        db::list_messages(&state.pool, thread_id, query.limit).await?,
    ))
}

/// Aggregate counts over the mirror.
///
/// **Route:** `GET /api/stats`
///
/// **200 OK:**
/// ```json
/// { "agent_count": 2, "thread_count": 1, "message_count": 5,
///   "message_types": { "question": 3, "unknown": 2 }, "recent_activity": 5 }
/// ```
pub async fn get_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<MirrorStats>> {
    Ok(Json(db::stats(&state.pool).await?))
}

/// Probe the Coral server's agents endpoint.
///
/// **Route:** `GET /api/check-coral-server`
///
/// Always 200; reachability is reported in the body's `status` field.
pub async fn check_coral_server(State(state): State<Arc<AppState>>) -> Json<CoralCheck> {
    Json(state.source.check().await)
}

pub async fn version_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "coral_server": state.config.coral.origin(),
        "session_id": state.config.coral.session_id,
        "polling_interval_secs": state.config.polling_interval_secs,
    }))
}

/// Push channel for dashboard clients.
///
/// **Route:** `GET /api/events`
///
/// Sends `event: handshake` first, then one SSE event per monitor update
/// named after its type (`agents_update`, `threads_update`,
/// `messages_update`, `message_update`).
pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.tx.subscribe();
    let stream = async_stream::stream! {
        yield Ok(Event::default().event("handshake").data("connected"));
        loop {
            match rx.recv().await {
                Ok(event) => match event.data_json() {
                    Ok(json) => {
                        yield Ok(Event::default().event(event.name()).data(json));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize monitor event");
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("SSE stream lagged by {} messages", n);
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
