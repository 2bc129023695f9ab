use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::state::{EventKind, SharedState};

const INDEX_HTML: &str = include_str!("ui/index.html");

/// Events returned by `/api/events` when no usable `limit` is given.
const DEFAULT_EVENT_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(api_health))
        .route("/api/status", get(api_status))
        .route("/api/events", get(api_events))
        .route("/api/water", post(api_water))
        .route("/api/stop", post(api_stop))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Ack {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

async fn api_health() -> impl IntoResponse {
    Json(Ack {
        success: true,
        message: "irrigation controller running",
    })
}

async fn api_status(State(state): State<SharedState>) -> impl IntoResponse {
    let st = state.read().await;
    Json(st.to_status(&state.flags))
}

/// Most recent `limit` events, newest first. A missing or zero limit
/// means [`DEFAULT_EVENT_LIMIT`].
async fn api_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let limit = match query.limit {
        Some(n) if n > 0 => n,
        _ => DEFAULT_EVENT_LIMIT,
    };
    let st = state.read().await;
    let events: Vec<_> = st.events.iter().rev().take(limit).cloned().collect();
    Json(events)
}

/// Same effect as the console `start` command.
async fn api_water(State(state): State<SharedState>) -> impl IntoResponse {
    state.flags.request_start();
    info!(source = "web", "manual start requested");
    state
        .write()
        .await
        .record_event(EventKind::Command, "manual start (web)");
    (
        StatusCode::ACCEPTED,
        Json(Ack {
            success: true,
            message: "manual start requested",
        }),
    )
}

/// Same effect as the console `stop` command.
async fn api_stop(State(state): State<SharedState>) -> impl IntoResponse {
    state.flags.request_abort();
    info!(source = "web", "manual stop requested");
    state
        .write()
        .await
        .record_event(EventKind::Command, "manual stop (web)");
    (
        StatusCode::ACCEPTED,
        Json(Ack {
            success: true,
            message: "manual stop requested",
        }),
    )
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

/// Serve the HTTP surface until `cancel` fires.
pub async fn serve(state: SharedState, port: u16, cancel: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!(%addr, "web api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
