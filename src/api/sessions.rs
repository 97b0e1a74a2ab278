//! Per-session snapshot reads.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

/// `GET /api/tickets?session_id=…`
pub async fn get_tickets(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    match state.sessions.get(&query.session_id) {
        Some(snapshot) => Json(snapshot.tickets.clone()).into_response(),
        None => not_found(&query.session_id),
    }
}

/// `GET /api/managers?session_id=…`
pub async fn get_managers(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    match state.sessions.get(&query.session_id) {
        Some(snapshot) => Json(snapshot.managers.clone()).into_response(),
        None => not_found(&query.session_id),
    }
}

fn not_found(session_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": format!("unknown session '{session_id}'") })),
    )
        .into_response()
}
