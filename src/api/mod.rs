//! Thin HTTP surface over the routing engine.
//!
//! All business behavior lives in the core modules; handlers here only
//! translate between HTTP and the engine's inbound interface.

pub mod analytics;
pub mod sessions;
pub mod settings;
pub mod upload;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::Error;
use crate::nlp::NlpPool;
use crate::pipeline::Pipeline;
use crate::session::SessionStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub nlp: Arc<NlpPool>,
    pub sessions: Arc<SessionStore>,
    pub pool: deadpool_postgres::Pool,
}

/// Engine errors mapped onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::InputInvalid(_) | Error::InvalidSetting(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the application router.
pub fn router(state: AppState, frontend_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    match frontend_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => warn!(frontend_origin, "unparseable CORS origin, allowing none"),
    }

    Router::new()
        .route("/api/health", get(health))
        .route("/api/upload", post(upload::upload_csv))
        .route("/api/tickets", get(sessions::get_tickets))
        .route("/api/managers", get(sessions::get_managers))
        .route(
            "/api/settings",
            get(settings::get_settings).post(settings::update_settings),
        )
        .route("/api/db/analytics", get(analytics::get_db_analytics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
