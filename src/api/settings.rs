//! Runtime NLP settings.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::config::{AVAILABLE_CONCURRENCY, AVAILABLE_MODELS};

use super::{ApiError, AppState};

/// `GET /api/settings`
pub async fn get_settings(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (model_id, concurrency) = state.nlp.current_settings();
    Json(json!({
        "model_id": model_id,
        "concurrency": concurrency,
        "available_models": AVAILABLE_MODELS,
        "available_concurrency": AVAILABLE_CONCURRENCY,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NlpSettingsUpdate {
    pub model_id: String,
    pub concurrency: usize,
}

/// `POST /api/settings` — rejects out-of-set values with 400.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<NlpSettingsUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.nlp.update_settings(&body.model_id, body.concurrency)?;
    Ok(Json(json!({
        "status": "ok",
        "model_id": body.model_id,
        "concurrency": body.concurrency,
    })))
}
