//! Multipart CSV upload → full pipeline run.

use axum::extract::{Multipart, State};
use axum::Json;

use crate::error::Error;
use crate::ingest::parse_tickets;
use crate::pipeline::BatchSummary;

use super::{ApiError, AppState};

/// `POST /api/upload` — accepts a multipart form with one CSV file
/// field, runs the batch and returns its summary.
pub async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchSummary>, ApiError> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| Error::InputInvalid(format!("bad multipart body: {err}")))?
    {
        let is_file = matches!(field.name(), Some("file")) || field.file_name().is_some();
        if is_file && data.is_none() {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| Error::InputInvalid(format!("unreadable upload: {err}")))?;
            data = Some(bytes);
        }
    }

    let Some(bytes) = data else {
        return Err(Error::InputInvalid("no file in upload".to_string()).into());
    };

    let tickets = parse_tickets(&bytes)?;
    let summary = state.pipeline.process_batch(tickets).await?;
    Ok(Json(summary))
}
