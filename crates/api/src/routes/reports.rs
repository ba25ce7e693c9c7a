//! Processing record inspection for operators.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use labpush_common::error::AppError;
use labpush_common::types::ProcessingRecord;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/reports/{id}", get(get_report))
}

/// GET /api/reports/:id - Current processing record for a report.
async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessingRecord>, AppError> {
    let record = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Report {} has not been processed", id)))?;
    Ok(Json(record))
}
