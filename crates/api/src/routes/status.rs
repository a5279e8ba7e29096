//! Status Routes

use axum::{extract::State, Json};
use std::sync::Arc;
use storage::StatusSnapshot;
use tokio::sync::RwLock;

use crate::{ApiError, AppState};

/// Latest dashboard snapshot
pub async fn get_status(State(state): State<Arc<RwLock<AppState>>>) -> Result<Json<StatusSnapshot>, ApiError> {
    let state = state.read().await;
    let snapshot = state
        .status
        .read()
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .clone();
    Ok(Json(snapshot))
}
