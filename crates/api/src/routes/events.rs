//! Event Routes

use axum::{
    extract::{Query, State},
    Json,
};
use dms::{EventKind, GestureEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{ApiError, AppState};

const MAX_LIMIT: usize = 500;

/// Query parameters for events endpoint
#[derive(Debug, Deserialize)]
pub struct EventQuery {
    /// Filter by event kind (`nod`, `yawn`, ...)
    pub kind: Option<String>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for events endpoint
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// Newest first
    pub data: Vec<GestureEvent>,
    pub count: usize,
    /// Stored events per kind, unfiltered
    pub totals: BTreeMap<EventKind, usize>,
}

/// Recent detection events
pub async fn get_events(
    State(state): State<Arc<RwLock<AppState>>>,
    Query(params): Query<EventQuery>,
) -> Result<Json<EventResponse>, ApiError> {
    let kind = params
        .kind
        .as_deref()
        .map(|name| EventKind::parse(name).ok_or_else(|| ApiError::BadRequest(format!("unknown event kind '{}'", name))))
        .transpose()?;

    let state = state.read().await;
    let data = state.repository.recent(kind, params.limit.min(MAX_LIMIT))?;
    let totals = state.repository.counts()?;

    Ok(Json(EventResponse {
        count: data.len(),
        data,
        totals,
    }))
}
