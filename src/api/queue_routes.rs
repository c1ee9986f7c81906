//! Queue endpoints
//!
//! Read-only department dashboards. Results may be slightly stale; the
//! transition endpoints are the only authority on legality.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use super::{workflow_error_response, ApiResponse, AppState};
use crate::workflow::{QueueEntry, Stage, StageStatus};

#[derive(Deserialize)]
pub struct QueueQuery {
    /// Comma-separated statuses to exclude, e.g. `in_progress,completed`.
    pub exclude_status: Option<String>,
}

pub async fn list_queue(
    State(state): State<AppState>,
    Path(stage): Path<String>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<ApiResponse<Vec<QueueEntry>>>, (StatusCode, Json<ApiResponse<Vec<QueueEntry>>>)> {
    let stage = match Stage::parse(&stage) {
        Ok(stage) => stage,
        Err(_) => {
            return Err((
                StatusCode::BAD_REQUEST,
                ApiResponse::err(format!("unknown stage '{stage}'")),
            ))
        }
    };

    let mut excluded = Vec::new();
    if let Some(raw) = &query.exclude_status {
        for part in raw.split(',').filter(|p| !p.is_empty()) {
            match StageStatus::parse(part.trim()) {
                Ok(status) => excluded.push(status),
                Err(_) => {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        ApiResponse::err(format!("unknown status '{part}'")),
                    ))
                }
            }
        }
    }

    match state.queues.list_queue(stage, &excluded).await {
        Ok(entries) => Ok(ApiResponse::ok(entries)),
        Err(err) => {
            let (status, message) = workflow_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}
