//! Visit transition endpoints
//!
//! Department UIs post actions here; the transition engine decides
//! legality. An idempotent retry returns the current state with 200.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{workflow_error_response, ApiResponse, AppState};
use crate::workflow::{Applied, Visit, VisitAction};

#[derive(Deserialize)]
pub struct CheckInRequest {
    pub patient_id: Uuid,
}

#[derive(Serialize)]
pub struct VisitActionResponse {
    pub visit: Visit,
    /// false when the action was an idempotent retry.
    pub advanced: bool,
}

pub async fn check_in(
    State(state): State<AppState>,
    Json(body): Json<CheckInRequest>,
) -> Result<Json<ApiResponse<Visit>>, (StatusCode, Json<ApiResponse<Visit>>)> {
    match state.engine.check_in(body.patient_id).await {
        Ok(visit) => Ok(ApiResponse::ok(visit)),
        Err(err) => {
            warn!(patient_id = %body.patient_id, %err, "check-in rejected");
            let (status, message) = workflow_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}

pub async fn get_visit(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Visit>>, (StatusCode, Json<ApiResponse<Visit>>)> {
    match state.engine.repository().load(visit_id).await {
        Ok(visit) => Ok(ApiResponse::ok(visit)),
        Err(err) => {
            let (status, message) = workflow_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}

pub async fn apply_action(
    State(state): State<AppState>,
    Path(visit_id): Path<Uuid>,
    Json(action): Json<VisitAction>,
) -> Result<Json<ApiResponse<VisitActionResponse>>, (StatusCode, Json<ApiResponse<VisitActionResponse>>)>
{
    match state.engine.apply(visit_id, action).await {
        Ok((visit, applied)) => Ok(ApiResponse::ok(VisitActionResponse {
            visit,
            advanced: !matches!(applied, Applied::AlreadyApplied),
        })),
        Err(err) => {
            warn!(%visit_id, action = action.as_str(), %err, "transition rejected");
            let (status, message) = workflow_error_response(&err);
            Err((status, ApiResponse::err(message)))
        }
    }
}
