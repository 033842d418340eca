use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use staffing_core::cells;
use types::{Ack, CellKey, ClassroomId, DayOfWeek, SaveCellRequest, SaveOutcome, ScheduleCell, TimeSlotId};

use crate::error::ApiResult;
use crate::state::AppState;

pub(crate) fn cell_key(classroom: String, day: DayOfWeek, slot: String) -> CellKey {
    CellKey::new(ClassroomId(classroom), day, TimeSlotId(slot))
}

/// Held saves answer 409 and partial writes 502; both still carry the body.
pub(crate) fn save_response(outcome: SaveOutcome) -> (StatusCode, Json<SaveOutcome>) {
    let status = match &outcome {
        SaveOutcome::Saved { .. } => StatusCode::OK,
        SaveOutcome::ConflictsPending { .. } => StatusCode::CONFLICT,
        SaveOutcome::PartiallyApplied { .. } => StatusCode::BAD_GATEWAY,
    };
    (status, Json(outcome))
}

#[utoipa::path(
    get,
    path = "/v1/schedule-cells/{classroom}/{day}/{slot}",
    params(
        ("classroom" = String, Path, description = "Classroom id"),
        ("day" = DayOfWeek, Path, description = "Day of week"),
        ("slot" = String, Path, description = "Time slot id"),
    ),
    responses((status = 200, description = "Cell settings; unsaved cells come back empty", body = ScheduleCell))
)]
pub async fn get_cell(
    State(state): State<AppState>,
    Path((classroom, day, slot)): Path<(String, DayOfWeek, String)>,
) -> ApiResult<Json<ScheduleCell>> {
    let key = cell_key(classroom, day, slot);
    Ok(Json(cells::load_cell(&*state.store, &key).await?))
}

#[utoipa::path(
    put,
    path = "/v1/schedule-cells",
    request_body = Vec<ScheduleCell>,
    responses(
        (status = 200, description = "Cells written", body = Ack),
        (status = 422, description = "Active cell without class groups"),
    )
)]
pub async fn put_cells(
    State(state): State<AppState>,
    Json(body): Json<Vec<ScheduleCell>>,
) -> ApiResult<Json<Ack>> {
    Ok(Json(cells::put_cells(&*state.store, body).await?))
}

#[utoipa::path(
    post,
    path = "/v1/schedule-cells/save",
    request_body = SaveCellRequest,
    responses(
        (status = 200, description = "Saved, with projected staffing", body = SaveOutcome),
        (status = 409, description = "Conflicts need a resolution; nothing was written", body = SaveOutcome),
        (status = 502, description = "A write failed part way; report lists what was applied", body = SaveOutcome),
        (status = 422, description = "Invalid request"),
    )
)]
pub async fn save_cell(
    State(state): State<AppState>,
    Json(req): Json<SaveCellRequest>,
) -> ApiResult<(StatusCode, Json<SaveOutcome>)> {
    let outcome = cells::save_cells(&*state.store, &req, state.weighting).await?;
    Ok(save_response(outcome))
}
