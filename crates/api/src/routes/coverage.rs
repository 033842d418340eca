use axum::{
    extract::{Path, State},
    Json,
};
use staffing_core::coverage;
use types::{
    AbsenceId, Ack, AssignSubShiftsRequest, AssignSubShiftsResponse, CoverageRequestView,
    RemainingShifts, ShiftOverridesRequest, ShiftOverridesResponse, SubCandidate,
    UnassignShiftsRequest,
};

use crate::error::ApiResult;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/v1/coverage/{absence_id}",
    params(("absence_id" = String, Path, description = "Absence id")),
    responses(
        (status = 200, description = "Shifts of the absence with coverage status", body = CoverageRequestView),
        (status = 404, description = "No coverage request for this absence"),
    )
)]
pub async fn request(
    State(state): State<AppState>,
    Path(absence_id): Path<String>,
) -> ApiResult<Json<CoverageRequestView>> {
    let view = coverage::coverage_request(&*state.store, &AbsenceId(absence_id)).await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/v1/coverage/{absence_id}/assigned-shifts",
    params(("absence_id" = String, Path, description = "Absence id")),
    responses((status = 200, description = "Shifts nobody covers yet", body = RemainingShifts))
)]
pub async fn assigned_shifts(
    State(state): State<AppState>,
    Path(absence_id): Path<String>,
) -> ApiResult<Json<RemainingShifts>> {
    let remaining = coverage::assigned_shifts(&*state.store, &AbsenceId(absence_id)).await?;
    Ok(Json(remaining))
}

#[utoipa::path(
    get,
    path = "/v1/coverage/{absence_id}/candidates",
    params(("absence_id" = String, Path, description = "Absence id")),
    responses((status = 200, description = "Substitutes, most coverable shifts first", body = Vec<SubCandidate>))
)]
pub async fn candidates(
    State(state): State<AppState>,
    Path(absence_id): Path<String>,
) -> ApiResult<Json<Vec<SubCandidate>>> {
    Ok(Json(coverage::candidates(&*state.store, &AbsenceId(absence_id)).await?))
}

#[utoipa::path(
    post,
    path = "/v1/shift-overrides",
    request_body = ShiftOverridesRequest,
    responses(
        (status = 200, description = "Selection stored on the contact", body = ShiftOverridesResponse),
        (status = 422, description = "Selection includes a blocked shift"),
    )
)]
pub async fn shift_overrides(
    State(state): State<AppState>,
    Json(req): Json<ShiftOverridesRequest>,
) -> ApiResult<Json<ShiftOverridesResponse>> {
    Ok(Json(coverage::save_shift_overrides(&*state.store, &req).await?))
}

#[utoipa::path(
    post,
    path = "/v1/assign-sub-shifts",
    request_body = AssignSubShiftsRequest,
    responses(
        (status = 200, description = "Shifts assigned", body = AssignSubShiftsResponse),
        (status = 422, description = "Selection rejected; nothing was written"),
    )
)]
pub async fn assign(
    State(state): State<AppState>,
    Json(req): Json<AssignSubShiftsRequest>,
) -> ApiResult<Json<AssignSubShiftsResponse>> {
    Ok(Json(coverage::assign_sub_shifts(&*state.store, &req).await?))
}

#[utoipa::path(
    post,
    path = "/v1/unassign-shifts",
    request_body = UnassignShiftsRequest,
    responses((status = 200, description = "Assignments removed", body = Ack))
)]
pub async fn unassign(
    State(state): State<AppState>,
    Json(req): Json<UnassignShiftsRequest>,
) -> ApiResult<Json<Ack>> {
    Ok(Json(coverage::unassign_shifts(&*state.store, &req).await?))
}
