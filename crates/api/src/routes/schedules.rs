use axum::{
    extract::{Path, Query, State},
    Json,
};
use staffing_core::{conflict, reconcile, CoverageError, Store};
use types::{
    Ack, AssignmentFilter, AssignmentId, DayOfWeek, FloaterUpdate, NewAssignment, ResolveConflictRequest,
    TeacherScheduleAssignment,
};

use crate::error::ApiResult;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/v1/teacher-schedules",
    params(
        ("teacher_id" = Option<String>, Query, description = "Only this teacher"),
        ("classroom_id" = Option<String>, Query, description = "Only this classroom"),
        ("day_of_week" = Option<DayOfWeek>, Query, description = "Only this day"),
        ("time_slot_id" = Option<String>, Query, description = "Only this slot"),
    ),
    responses((status = 200, description = "Matching assignments", body = Vec<TeacherScheduleAssignment>))
)]
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<AssignmentFilter>,
) -> ApiResult<Json<Vec<TeacherScheduleAssignment>>> {
    let rows = state
        .store
        .teacher_schedules(&filter)
        .await
        .map_err(CoverageError::from)?;
    Ok(Json(rows))
}

#[utoipa::path(
    post,
    path = "/v1/teacher-schedules",
    request_body = NewAssignment,
    responses((status = 200, description = "Created, or the existing row for a duplicate", body = TeacherScheduleAssignment))
)]
pub async fn create(
    State(state): State<AppState>,
    Json(new): Json<NewAssignment>,
) -> ApiResult<Json<TeacherScheduleAssignment>> {
    Ok(Json(reconcile::create_assignment(&*state.store, new).await?))
}

#[utoipa::path(
    put,
    path = "/v1/teacher-schedules/{id}",
    params(("id" = String, Path, description = "Assignment id")),
    request_body = FloaterUpdate,
    responses(
        (status = 200, description = "Updated row", body = TeacherScheduleAssignment),
        (status = 404, description = "No such assignment"),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FloaterUpdate>,
) -> ApiResult<Json<TeacherScheduleAssignment>> {
    let row = reconcile::set_floater(&*state.store, &AssignmentId(id), body.is_floater).await?;
    Ok(Json(row))
}

#[utoipa::path(
    delete,
    path = "/v1/teacher-schedules/{id}",
    params(("id" = String, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Deleted", body = Ack),
        (status = 404, description = "No such assignment"),
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ack>> {
    Ok(Json(reconcile::delete_assignment(&*state.store, &AssignmentId(id)).await?))
}

#[utoipa::path(
    post,
    path = "/v1/resolve-conflict",
    request_body = ResolveConflictRequest,
    responses((status = 200, description = "Resolution written", body = Ack))
)]
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Json(req): Json<ResolveConflictRequest>,
) -> ApiResult<Json<Ack>> {
    Ok(Json(conflict::resolve(&*state.store, &req).await?))
}
