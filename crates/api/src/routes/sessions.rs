use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use staffing_core::{CellSession, Store};
use types::{Ack, DayOfWeek, RosterView, SaveCellRequest, SaveOutcome, SessionId, SessionOpened};

use crate::error::{ApiError, ApiResult};
use crate::routes::cells::{cell_key, save_response};
use crate::state::AppState;

fn session(state: &AppState, id: String) -> ApiResult<Arc<CellSession<dyn Store>>> {
    let id = SessionId(id);
    state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("edit session {id}")))
}

#[utoipa::path(
    post,
    path = "/v1/sessions",
    responses((status = 200, description = "Session opened", body = SessionOpened))
)]
pub async fn open(State(state): State<AppState>) -> Json<SessionOpened> {
    Json(SessionOpened {
        session_id: state.sessions.open(),
    })
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}/roster/{classroom}/{day}/{slot}",
    params(
        ("id" = String, Path, description = "Session id"),
        ("classroom" = String, Path, description = "Classroom id"),
        ("day" = DayOfWeek, Path, description = "Day of week"),
        ("slot" = String, Path, description = "Time slot id"),
    ),
    responses(
        (status = 200, description = "Roster, possibly from the session cache", body = RosterView),
        (status = 404, description = "Unknown session"),
    )
)]
pub async fn roster(
    State(state): State<AppState>,
    Path((id, classroom, day, slot)): Path<(String, String, DayOfWeek, String)>,
) -> ApiResult<Json<RosterView>> {
    let session = session(&state, id)?;
    let key = cell_key(classroom, day, slot);
    Ok(Json(session.roster(&key).await?))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/save",
    params(("id" = String, Path, description = "Session id")),
    request_body = SaveCellRequest,
    responses(
        (status = 200, description = "Saved; touched cells leave the cache", body = SaveOutcome),
        (status = 409, description = "Conflicts need a resolution", body = SaveOutcome),
        (status = 502, description = "Partially applied", body = SaveOutcome),
    )
)]
pub async fn save(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SaveCellRequest>,
) -> ApiResult<(StatusCode, Json<SaveOutcome>)> {
    let session = session(&state, id)?;
    Ok(save_response(session.save(&req).await?))
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session closed", body = Ack),
        (status = 404, description = "Unknown session"),
    )
)]
pub async fn close(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Ack>> {
    let id = SessionId(id);
    if !state.sessions.close(&id) {
        return Err(ApiError::not_found(format!("edit session {id}")));
    }
    Ok(Json(Ack::with(1)))
}
