use axum::{extract::State, Json};
use staffing_core::staffing;
use types::StaffingRollup;

use crate::error::ApiResult;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/v1/staffing/cells",
    responses((status = 200, description = "Staffing status of every cell", body = StaffingRollup))
)]
pub async fn rollup(State(state): State<AppState>) -> ApiResult<Json<StaffingRollup>> {
    Ok(Json(staffing::load_rollup(&*state.store, state.weighting).await?))
}
