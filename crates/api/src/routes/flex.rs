use axum::{extract::State, Json};
use staffing_core::flex;
use types::{
    FlexAssignmentCreated, FlexAssignmentRequest, FlexAvailabilityRequest,
    FlexAvailabilityResponse, FlexRemoveRequest, FlexRemoved,
};

use crate::error::ApiResult;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/v1/flex/availability",
    request_body = FlexAvailabilityRequest,
    responses(
        (status = 200, description = "Free shift keys per flex staff member and staffing per shift", body = FlexAvailabilityResponse),
        (status = 422, description = "Empty date range or selection"),
    )
)]
pub async fn availability(
    State(state): State<AppState>,
    Json(req): Json<FlexAvailabilityRequest>,
) -> ApiResult<Json<FlexAvailabilityResponse>> {
    Ok(Json(flex::flex_availability(&*state.store, &req, state.weighting).await?))
}

#[utoipa::path(
    post,
    path = "/v1/flex/assignments",
    request_body = FlexAssignmentRequest,
    responses(
        (status = 200, description = "Flex event created", body = FlexAssignmentCreated),
        (status = 422, description = "No shifts selected, or a shift is not free"),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<FlexAssignmentRequest>,
) -> ApiResult<Json<FlexAssignmentCreated>> {
    Ok(Json(flex::create_flex_assignment(&*state.store, &req, state.weighting).await?))
}

#[utoipa::path(
    post,
    path = "/v1/flex/assignments/remove",
    request_body = FlexRemoveRequest,
    responses(
        (status = 200, description = "Shifts removed", body = FlexRemoved),
        (status = 404, description = "Unknown event, or nothing matched"),
    )
)]
pub async fn remove(
    State(state): State<AppState>,
    Json(req): Json<FlexRemoveRequest>,
) -> ApiResult<Json<FlexRemoved>> {
    Ok(Json(flex::remove_flex_assignment(&*state.store, &req).await?))
}
