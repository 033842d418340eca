use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use staffing_core::coverage;
use types::{ContactId, ContactUpdate, ContactView, CoverageRequestId, StaffId};
use utoipa::IntoParams;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContactQuery {
    pub coverage_request_id: String,
    pub sub_id: String,
}

/// Opens the contact record on first read.
#[utoipa::path(
    get,
    path = "/v1/substitute-contacts",
    params(ContactQuery),
    responses(
        (status = 200, description = "Contact with its derived status", body = ContactView),
        (status = 404, description = "Unknown request or substitute"),
    )
)]
pub async fn get_contact(
    State(state): State<AppState>,
    Query(q): Query<ContactQuery>,
) -> ApiResult<Json<ContactView>> {
    let view = coverage::get_or_create_contact(
        &*state.store,
        &CoverageRequestId(q.coverage_request_id),
        &StaffId(q.sub_id),
    )
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    put,
    path = "/v1/substitute-contacts/{id}",
    params(("id" = String, Path, description = "Contact id")),
    request_body = ContactUpdate,
    responses(
        (status = 200, description = "Updated contact", body = ContactView),
        (status = 422, description = "Confirmed without any shift"),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ContactUpdate>,
) -> ApiResult<Json<ContactView>> {
    Ok(Json(coverage::update_contact(&*state.store, &ContactId(id), &update).await?))
}
