pub mod config;
pub mod error;
pub mod state;
pub mod telemetry;
pub mod routes {
    pub mod cells;
    pub mod contacts;
    pub mod coverage;
    pub mod flex;
    pub mod health;
    pub mod schedules;
    pub mod sessions;
    pub mod staffing;
}

use axum::{
    routing::{get, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
        paths(
            routes::health::health,
            routes::cells::get_cell,
            routes::cells::put_cells,
            routes::cells::save_cell,
            routes::schedules::list,
            routes::schedules::create,
            routes::schedules::update,
            routes::schedules::delete,
            routes::schedules::resolve_conflict,
            routes::staffing::rollup,
            routes::flex::availability,
            routes::flex::create,
            routes::flex::remove,
            routes::coverage::request,
            routes::coverage::assigned_shifts,
            routes::coverage::candidates,
            routes::coverage::shift_overrides,
            routes::coverage::assign,
            routes::coverage::unassign,
            routes::contacts::get_contact,
            routes::contacts::update,
            routes::sessions::open,
            routes::sessions::roster,
            routes::sessions::save,
            routes::sessions::close,
        ),
        components(schemas(
            types::StaffId, types::ClassroomId, types::ClassGroupId, types::TimeSlotId,
            types::AssignmentId, types::FlexEventId, types::AbsenceId, types::CoverageRequestId,
            types::CoverageShiftId, types::ContactId, types::SubAssignmentId, types::SessionId,
            types::DayOfWeek, types::CellKey, types::ScheduleCell, types::TeacherScheduleAssignment,
            types::NewAssignment, types::FloaterUpdate, types::AssignmentFilter,
            types::RosterView, types::SessionOpened,
            types::StaffingStatus, types::StaffingSummary, types::CellStaffing, types::StaffingRollup,
            types::ApplyScope, types::DesiredTeacher, types::ConflictResolutionKind, types::Conflict,
            types::ConflictResolution, types::ResolveConflictRequest, types::SaveCellRequest,
            types::StepOutcome, types::SagaStep, types::SagaReport, types::SaveOutcome,
            types::ShiftKey, types::DayFilter, types::FlexShift, types::FlexAvailabilityRequest,
            types::StaffAvailability, types::ShiftMetric, types::FlexAvailabilityResponse,
            types::FlexAssignmentRequest, types::FlexAssignmentCreated, types::RemovalScope,
            types::FlexRemoveRequest, types::FlexRemoved,
            types::CoverageStatus, types::CoverageRequestShift, types::CoverageCounters,
            types::AssignedSub, types::ShiftDetail, types::CoverageRequestView, types::RemainingShifts,
            types::ResponseStatus, types::ContactStatus, types::ShiftOverride, types::SubstituteContact,
            types::ContactView, types::ContactUpdate, types::UnavailableReason,
            types::ShiftAvailability, types::SubCandidate, types::ShiftOverridesRequest,
            types::ShiftOverridesResponse, types::AssignConfirmation, types::AssignSubShiftsRequest,
            types::AssignSubShiftsResponse, types::UnassignScope, types::UnassignShiftsRequest,
            types::SubAssignment, types::Ack,
        )),
        tags(
            (name = "caretrack", description = "Classroom staffing and substitute coverage API")
        )
    )]
pub struct ApiDoc;

pub fn app(state: AppState) -> Router {
    use routes::*;

    Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/schedule-cells", put(cells::put_cells))
        .route("/v1/schedule-cells/save", post(cells::save_cell))
        .route("/v1/schedule-cells/:classroom/:day/:slot", get(cells::get_cell))
        .route("/v1/teacher-schedules", get(schedules::list).post(schedules::create))
        .route(
            "/v1/teacher-schedules/:id",
            put(schedules::update).delete(schedules::delete),
        )
        .route("/v1/resolve-conflict", post(schedules::resolve_conflict))
        .route("/v1/staffing/cells", get(staffing::rollup))
        .route("/v1/flex/availability", post(flex::availability))
        .route("/v1/flex/assignments", post(flex::create))
        .route("/v1/flex/assignments/remove", post(flex::remove))
        .route("/v1/coverage/:absence_id", get(coverage::request))
        .route("/v1/coverage/:absence_id/assigned-shifts", get(coverage::assigned_shifts))
        .route("/v1/coverage/:absence_id/candidates", get(coverage::candidates))
        .route("/v1/shift-overrides", post(coverage::shift_overrides))
        .route("/v1/assign-sub-shifts", post(coverage::assign))
        .route("/v1/unassign-shifts", post(coverage::unassign))
        .route("/v1/substitute-contacts", get(contacts::get_contact))
        .route("/v1/substitute-contacts/:id", put(contacts::update))
        .route("/v1/sessions", post(sessions::open))
        .route("/v1/sessions/:id", axum::routing::delete(sessions::close))
        .route("/v1/sessions/:id/save", post(sessions::save))
        .route(
            "/v1/sessions/:id/roster/:classroom/:day/:slot",
            get(sessions::roster),
        )
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(telemetry::stack())
        .with_state(state)
}
