pub mod cache;
pub mod cells;
pub mod conflict;
pub mod coverage;
pub mod error;
pub mod flex;
pub mod ratio;
pub mod reconcile;
pub mod saga;
pub mod staffing;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

pub use cache::{CellSession, SessionConfig, Sessions};
pub use error::{CoverageError, Result, StoreError, ValidationError};
pub use staffing::FloaterWeighting;
pub use types::{
    AssignmentFilter, AssignmentId, CellKey, ClassGroup, Classroom, ClassroomId, ContactId,
    CoverageRequest, CoverageRequestId, CoverageShiftId, FlexEventId, FlexShift,
    FlexStaffingEvent, NewAssignment, ResolveConflictRequest, SaveCellRequest, ScheduleCell,
    StaffId, StaffMember, SubAssignment, SubUnavailability, SubstituteContact,
    TeacherScheduleAssignment, TimeSlot, TimeSlotId, AbsenceId,
};

/// A flex event before the store has assigned it an id.
#[derive(Clone, Debug)]
pub struct NewFlexEvent {
    pub staff_id: StaffId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub classroom_ids: Vec<ClassroomId>,
    pub time_slot_ids: Vec<TimeSlotId>,
    pub shifts: Vec<FlexShift>,
}

#[derive(Clone, Debug)]
pub struct NewSubAssignment {
    pub coverage_request_id: CoverageRequestId,
    pub coverage_request_shift_id: CoverageShiftId,
    pub sub_id: StaffId,
    pub is_partial: bool,
}

/// Request/response boundary to the shared data store.
///
/// Implementations own persistence. `create_assignment` must report an
/// existing (teacher, classroom, day, slot) row as [`StoreError::Duplicate`];
/// `resolve_conflict` must apply both sides of a resolution in one step.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn staff(&self) -> Result<Vec<StaffMember>, StoreError>;
    async fn classrooms(&self) -> Result<Vec<Classroom>, StoreError>;
    async fn time_slots(&self) -> Result<Vec<TimeSlot>, StoreError>;
    async fn class_groups(&self) -> Result<Vec<ClassGroup>, StoreError>;

    async fn cell(&self, key: &CellKey) -> Result<Option<ScheduleCell>, StoreError>;
    async fn cells(&self) -> Result<Vec<ScheduleCell>, StoreError>;
    async fn put_cells(&self, cells: Vec<ScheduleCell>) -> Result<(), StoreError>;

    async fn teacher_schedules(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<TeacherScheduleAssignment>, StoreError>;
    /// Moves forward whenever an assignment in `key` is created, updated or
    /// deleted, whichever caller made the write.
    async fn roster_version(&self, key: &CellKey) -> Result<u64, StoreError>;
    async fn create_assignment(
        &self,
        new: NewAssignment,
    ) -> Result<TeacherScheduleAssignment, StoreError>;
    /// Returns the row as stored after the update, `None` if it vanished.
    async fn update_assignment(
        &self,
        id: &AssignmentId,
        is_floater: bool,
    ) -> Result<Option<TeacherScheduleAssignment>, StoreError>;
    async fn delete_assignment(&self, id: &AssignmentId) -> Result<(), StoreError>;
    async fn resolve_conflict(&self, request: &ResolveConflictRequest) -> Result<(), StoreError>;

    async fn flex_events(&self) -> Result<Vec<FlexStaffingEvent>, StoreError>;
    async fn flex_event(&self, id: &FlexEventId) -> Result<Option<FlexStaffingEvent>, StoreError>;
    async fn create_flex_event(&self, new: NewFlexEvent) -> Result<FlexStaffingEvent, StoreError>;
    async fn replace_flex_shifts(
        &self,
        id: &FlexEventId,
        shifts: Vec<FlexShift>,
    ) -> Result<(), StoreError>;
    async fn delete_flex_event(&self, id: &FlexEventId) -> Result<(), StoreError>;

    async fn coverage_requests(&self) -> Result<Vec<CoverageRequest>, StoreError>;
    async fn coverage_request(
        &self,
        id: &CoverageRequestId,
    ) -> Result<Option<CoverageRequest>, StoreError>;
    async fn coverage_request_for_absence(
        &self,
        absence_id: &AbsenceId,
    ) -> Result<Option<CoverageRequest>, StoreError>;
    async fn sub_assignments(&self) -> Result<Vec<SubAssignment>, StoreError>;
    async fn create_sub_assignment(
        &self,
        new: NewSubAssignment,
    ) -> Result<SubAssignment, StoreError>;
    async fn delete_sub_assignment(&self, id: &types::SubAssignmentId) -> Result<(), StoreError>;
    async fn unavailability(&self) -> Result<Vec<SubUnavailability>, StoreError>;

    async fn contact(
        &self,
        coverage_request_id: &CoverageRequestId,
        sub_id: &StaffId,
    ) -> Result<Option<SubstituteContact>, StoreError>;
    async fn contact_by_id(&self, id: &ContactId) -> Result<Option<SubstituteContact>, StoreError>;
    async fn contacts_for_request(
        &self,
        coverage_request_id: &CoverageRequestId,
    ) -> Result<Vec<SubstituteContact>, StoreError>;
    /// Creates a not-contacted contact, or returns the existing one.
    async fn create_contact(
        &self,
        coverage_request_id: &CoverageRequestId,
        sub_id: &StaffId,
    ) -> Result<SubstituteContact, StoreError>;
    async fn put_contact(&self, contact: SubstituteContact)
        -> Result<SubstituteContact, StoreError>;
}

/// Staff lookup used to put names into conflicts and error messages.
#[derive(Clone, Debug, Default)]
pub struct StaffDirectory {
    by_id: HashMap<StaffId, StaffMember>,
}

impl StaffDirectory {
    pub fn new(staff: Vec<StaffMember>) -> Self {
        Self {
            by_id: staff.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub async fn load<S: Store + ?Sized>(store: &S) -> Result<Self> {
        Ok(Self::new(store.staff().await?))
    }

    pub fn get(&self, id: &StaffId) -> Option<&StaffMember> {
        self.by_id.get(id)
    }

    pub fn name(&self, id: &StaffId) -> String {
        self.by_id
            .get(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StaffMember> {
        self.by_id.values()
    }
}

/// Pre-submit checks for a cell save. All problems are reported together.
pub fn validate_save(req: &SaveCellRequest) -> Result<(), ValidationError> {
    let mut errors: Vec<String> = Vec::new();

    if req.is_active && req.class_group_ids.is_empty() {
        errors.push(format!(
            "active cell {} needs at least one class group",
            req.anchor()
        ));
    }

    fn chk_unique<I: ToString>(name: &str, ids: impl Iterator<Item = I>, errors: &mut Vec<String>) {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for id in ids {
            let s = id.to_string();
            if !seen.insert(s.clone()) {
                errors.push(format!("duplicate {name} id: {s}"));
            }
        }
    }
    chk_unique(
        "teacher",
        req.teachers.iter().map(|t| &t.teacher_id.0),
        &mut errors,
    );
    chk_unique(
        "class group",
        req.class_group_ids.iter().map(|g| &g.0),
        &mut errors,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Msg(errors.join("; ")))
    }
}
