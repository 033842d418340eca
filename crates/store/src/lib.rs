use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use staffing_core::{NewFlexEvent, NewSubAssignment, Store, StoreError};
use tracing::debug;
use types::{
    AbsenceId, AssignmentFilter, AssignmentId, CellKey, ClassGroup, Classroom, ConflictResolutionKind,
    ContactId, CoverageRequest, CoverageRequestId, FlexEventId, FlexShift, FlexStaffingEvent,
    NewAssignment, ResolveConflictRequest, ResponseStatus, ScheduleCell, StaffId, StaffMember,
    SubAssignment, SubAssignmentId, SubUnavailability, SubstituteContact,
    TeacherScheduleAssignment, TimeSlot,
};
use uuid::Uuid;

/// Everything the store holds, in the shape of a JSON seed file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreSeed {
    #[serde(default)]
    pub staff: Vec<StaffMember>,
    #[serde(default)]
    pub classrooms: Vec<Classroom>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub class_groups: Vec<ClassGroup>,
    #[serde(default)]
    pub cells: Vec<ScheduleCell>,
    #[serde(default)]
    pub teacher_schedules: Vec<TeacherScheduleAssignment>,
    #[serde(default)]
    pub flex_events: Vec<FlexStaffingEvent>,
    #[serde(default)]
    pub coverage_requests: Vec<CoverageRequest>,
    #[serde(default)]
    pub sub_assignments: Vec<SubAssignment>,
    #[serde(default)]
    pub unavailability: Vec<SubUnavailability>,
    #[serde(default)]
    pub contacts: Vec<SubstituteContact>,
}

#[derive(Default)]
struct Data {
    seed: StoreSeed,
    writes: usize,
    versions: HashMap<CellKey, u64>,
    failing: HashSet<StaffId>,
}

impl Data {
    fn touch(&mut self, key: CellKey) {
        *self.versions.entry(key).or_default() += 1;
    }

    fn check_teacher(&self, teacher: &StaffId) -> Result<(), StoreError> {
        if self.failing.contains(teacher) {
            return Err(StoreError::Backend(format!(
                "write rejected for teacher {teacher}"
            )));
        }
        Ok(())
    }

    fn upsert_assignment(&mut self, new: NewAssignment) -> TeacherScheduleAssignment {
        let rows = &mut self.seed.teacher_schedules;
        if let Some(existing) = rows.iter_mut().find(|a| {
            a.teacher_id == new.teacher_id
                && a.classroom_id == new.classroom_id
                && a.day_of_week == new.day_of_week
                && a.time_slot_id == new.time_slot_id
        }) {
            existing.is_floater = new.is_floater;
            return existing.clone();
        }
        let row = TeacherScheduleAssignment {
            id: AssignmentId(new_id()),
            teacher_id: new.teacher_id,
            classroom_id: new.classroom_id,
            day_of_week: new.day_of_week,
            time_slot_id: new.time_slot_id,
            is_floater: new.is_floater,
        };
        rows.push(row.clone());
        row
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// In-process store guarded by a single lock. Clones share state.
#[derive(Clone, Default)]
pub struct InMemStore {
    inner: Arc<RwLock<Data>>,
}

impl InMemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: StoreSeed) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Data {
                seed,
                ..Data::default()
            })),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seed: StoreSeed = serde_json::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        Ok(Self::from_seed(seed))
    }

    pub fn snapshot(&self) -> StoreSeed {
        self.inner.read().seed.clone()
    }

    /// Number of mutating calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.inner.read().writes
    }

    /// Make every assignment write touching `teacher` fail with a backend
    /// error.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_assignment_writes_for(&self, teacher: StaffId) {
        self.inner.write().failing.insert(teacher);
    }
}

#[async_trait]
impl Store for InMemStore {
    async fn staff(&self) -> Result<Vec<StaffMember>, StoreError> {
        Ok(self.inner.read().seed.staff.clone())
    }

    async fn classrooms(&self) -> Result<Vec<Classroom>, StoreError> {
        Ok(self.inner.read().seed.classrooms.clone())
    }

    async fn time_slots(&self) -> Result<Vec<TimeSlot>, StoreError> {
        Ok(self.inner.read().seed.time_slots.clone())
    }

    async fn class_groups(&self) -> Result<Vec<ClassGroup>, StoreError> {
        Ok(self.inner.read().seed.class_groups.clone())
    }

    async fn cell(&self, key: &CellKey) -> Result<Option<ScheduleCell>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .cells
            .iter()
            .find(|c| c.key() == *key)
            .cloned())
    }

    async fn cells(&self) -> Result<Vec<ScheduleCell>, StoreError> {
        Ok(self.inner.read().seed.cells.clone())
    }

    async fn put_cells(&self, cells: Vec<ScheduleCell>) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        for cell in cells {
            let key = cell.key();
            match w.seed.cells.iter_mut().find(|c| c.key() == key) {
                Some(existing) => *existing = cell,
                None => w.seed.cells.push(cell),
            }
        }
        Ok(())
    }

    async fn teacher_schedules(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<TeacherScheduleAssignment>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .teacher_schedules
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn roster_version(&self, key: &CellKey) -> Result<u64, StoreError> {
        Ok(self.inner.read().versions.get(key).copied().unwrap_or(0))
    }

    async fn create_assignment(
        &self,
        new: NewAssignment,
    ) -> Result<TeacherScheduleAssignment, StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        w.check_teacher(&new.teacher_id)?;
        let key = CellKey::new(new.classroom_id.clone(), new.day_of_week, new.time_slot_id.clone());
        if w
            .seed
            .teacher_schedules
            .iter()
            .any(|a| a.teacher_id == new.teacher_id && a.key() == key)
        {
            return Err(StoreError::Duplicate(format!(
                "teacher {} already assigned to {key}",
                new.teacher_id
            )));
        }
        let row = w.upsert_assignment(new);
        w.touch(key);
        debug!(id = %row.id, teacher = %row.teacher_id, "assignment created");
        Ok(row)
    }

    async fn update_assignment(
        &self,
        id: &AssignmentId,
        is_floater: bool,
    ) -> Result<Option<TeacherScheduleAssignment>, StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        let Some(teacher) = w
            .seed
            .teacher_schedules
            .iter()
            .find(|a| a.id == *id)
            .map(|a| a.teacher_id.clone())
        else {
            return Ok(None);
        };
        w.check_teacher(&teacher)?;
        let updated = w
            .seed
            .teacher_schedules
            .iter_mut()
            .find(|a| a.id == *id)
            .map(|a| {
                a.is_floater = is_floater;
                a.clone()
            });
        if let Some(row) = &updated {
            w.touch(row.key());
        }
        Ok(updated)
    }

    async fn delete_assignment(&self, id: &AssignmentId) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        let Some(pos) = w.seed.teacher_schedules.iter().position(|a| a.id == *id) else {
            return Err(StoreError::NotFound(format!("assignment {id}")));
        };
        let teacher = w.seed.teacher_schedules[pos].teacher_id.clone();
        w.check_teacher(&teacher)?;
        let removed = w.seed.teacher_schedules.remove(pos);
        w.touch(removed.key());
        Ok(())
    }

    async fn resolve_conflict(&self, request: &ResolveConflictRequest) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        w.check_teacher(&request.teacher_id)?;
        let target = NewAssignment {
            teacher_id: request.teacher_id.clone(),
            classroom_id: request.target_classroom_id.clone(),
            day_of_week: request.day_of_week,
            time_slot_id: request.time_slot_id.clone(),
            is_floater: request.resolution == ConflictResolutionKind::MarkFloater,
        };
        let target_key = CellKey::new(
            target.classroom_id.clone(),
            target.day_of_week,
            target.time_slot_id.clone(),
        );
        match request.resolution {
            ConflictResolutionKind::RemoveOther => {
                let other = w
                    .seed
                    .teacher_schedules
                    .iter()
                    .find(|a| a.id == request.conflicting_assignment_id)
                    .map(|a| a.key());
                w.seed
                    .teacher_schedules
                    .retain(|a| a.id != request.conflicting_assignment_id);
                w.upsert_assignment(target);
                if let Some(other) = other {
                    w.touch(other);
                }
                w.touch(target_key);
            }
            ConflictResolutionKind::MarkFloater => {
                w.upsert_assignment(target);
                w.touch(target_key);
            }
            ConflictResolutionKind::Cancel => {}
        }
        Ok(())
    }

    async fn flex_events(&self) -> Result<Vec<FlexStaffingEvent>, StoreError> {
        Ok(self.inner.read().seed.flex_events.clone())
    }

    async fn flex_event(&self, id: &FlexEventId) -> Result<Option<FlexStaffingEvent>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .flex_events
            .iter()
            .find(|e| e.id == *id)
            .cloned())
    }

    async fn create_flex_event(&self, new: NewFlexEvent) -> Result<FlexStaffingEvent, StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        let event = FlexStaffingEvent {
            id: FlexEventId(new_id()),
            staff_id: new.staff_id,
            start_date: new.start_date,
            end_date: new.end_date,
            classroom_ids: new.classroom_ids,
            time_slot_ids: new.time_slot_ids,
            shifts: new.shifts,
        };
        w.seed.flex_events.push(event.clone());
        Ok(event)
    }

    async fn replace_flex_shifts(
        &self,
        id: &FlexEventId,
        shifts: Vec<FlexShift>,
    ) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        let event = w
            .seed
            .flex_events
            .iter_mut()
            .find(|e| e.id == *id)
            .ok_or_else(|| StoreError::NotFound(format!("flex event {id}")))?;
        event.shifts = shifts;
        Ok(())
    }

    async fn delete_flex_event(&self, id: &FlexEventId) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        let before = w.seed.flex_events.len();
        w.seed.flex_events.retain(|e| e.id != *id);
        if w.seed.flex_events.len() == before {
            return Err(StoreError::NotFound(format!("flex event {id}")));
        }
        Ok(())
    }

    async fn coverage_requests(&self) -> Result<Vec<CoverageRequest>, StoreError> {
        Ok(self.inner.read().seed.coverage_requests.clone())
    }

    async fn coverage_request(
        &self,
        id: &CoverageRequestId,
    ) -> Result<Option<CoverageRequest>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .coverage_requests
            .iter()
            .find(|r| r.id == *id)
            .cloned())
    }

    async fn coverage_request_for_absence(
        &self,
        absence_id: &AbsenceId,
    ) -> Result<Option<CoverageRequest>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .coverage_requests
            .iter()
            .find(|r| r.absence_id == *absence_id)
            .cloned())
    }

    async fn sub_assignments(&self) -> Result<Vec<SubAssignment>, StoreError> {
        Ok(self.inner.read().seed.sub_assignments.clone())
    }

    async fn create_sub_assignment(
        &self,
        new: NewSubAssignment,
    ) -> Result<SubAssignment, StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        if w.seed.sub_assignments.iter().any(|s| {
            s.coverage_request_shift_id == new.coverage_request_shift_id && s.sub_id == new.sub_id
        }) {
            return Err(StoreError::Duplicate(format!(
                "sub {} already holds shift {}",
                new.sub_id, new.coverage_request_shift_id
            )));
        }
        let row = SubAssignment {
            id: SubAssignmentId(new_id()),
            coverage_request_id: new.coverage_request_id,
            coverage_request_shift_id: new.coverage_request_shift_id,
            sub_id: new.sub_id,
            is_partial: new.is_partial,
        };
        w.seed.sub_assignments.push(row.clone());
        Ok(row)
    }

    async fn delete_sub_assignment(&self, id: &SubAssignmentId) -> Result<(), StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        let before = w.seed.sub_assignments.len();
        w.seed.sub_assignments.retain(|s| s.id != *id);
        if w.seed.sub_assignments.len() == before {
            return Err(StoreError::NotFound(format!("sub assignment {id}")));
        }
        Ok(())
    }

    async fn unavailability(&self) -> Result<Vec<SubUnavailability>, StoreError> {
        Ok(self.inner.read().seed.unavailability.clone())
    }

    async fn contact(
        &self,
        coverage_request_id: &CoverageRequestId,
        sub_id: &StaffId,
    ) -> Result<Option<SubstituteContact>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .contacts
            .iter()
            .find(|c| c.coverage_request_id == *coverage_request_id && c.sub_id == *sub_id)
            .cloned())
    }

    async fn contact_by_id(&self, id: &ContactId) -> Result<Option<SubstituteContact>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .contacts
            .iter()
            .find(|c| c.id == *id)
            .cloned())
    }

    async fn contacts_for_request(
        &self,
        coverage_request_id: &CoverageRequestId,
    ) -> Result<Vec<SubstituteContact>, StoreError> {
        Ok(self
            .inner
            .read()
            .seed
            .contacts
            .iter()
            .filter(|c| c.coverage_request_id == *coverage_request_id)
            .cloned()
            .collect())
    }

    async fn create_contact(
        &self,
        coverage_request_id: &CoverageRequestId,
        sub_id: &StaffId,
    ) -> Result<SubstituteContact, StoreError> {
        let mut w = self.inner.write();
        if let Some(existing) = w
            .seed
            .contacts
            .iter()
            .find(|c| c.coverage_request_id == *coverage_request_id && c.sub_id == *sub_id)
        {
            return Ok(existing.clone());
        }
        w.writes += 1;
        let contact = SubstituteContact {
            id: ContactId(new_id()),
            coverage_request_id: coverage_request_id.clone(),
            sub_id: sub_id.clone(),
            is_contacted: false,
            response_status: ResponseStatus::None,
            notes: None,
            contacted_at: None,
            shift_overrides: Vec::new(),
        };
        w.seed.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn put_contact(
        &self,
        contact: SubstituteContact,
    ) -> Result<SubstituteContact, StoreError> {
        let mut w = self.inner.write();
        w.writes += 1;
        let slot = w
            .seed
            .contacts
            .iter_mut()
            .find(|c| c.id == contact.id)
            .ok_or_else(|| StoreError::NotFound(format!("contact {}", contact.id)))?;
        *slot = contact.clone();
        Ok(contact)
    }
}
