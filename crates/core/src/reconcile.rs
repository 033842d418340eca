//! Converges one schedule cell's teacher roster to the desired roster.
//!
//! Plans are computed against a snapshot of current assignments and are
//! independent per cell. Applying a plan is idempotent: a create that hits an
//! existing row and a delete of a row that is already gone both count as done.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use types::{
    Ack, AssignmentId, CellKey, DesiredTeacher, NewAssignment, StaffId, StepOutcome,
    TeacherScheduleAssignment,
};

use crate::error::{CoverageError, Result, StoreError};
use crate::saga::Saga;
use crate::{AssignmentFilter, StaffDirectory, Store};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloaterChange {
    pub assignment_id: AssignmentId,
    pub teacher_id: StaffId,
    pub is_floater: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RosterPlan {
    pub key: CellKey,
    pub deletions: Vec<TeacherScheduleAssignment>,
    pub creations: Vec<NewAssignment>,
    pub updates: Vec<FloaterChange>,
}

impl RosterPlan {
    pub fn is_noop(&self) -> bool {
        self.deletions.is_empty() && self.creations.is_empty() && self.updates.is_empty()
    }

    pub fn op_count(&self) -> usize {
        self.deletions.len() + self.creations.len() + self.updates.len()
    }
}

pub fn in_cell(a: &TeacherScheduleAssignment, key: &CellKey) -> bool {
    a.classroom_id == key.classroom_id
        && a.day_of_week == key.day_of_week
        && a.time_slot_id == key.time_slot_id
}

/// Diff the desired roster for `key` against the rows of `snapshot` that
/// belong to it. `snapshot` may hold rows for other cells; they are ignored.
pub fn plan_roster(
    key: &CellKey,
    desired: &[DesiredTeacher],
    snapshot: &[TeacherScheduleAssignment],
) -> RosterPlan {
    let mut wanted: HashMap<&StaffId, bool> = HashMap::new();
    let mut order: Vec<&DesiredTeacher> = Vec::new();
    for d in desired {
        if !wanted.contains_key(&d.teacher_id) {
            wanted.insert(&d.teacher_id, d.is_floater);
            order.push(d);
        }
    }

    let mut deletions = Vec::new();
    let mut updates = Vec::new();
    let mut present: HashSet<&StaffId> = HashSet::new();

    for a in snapshot.iter().filter(|a| in_cell(a, key)) {
        match wanted.get(&a.teacher_id) {
            None => deletions.push(a.clone()),
            // a second row for the same teacher breaks uniqueness; drop it
            Some(_) if !present.insert(&a.teacher_id) => deletions.push(a.clone()),
            Some(&is_floater) if a.is_floater != is_floater => updates.push(FloaterChange {
                assignment_id: a.id.clone(),
                teacher_id: a.teacher_id.clone(),
                is_floater,
            }),
            Some(_) => {}
        }
    }

    let creations = order
        .into_iter()
        .filter(|d| !present.contains(&d.teacher_id))
        .map(|d| NewAssignment {
            teacher_id: d.teacher_id.clone(),
            classroom_id: key.classroom_id.clone(),
            day_of_week: key.day_of_week,
            time_slot_id: key.time_slot_id.clone(),
            is_floater: d.is_floater,
        })
        .collect();

    RosterPlan {
        key: key.clone(),
        deletions,
        creations,
        updates,
    }
}

pub async fn apply_plan<S: Store + ?Sized>(
    store: &S,
    plan: &RosterPlan,
    staff: &StaffDirectory,
    saga: &mut Saga,
) -> Result<()> {
    let key = &plan.key;

    for a in &plan.deletions {
        let name = staff.name(&a.teacher_id);
        let outcome = match store.delete_assignment(&a.id).await {
            Ok(()) => Ok(StepOutcome::Applied),
            Err(StoreError::NotFound(_)) => Ok(StepOutcome::AlreadyApplied),
            Err(e) => Err(CoverageError::write(
                format!("failed to remove {name} from {key}"),
                e,
            )),
        };
        saga.track(format!("delete {name} from {key}"), outcome)?;
    }

    for new in &plan.creations {
        let name = staff.name(&new.teacher_id);
        let outcome = match store.create_assignment(new.clone()).await {
            Ok(_) => Ok(StepOutcome::Applied),
            Err(StoreError::Duplicate(detail)) => {
                debug!(teacher = %new.teacher_id, cell = %key, %detail, "assignment already exists");
                Ok(StepOutcome::AlreadyApplied)
            }
            Err(e) => Err(CoverageError::write(
                format!("failed to add {name} to {key}"),
                e,
            )),
        };
        saga.track(format!("create {name} in {key}"), outcome)?;
    }

    for change in &plan.updates {
        let name = staff.name(&change.teacher_id);
        let outcome = match store
            .update_assignment(&change.assignment_id, change.is_floater)
            .await
        {
            Ok(Some(updated)) if updated.is_floater == change.is_floater => Ok(StepOutcome::Applied),
            Ok(_) => Err(CoverageError::write(
                format!("failed to update floater flag for {name} in {key}"),
                StoreError::Backend(format!(
                    "update response did not confirm is_floater={}",
                    change.is_floater
                )),
            )),
            Err(e) => Err(CoverageError::write(
                format!("failed to update floater flag for {name} in {key}"),
                e,
            )),
        };
        saga.track(
            format!("set floater={} for {name} in {key}", change.is_floater),
            outcome,
        )?;
    }

    Ok(())
}

/// Create one assignment. A duplicate resolves to the row already stored.
pub async fn create_assignment<S: Store + ?Sized>(
    store: &S,
    new: NewAssignment,
) -> Result<TeacherScheduleAssignment> {
    let key = CellKey::new(new.classroom_id.clone(), new.day_of_week, new.time_slot_id.clone());
    match store.create_assignment(new.clone()).await {
        Ok(row) => Ok(row),
        Err(StoreError::Duplicate(detail)) => {
            debug!(teacher = %new.teacher_id, cell = %key, %detail, "assignment already exists");
            store
                .teacher_schedules(&AssignmentFilter::cell(&key))
                .await?
                .into_iter()
                .find(|a| a.teacher_id == new.teacher_id)
                .ok_or_else(|| {
                    CoverageError::not_found(format!("assignment for {} in {key}", new.teacher_id))
                })
        }
        Err(e) => {
            let staff = StaffDirectory::load(store).await?;
            Err(CoverageError::write(
                format!("failed to add {} to {key}", staff.name(&new.teacher_id)),
                e,
            ))
        }
    }
}

pub async fn set_floater<S: Store + ?Sized>(
    store: &S,
    id: &AssignmentId,
    is_floater: bool,
) -> Result<TeacherScheduleAssignment> {
    store
        .update_assignment(id, is_floater)
        .await
        .map_err(|e| CoverageError::write(format!("failed to update assignment {id}"), e))?
        .ok_or_else(|| CoverageError::not_found(format!("assignment {id}")))
}

pub async fn delete_assignment<S: Store + ?Sized>(store: &S, id: &AssignmentId) -> Result<Ack> {
    match store.delete_assignment(id).await {
        Ok(()) => Ok(Ack::with(1)),
        Err(StoreError::NotFound(_)) => Err(CoverageError::not_found(format!("assignment {id}"))),
        Err(e) => Err(CoverageError::write(format!("failed to delete assignment {id}"), e)),
    }
}

/// The snapshot as it will look once `plan` is applied. New rows get
/// placeholder ids.
pub fn project(snapshot: &mut Vec<TeacherScheduleAssignment>, plan: &RosterPlan) {
    let deleted: HashSet<&AssignmentId> = plan.deletions.iter().map(|a| &a.id).collect();
    snapshot.retain(|a| !deleted.contains(&a.id));
    for change in &plan.updates {
        if let Some(a) = snapshot.iter_mut().find(|a| a.id == change.assignment_id) {
            a.is_floater = change.is_floater;
        }
    }
    for new in &plan.creations {
        snapshot.push(TeacherScheduleAssignment {
            id: AssignmentId(format!("pending:{}:{}", new.teacher_id, plan.key)),
            teacher_id: new.teacher_id.clone(),
            classroom_id: new.classroom_id.clone(),
            day_of_week: new.day_of_week,
            time_slot_id: new.time_slot_id.clone(),
            is_floater: new.is_floater,
        });
    }
}
