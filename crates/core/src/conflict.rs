use std::collections::{HashMap, HashSet};

use tracing::info;
use types::{
    Ack, CellKey, Conflict, ConflictResolution, ConflictResolutionKind, DesiredTeacher,
    NewAssignment, ResolveConflictRequest, StaffId, StepOutcome, TeacherScheduleAssignment,
};

use crate::error::{CoverageError, Result};
use crate::saga::Saga;
use crate::{StaffDirectory, Store};

/// Conflicts raised by creating `creations` in `key`: the teacher already
/// holds an assignment in another classroom for the same day and slot.
/// Creations already flagged as floater acknowledge the split and are skipped.
pub fn detect(
    key: &CellKey,
    creations: &[NewAssignment],
    snapshot: &[TeacherScheduleAssignment],
    staff: &StaffDirectory,
) -> Vec<Conflict> {
    let mut out = Vec::new();
    for new in creations.iter().filter(|n| !n.is_floater) {
        for other in snapshot.iter().filter(|a| {
            a.teacher_id == new.teacher_id
                && a.day_of_week == key.day_of_week
                && a.time_slot_id == key.time_slot_id
                && a.classroom_id != key.classroom_id
        }) {
            out.push(Conflict {
                teacher_id: new.teacher_id.clone(),
                teacher_name: staff.name(&new.teacher_id),
                day_of_week: key.day_of_week,
                time_slot_id: key.time_slot_id.clone(),
                target_classroom_id: key.classroom_id.clone(),
                conflicting_classroom_id: other.classroom_id.clone(),
                conflicting_assignment_id: other.id.clone(),
            });
        }
    }
    out
}

fn resolves(r: &ConflictResolution, c: &Conflict) -> bool {
    r.teacher_id == c.teacher_id
        && r.day_of_week == c.day_of_week
        && r.time_slot_id == c.time_slot_id
        && r.conflicting_assignment_id == c.conflicting_assignment_id
}

/// Pair every conflict with its resolution. Returns the unresolved conflicts
/// if any remain; nothing may be written in that case.
pub fn gate(
    conflicts: Vec<Conflict>,
    resolutions: &[ConflictResolution],
) -> std::result::Result<Vec<(Conflict, ConflictResolutionKind)>, Vec<Conflict>> {
    let mut resolved = Vec::new();
    let mut pending = Vec::new();
    for c in conflicts {
        match resolutions.iter().find(|r| resolves(r, &c)) {
            Some(r) => resolved.push((c, r.resolution)),
            None => pending.push(c),
        }
    }
    if pending.is_empty() {
        Ok(resolved)
    } else {
        Err(pending)
    }
}

/// Every resolution for one teacher in one target cell must be the same
/// kind.
pub fn check_consistent(resolved: &[(Conflict, ConflictResolutionKind)]) -> Result<()> {
    let mut kinds: HashMap<(&StaffId, CellKey), ConflictResolutionKind> = HashMap::new();
    let mut errors = Vec::new();
    for (c, kind) in resolved {
        let target = CellKey::new(c.target_classroom_id.clone(), c.day_of_week, c.time_slot_id.clone());
        match kinds.get(&(&c.teacher_id, target.clone())) {
            Some(first) if first != kind => errors.push(format!(
                "{} has mixed resolutions for {target} ({first:?} and {kind:?})",
                c.teacher_name
            )),
            Some(_) => {}
            None => {
                kinds.insert((&c.teacher_id, target), *kind);
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoverageError::validation(errors.join("; ")))
    }
}

pub fn to_request(c: &Conflict, resolution: ConflictResolutionKind) -> ResolveConflictRequest {
    ResolveConflictRequest {
        teacher_id: c.teacher_id.clone(),
        day_of_week: c.day_of_week,
        time_slot_id: c.time_slot_id.clone(),
        resolution,
        target_classroom_id: c.target_classroom_id.clone(),
        conflicting_assignment_id: c.conflicting_assignment_id.clone(),
    }
}

/// How resolutions reshape one cell's desired roster.
#[derive(Debug, Default)]
pub struct RosterAdjustment {
    /// Teachers whose target assignment is written by the resolution itself.
    pub handled: HashSet<StaffId>,
    pub desired: Vec<DesiredTeacher>,
}

/// `cancel` drops the teacher, `mark_floater` flips them to floater, and both
/// `remove_other` and `mark_floater` leave the create to the resolution write.
pub fn adjust_roster(
    key: &CellKey,
    desired: &[DesiredTeacher],
    resolved: &[(Conflict, ConflictResolutionKind)],
) -> RosterAdjustment {
    let for_cell: Vec<&(Conflict, ConflictResolutionKind)> = resolved
        .iter()
        .filter(|(c, _)| {
            c.target_classroom_id == key.classroom_id
                && c.day_of_week == key.day_of_week
                && c.time_slot_id == key.time_slot_id
        })
        .collect();
    let mut out = RosterAdjustment::default();
    for d in desired {
        let kinds: Vec<ConflictResolutionKind> = for_cell
            .iter()
            .filter(|(c, _)| c.teacher_id == d.teacher_id)
            .map(|(_, k)| *k)
            .collect();
        if kinds.contains(&ConflictResolutionKind::Cancel) {
            continue;
        }
        let mut d = d.clone();
        if kinds.contains(&ConflictResolutionKind::MarkFloater) {
            d.is_floater = true;
        }
        if !kinds.is_empty() {
            out.handled.insert(d.teacher_id.clone());
        }
        out.desired.push(d);
    }
    out
}

/// Issue one resolve-conflict write per resolution, in order. Stops at the
/// first failure; earlier resolutions stay applied.
pub async fn apply_resolutions<S: Store + ?Sized>(
    store: &S,
    resolved: &[(Conflict, ConflictResolutionKind)],
    saga: &mut Saga,
) -> Result<()> {
    for (c, kind) in resolved {
        let request = to_request(c, *kind);
        let label = format!(
            "resolve {:?} for {} ({} vs {}, {} {})",
            kind,
            c.teacher_name,
            c.target_classroom_id,
            c.conflicting_classroom_id,
            c.day_of_week,
            c.time_slot_id
        );
        let outcome = store
            .resolve_conflict(&request)
            .await
            .map(|_| StepOutcome::Applied)
            .map_err(|e| {
                CoverageError::write(
                    format!("failed to resolve conflict for {}", c.teacher_name),
                    e,
                )
            });
        saga.track(label, outcome)?;
    }
    Ok(())
}

/// Stand-alone resolve-conflict operation.
pub async fn resolve<S: Store + ?Sized>(
    store: &S,
    request: &ResolveConflictRequest,
) -> Result<Ack> {
    let staff = StaffDirectory::load(store).await?;
    let name = staff.name(&request.teacher_id);
    info!(
        teacher = %request.teacher_id,
        resolution = ?request.resolution,
        target = %request.target_classroom_id,
        "resolving conflict"
    );
    store
        .resolve_conflict(request)
        .await
        .map_err(|e| CoverageError::write(format!("failed to resolve conflict for {name}"), e))?;
    Ok(Ack::with(1))
}
