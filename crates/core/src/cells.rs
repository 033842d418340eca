//! Saving a schedule cell: settings, conflict gating and roster reconciliation,
//! optionally fanned out across a whole row or column of the weekly grid.

use std::collections::{BTreeSet, HashMap};

use tracing::{error, info, warn};
use types::{
    Ack, ApplyScope, CellKey, CellStaffing, Conflict, ConflictResolutionKind, DayOfWeek,
    SaveCellRequest, SaveOutcome, ScheduleCell, StaffingStatus, StepOutcome,
    TeacherScheduleAssignment,
};

use crate::error::{CoverageError, Result};
use crate::saga::Saga;
use crate::staffing::{FloaterWeighting, StaffingContext};
use crate::{conflict, reconcile, validate_save, AssignmentFilter, StaffDirectory, Store};

/// Days a "same slot across all days" save fans out to.
pub const SCHOOL_DAYS: [DayOfWeek; 5] = [
    DayOfWeek::Mon,
    DayOfWeek::Tue,
    DayOfWeek::Wed,
    DayOfWeek::Thu,
    DayOfWeek::Fri,
];

pub async fn target_cells<S: Store + ?Sized>(store: &S, req: &SaveCellRequest) -> Result<Vec<CellKey>> {
    let anchor = req.anchor();
    let keys = match req.apply_scope {
        ApplyScope::SingleCell => vec![anchor],
        ApplyScope::SameSlotAllDays => {
            let mut days: BTreeSet<DayOfWeek> = SCHOOL_DAYS.into_iter().collect();
            days.insert(anchor.day_of_week);
            days.into_iter()
                .map(|d| CellKey::new(anchor.classroom_id.clone(), d, anchor.time_slot_id.clone()))
                .collect()
        }
        ApplyScope::SameDayAllSlots => {
            let mut slots = store.time_slots().await?;
            slots.sort_by(|a, b| (a.display_order, &a.id).cmp(&(b.display_order, &b.id)));
            let mut keys: Vec<CellKey> = slots
                .into_iter()
                .map(|s| CellKey::new(anchor.classroom_id.clone(), anchor.day_of_week, s.id))
                .collect();
            if !keys.contains(&anchor) {
                keys.push(anchor);
            }
            keys
        }
    };
    Ok(keys)
}

/// Conflicts only involve the same day and slot, so the snapshot never needs
/// to be narrowed by classroom.
fn snapshot_filter(req: &SaveCellRequest) -> AssignmentFilter {
    let mut filter = AssignmentFilter::default();
    match req.apply_scope {
        ApplyScope::SingleCell => {
            filter.day_of_week = Some(req.day_of_week);
            filter.time_slot_id = Some(req.time_slot_id.clone());
        }
        ApplyScope::SameSlotAllDays => filter.time_slot_id = Some(req.time_slot_id.clone()),
        ApplyScope::SameDayAllSlots => filter.day_of_week = Some(req.day_of_week),
    }
    filter
}

pub async fn load_cell<S: Store + ?Sized>(store: &S, key: &CellKey) -> Result<ScheduleCell> {
    Ok(store
        .cell(key)
        .await?
        .unwrap_or_else(|| ScheduleCell::empty(key)))
}

pub async fn roster<S: Store + ?Sized>(
    store: &S,
    key: &CellKey,
) -> Result<Vec<TeacherScheduleAssignment>> {
    Ok(store.teacher_schedules(&AssignmentFilter::cell(key)).await?)
}

/// Bulk settings update without touching rosters.
pub async fn put_cells<S: Store + ?Sized>(store: &S, cells: Vec<ScheduleCell>) -> Result<Ack> {
    let empty: Vec<String> = cells
        .iter()
        .filter(|c| c.is_active && c.class_group_ids.is_empty())
        .map(|c| c.key().to_string())
        .collect();
    if !empty.is_empty() {
        return Err(CoverageError::validation(format!(
            "active cells need at least one class group: {}",
            empty.join(", ")
        )));
    }
    let n = cells.len();
    store
        .put_cells(cells)
        .await
        .map_err(|e| CoverageError::write(format!("failed to save {n} schedule cell(s)"), e))?;
    Ok(Ack::with(n))
}

pub async fn save_cells<S: Store + ?Sized>(
    store: &S,
    req: &SaveCellRequest,
    weighting: FloaterWeighting,
) -> Result<SaveOutcome> {
    Ok(save_and_project(store, req, weighting).await?.outcome)
}

/// A save outcome plus the rosters the save should leave behind.
#[derive(Debug)]
pub struct ProjectedSave {
    pub outcome: SaveOutcome,
    /// Post-save roster of every target cell; empty unless fully saved.
    pub rosters: HashMap<CellKey, Vec<TeacherScheduleAssignment>>,
}

pub async fn save_and_project<S: Store + ?Sized>(
    store: &S,
    req: &SaveCellRequest,
    weighting: FloaterWeighting,
) -> Result<ProjectedSave> {
    validate_save(req)?;
    let targets = target_cells(store, req).await?;
    let staff = StaffDirectory::load(store).await?;
    // one fetch serves every target cell
    let snapshot = store.teacher_schedules(&snapshot_filter(req)).await?;

    let mut conflicts: Vec<Conflict> = Vec::new();
    for key in &targets {
        let plan = reconcile::plan_roster(key, &req.teachers, &snapshot);
        conflicts.extend(conflict::detect(key, &plan.creations, &snapshot, &staff));
    }
    let resolved = match conflict::gate(conflicts, &req.resolutions) {
        Ok(resolved) => resolved,
        Err(pending) => {
            info!(cell = %req.anchor(), pending = pending.len(), "save held for conflict resolution");
            return Ok(ProjectedSave {
                outcome: SaveOutcome::ConflictsPending { conflicts: pending },
                rosters: HashMap::new(),
            });
        }
    };
    conflict::check_consistent(&resolved)?;

    let mut existing: HashMap<CellKey, ScheduleCell> =
        store.cells().await?.into_iter().map(|c| (c.key(), c)).collect();
    let cells: Vec<ScheduleCell> = targets
        .iter()
        .map(|key| {
            let mut cell = existing
                .remove(key)
                .unwrap_or_else(|| ScheduleCell::empty(key));
            cell.is_active = req.is_active;
            cell.enrollment_for_staffing = req.enrollment_for_staffing;
            cell.notes = req.notes.clone();
            cell.class_group_ids = req.class_group_ids.clone();
            cell
        })
        .collect();

    let mut saga = Saga::new();
    if let Err(e) = apply(store, req, &targets, &cells, &resolved, &snapshot, &staff, &mut saga).await {
        error!(cell = %req.anchor(), error = %e, applied = saga.applied_count(), "save partially applied");
        return Ok(ProjectedSave {
            outcome: SaveOutcome::PartiallyApplied {
                report: saga.into_report(),
                error: e.to_string(),
            },
            rosters: HashMap::new(),
        });
    }

    let projected = projected_snapshot(req, &targets, &resolved, &snapshot);
    let groups = store.class_groups().await?;
    let ctx = StaffingContext::new(&groups, weighting);
    let staffing: Vec<CellStaffing> = cells
        .iter()
        .map(|c| ctx.cell_staffing(c, &projected))
        .collect();
    for s in &staffing {
        if let Some(summary) = s.summary.as_ref().filter(|s| s.status != StaffingStatus::Adequate) {
            warn!(
                cell = %CellKey::new(s.classroom_id.clone(), s.day_of_week, s.time_slot_id.clone()),
                status = ?summary.status,
                shortfall = ?summary.shortfall,
                "saved cell is under-staffed"
            );
        }
    }

    info!(cell = %req.anchor(), cells = targets.len(), steps = saga.applied_count(), "cells saved");
    let rosters = targets
        .iter()
        .map(|key| {
            let roster = projected
                .iter()
                .filter(|a| reconcile::in_cell(a, key))
                .cloned()
                .collect();
            (key.clone(), roster)
        })
        .collect();
    Ok(ProjectedSave {
        outcome: SaveOutcome::Saved {
            report: saga.into_report(),
            staffing,
        },
        rosters,
    })
}

#[allow(clippy::too_many_arguments)]
async fn apply<S: Store + ?Sized>(
    store: &S,
    req: &SaveCellRequest,
    targets: &[CellKey],
    cells: &[ScheduleCell],
    resolved: &[(Conflict, ConflictResolutionKind)],
    snapshot: &[TeacherScheduleAssignment],
    staff: &StaffDirectory,
    saga: &mut Saga,
) -> Result<()> {
    let outcome = store
        .put_cells(cells.to_vec())
        .await
        .map(|_| StepOutcome::Applied)
        .map_err(|e| {
            CoverageError::write(format!("failed to save settings for {}", req.anchor()), e)
        });
    saga.track(format!("update {} schedule cell(s)", cells.len()), outcome)?;

    conflict::apply_resolutions(store, resolved, saga).await?;

    for key in targets {
        let adjusted = conflict::adjust_roster(key, &req.teachers, resolved);
        let mut plan = reconcile::plan_roster(key, &adjusted.desired, snapshot);
        plan.creations
            .retain(|n| !adjusted.handled.contains(&n.teacher_id));
        reconcile::apply_plan(store, &plan, staff, saga).await?;
    }
    Ok(())
}

fn projected_snapshot(
    req: &SaveCellRequest,
    targets: &[CellKey],
    resolved: &[(Conflict, ConflictResolutionKind)],
    snapshot: &[TeacherScheduleAssignment],
) -> Vec<TeacherScheduleAssignment> {
    let mut projected = snapshot.to_vec();
    for (c, kind) in resolved {
        if *kind == ConflictResolutionKind::RemoveOther {
            projected.retain(|a| a.id != c.conflicting_assignment_id);
        }
    }
    for key in targets {
        let adjusted = conflict::adjust_roster(key, &req.teachers, resolved);
        let plan = reconcile::plan_roster(key, &adjusted.desired, snapshot);
        reconcile::project(&mut projected, &plan);
    }
    projected
}
