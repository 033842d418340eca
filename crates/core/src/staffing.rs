use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use types::{
    CellKey, CellStaffing, ClassGroup, ClassGroupId, ClassroomId, CoverageRequest, DayOfWeek,
    FlexStaffingEvent, ScheduleCell, ShiftMetric, StaffId, StaffingRollup, StaffingStatus,
    StaffingSummary, SubAssignment, TeacherScheduleAssignment, TimeSlotId,
};

use crate::ratio::{self, StaffingTargets};
use crate::{AssignmentFilter, Result, Store};

/// Share of a teacher a floater is assumed to contribute under
/// [`FloaterWeighting::Fixed`]: a floater is taken to split across two rooms.
pub const FLOATER_WEIGHT: f64 = 0.5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloaterWeighting {
    #[default]
    Fixed,
    /// A floater counts `1 / n` where `n` is the number of classrooms they are
    /// assigned to for the same day and slot.
    ByRoomCount,
}

impl FromStr for FloaterWeighting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(FloaterWeighting::Fixed),
            "by_room_count" => Ok(FloaterWeighting::ByRoomCount),
            other => Err(format!("unknown floater weighting: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contribution {
    pub is_floater: bool,
    pub rooms: usize,
}

impl Contribution {
    pub const FULL: Contribution = Contribution {
        is_floater: false,
        rooms: 1,
    };
}

impl FloaterWeighting {
    pub fn weight(&self, c: Contribution) -> f64 {
        if !c.is_floater {
            return 1.0;
        }
        match self {
            FloaterWeighting::Fixed => FLOATER_WEIGHT,
            FloaterWeighting::ByRoomCount => 1.0 / c.rooms.max(1) as f64,
        }
    }
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn scheduled_count<I>(weighting: FloaterWeighting, contributions: I) -> f64
where
    I: IntoIterator<Item = Contribution>,
{
    round1(contributions.into_iter().map(|c| weighting.weight(c)).sum())
}

/// The single place a scheduled count is turned into a staffing status.
pub fn classify(scheduled: f64, targets: StaffingTargets) -> StaffingSummary {
    let short_of = |target: Option<u32>| target.filter(|&t| scheduled < f64::from(t));

    let (status, shortfall) = if let Some(required) = short_of(targets.required) {
        (
            StaffingStatus::BelowRequired,
            Some(round1(f64::from(required) - scheduled)),
        )
    } else if let Some(preferred) = short_of(targets.preferred) {
        (
            StaffingStatus::BelowPreferred,
            Some(round1(f64::from(preferred) - scheduled)),
        )
    } else {
        (StaffingStatus::Adequate, None)
    };

    StaffingSummary {
        required: targets.required,
        preferred: targets.preferred,
        scheduled,
        status,
        shortfall,
    }
}

pub struct StaffingContext<'a> {
    groups: HashMap<&'a ClassGroupId, &'a ClassGroup>,
    weighting: FloaterWeighting,
}

impl<'a> StaffingContext<'a> {
    pub fn new(groups: &'a [ClassGroup], weighting: FloaterWeighting) -> Self {
        Self {
            groups: groups.iter().map(|g| (&g.id, g)).collect(),
            weighting,
        }
    }

    pub fn weighting(&self) -> FloaterWeighting {
        self.weighting
    }

    pub fn targets(&self, cell: &ScheduleCell) -> StaffingTargets {
        let group = ratio::authoritative_group(
            cell.class_group_ids
                .iter()
                .filter_map(|id| self.groups.get(id).copied()),
        );
        ratio::targets(cell.enrollment_for_staffing, group)
    }

    /// `roster` holds the cell's assignments, `slot_roster` every assignment
    /// sharing the cell's day and slot (used to count a floater's rooms).
    pub fn contributions(
        roster: &[&TeacherScheduleAssignment],
        slot_roster: &[&TeacherScheduleAssignment],
    ) -> Vec<Contribution> {
        roster
            .iter()
            .map(|a| {
                let rooms: HashSet<&ClassroomId> = slot_roster
                    .iter()
                    .filter(|o| {
                        o.teacher_id == a.teacher_id
                            && o.day_of_week == a.day_of_week
                            && o.time_slot_id == a.time_slot_id
                    })
                    .map(|o| &o.classroom_id)
                    .collect();
                Contribution {
                    is_floater: a.is_floater,
                    rooms: rooms.len().max(1),
                }
            })
            .collect()
    }

    /// Inactive cells are exempt and yield `None`.
    pub fn cell_summary(
        &self,
        cell: &ScheduleCell,
        roster: &[&TeacherScheduleAssignment],
        slot_roster: &[&TeacherScheduleAssignment],
    ) -> Option<StaffingSummary> {
        if !cell.is_active {
            return None;
        }
        let scheduled = scheduled_count(self.weighting, Self::contributions(roster, slot_roster));
        Some(classify(scheduled, self.targets(cell)))
    }

    pub fn cell_staffing(
        &self,
        cell: &ScheduleCell,
        assignments: &[TeacherScheduleAssignment],
    ) -> CellStaffing {
        let slot_roster: Vec<&TeacherScheduleAssignment> = assignments
            .iter()
            .filter(|a| a.day_of_week == cell.day_of_week && a.time_slot_id == cell.time_slot_id)
            .collect();
        let roster: Vec<&TeacherScheduleAssignment> = slot_roster
            .iter()
            .copied()
            .filter(|a| a.classroom_id == cell.classroom_id)
            .collect();
        CellStaffing {
            classroom_id: cell.classroom_id.clone(),
            day_of_week: cell.day_of_week,
            time_slot_id: cell.time_slot_id.clone(),
            is_active: cell.is_active,
            summary: self.cell_summary(cell, &roster, &slot_roster),
        }
    }

    pub fn rollup(
        &self,
        cells: &[ScheduleCell],
        assignments: &[TeacherScheduleAssignment],
    ) -> StaffingRollup {
        let mut out = StaffingRollup::default();
        for cell in cells {
            let staffing = self.cell_staffing(cell, assignments);
            match staffing.summary.as_ref().map(|s| s.status) {
                None => out.exempt += 1,
                Some(StaffingStatus::BelowRequired) => out.below_required += 1,
                Some(StaffingStatus::BelowPreferred) => out.below_preferred += 1,
                Some(StaffingStatus::Adequate) => out.adequate += 1,
            }
            out.cells.push(staffing);
        }
        out
    }
}

pub async fn load_rollup<S: Store + ?Sized>(
    store: &S,
    weighting: FloaterWeighting,
) -> Result<StaffingRollup> {
    let groups = store.class_groups().await?;
    let cells = store.cells().await?;
    let assignments = store.teacher_schedules(&AssignmentFilter::default()).await?;
    Ok(StaffingContext::new(&groups, weighting).rollup(&cells, &assignments))
}

type DatedCell = (NaiveDate, TimeSlotId, ClassroomId);

/// Staffing for concrete dates: the weekly roster adjusted for absences, sub
/// assignments and flex shifts.
pub struct DatedStaffing {
    cells: HashMap<CellKey, ScheduleCell>,
    groups: Vec<ClassGroup>,
    assignments: Vec<TeacherScheduleAssignment>,
    absent: HashSet<(StaffId, NaiveDate, TimeSlotId, ClassroomId)>,
    extra: HashMap<DatedCell, usize>,
    weighting: FloaterWeighting,
}

impl DatedStaffing {
    pub fn new(
        cells: Vec<ScheduleCell>,
        groups: Vec<ClassGroup>,
        assignments: Vec<TeacherScheduleAssignment>,
        requests: &[CoverageRequest],
        sub_assignments: &[SubAssignment],
        flex_events: &[FlexStaffingEvent],
        weighting: FloaterWeighting,
    ) -> Self {
        let mut absent = HashSet::new();
        let mut extra: HashMap<DatedCell, usize> = HashMap::new();
        for request in requests {
            for shift in &request.shifts {
                absent.insert((
                    request.teacher_id.clone(),
                    shift.date,
                    shift.time_slot_id.clone(),
                    shift.classroom_id.clone(),
                ));
                let subs = sub_assignments
                    .iter()
                    .filter(|s| s.coverage_request_shift_id == shift.id)
                    .count();
                if subs > 0 {
                    *extra
                        .entry((shift.date, shift.time_slot_id.clone(), shift.classroom_id.clone()))
                        .or_default() += subs;
                }
            }
        }
        for event in flex_events {
            for shift in &event.shifts {
                *extra
                    .entry((shift.date, shift.time_slot_id.clone(), shift.classroom_id.clone()))
                    .or_default() += 1;
            }
        }
        Self {
            cells: cells.into_iter().map(|c| (c.key(), c)).collect(),
            groups,
            assignments,
            absent,
            extra,
            weighting,
        }
    }

    pub async fn load<S: Store + ?Sized>(store: &S, weighting: FloaterWeighting) -> Result<Self> {
        let cells = store.cells().await?;
        let groups = store.class_groups().await?;
        let assignments = store.teacher_schedules(&AssignmentFilter::default()).await?;
        let requests = store.coverage_requests().await?;
        let subs = store.sub_assignments().await?;
        let flex = store.flex_events().await?;
        Ok(Self::new(
            cells,
            groups,
            assignments,
            &requests,
            &subs,
            &flex,
            weighting,
        ))
    }

    fn present_on(&self, a: &TeacherScheduleAssignment, date: NaiveDate) -> bool {
        !self.absent.contains(&(
            a.teacher_id.clone(),
            date,
            a.time_slot_id.clone(),
            a.classroom_id.clone(),
        ))
    }

    pub fn metric(
        &self,
        date: NaiveDate,
        time_slot_id: &TimeSlotId,
        classroom_id: &ClassroomId,
    ) -> ShiftMetric {
        let day = DayOfWeek::of(date);
        let key = CellKey::new(classroom_id.clone(), day, time_slot_id.clone());
        let ctx = StaffingContext::new(&self.groups, self.weighting);
        let targets = self
            .cells
            .get(&key)
            .filter(|c| c.is_active)
            .map(|c| ctx.targets(c))
            .unwrap_or_default();

        let slot_roster: Vec<&TeacherScheduleAssignment> = self
            .assignments
            .iter()
            .filter(|a| a.day_of_week == day && a.time_slot_id == *time_slot_id)
            .filter(|a| self.present_on(a, date))
            .collect();
        let roster: Vec<&TeacherScheduleAssignment> = slot_roster
            .iter()
            .copied()
            .filter(|a| a.classroom_id == *classroom_id)
            .collect();

        let extra = self
            .extra
            .get(&(date, time_slot_id.clone(), classroom_id.clone()))
            .copied()
            .unwrap_or(0);
        let mut contributions = StaffingContext::contributions(&roster, &slot_roster);
        contributions.extend(std::iter::repeat(Contribution::FULL).take(extra));
        let summary = classify(scheduled_count(self.weighting, contributions), targets);

        ShiftMetric {
            date,
            time_slot_id: time_slot_id.clone(),
            classroom_id: classroom_id.clone(),
            required: summary.required,
            preferred: summary.preferred,
            scheduled: summary.scheduled,
            status: summary.status,
        }
    }
}
