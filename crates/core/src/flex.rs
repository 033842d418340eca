//! Flex staffing: enumerating dated shifts, checking who is free, and
//! creating or trimming flex events.

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use tracing::{info, warn};
use types::{
    ClassroomId, DayFilter, DayOfWeek, FlexAssignmentCreated, FlexAssignmentRequest,
    FlexAvailabilityRequest, FlexAvailabilityResponse, FlexRemoveRequest, FlexRemoved, FlexShift,
    FlexStaffingEvent, RemovalScope, ShiftKey, StaffAvailability, StaffId, StaffingStatus,
    SubUnavailability, TeacherScheduleAssignment, TimeSlotId,
};

use crate::error::{CoverageError, Result};
use crate::staffing::{DatedStaffing, FloaterWeighting};
use crate::{AssignmentFilter, NewFlexEvent, Store};

/// Every date in `[start, end]`, inclusive.
pub fn iter_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        return Err(CoverageError::validation(format!(
            "date range is empty: {start} is after {end}"
        )));
    }
    Ok(())
}

pub fn day_matches(date: NaiveDate, start: NaiveDate, filter: Option<&DayFilter>) -> bool {
    match filter {
        None => true,
        Some(DayFilter::ThisDayOnly) => DayOfWeek::of(date) == DayOfWeek::of(start),
        Some(DayFilter::SpecificWeekdays { weekdays }) => weekdays.contains(&DayOfWeek::of(date)),
    }
}

/// One `date|slot` key per matching date and selected slot, date-major.
pub fn enumerate_shift_keys(
    start: NaiveDate,
    end: NaiveDate,
    time_slot_ids: &[TimeSlotId],
    filter: Option<&DayFilter>,
) -> Result<Vec<ShiftKey>> {
    check_range(start, end)?;
    let slots: Vec<&TimeSlotId> = {
        let mut seen = HashSet::new();
        time_slot_ids.iter().filter(|s| seen.insert(*s)).collect()
    };
    Ok(iter_days(start, end)
        .filter(|d| day_matches(*d, start, filter))
        .flat_map(|d| slots.iter().map(move |s| ShiftKey::new(d, (*s).clone())))
        .collect())
}

/// Each shift key replicated per classroom.
pub fn expand_shifts(keys: &[ShiftKey], classroom_ids: &[ClassroomId]) -> Vec<FlexShift> {
    keys.iter()
        .flat_map(|k| {
            classroom_ids.iter().map(move |c| FlexShift {
                date: k.date,
                day_of_week: k.day_of_week(),
                time_slot_id: k.time_slot_id.clone(),
                classroom_id: c.clone(),
            })
        })
        .collect()
}

/// Weekdays that occur in the range, Monday first.
pub fn day_options(start: NaiveDate, end: NaiveDate) -> Vec<DayOfWeek> {
    let days: BTreeSet<DayOfWeek> = iter_days(start, end).take(7).map(DayOfWeek::of).collect();
    days.into_iter().collect()
}

/// A one-shift event has nothing to choose between.
pub fn effective_scope(event: &FlexStaffingEvent, requested: RemovalScope) -> RemovalScope {
    if event.shifts.len() <= 1 {
        RemovalScope::SingleShift
    } else {
        requested
    }
}

/// What already occupies staff on a given date and slot.
#[derive(Debug, Default)]
pub struct Occupancy {
    permanent: HashSet<(StaffId, DayOfWeek, TimeSlotId)>,
    flex: HashSet<(StaffId, NaiveDate, TimeSlotId)>,
    unavailable: Vec<SubUnavailability>,
}

impl Occupancy {
    pub fn new(
        assignments: &[TeacherScheduleAssignment],
        flex_events: &[FlexStaffingEvent],
        unavailable: Vec<SubUnavailability>,
    ) -> Self {
        Self {
            permanent: assignments
                .iter()
                .map(|a| (a.teacher_id.clone(), a.day_of_week, a.time_slot_id.clone()))
                .collect(),
            flex: flex_events
                .iter()
                .flat_map(|e| {
                    e.shifts
                        .iter()
                        .map(move |s| (e.staff_id.clone(), s.date, s.time_slot_id.clone()))
                })
                .collect(),
            unavailable,
        }
    }

    pub async fn load<S: Store + ?Sized>(store: &S) -> Result<Self> {
        let assignments = store.teacher_schedules(&AssignmentFilter::default()).await?;
        let flex = store.flex_events().await?;
        let unavailable = store.unavailability().await?;
        Ok(Self::new(&assignments, &flex, unavailable))
    }

    pub fn is_free(&self, staff: &StaffId, key: &ShiftKey) -> bool {
        !self
            .permanent
            .contains(&(staff.clone(), key.day_of_week(), key.time_slot_id.clone()))
            && !self
                .flex
                .contains(&(staff.clone(), key.date, key.time_slot_id.clone()))
            && !self
                .unavailable
                .iter()
                .any(|u| u.blocks(staff, key.date, &key.time_slot_id))
    }
}

fn require_selection(classrooms: &[ClassroomId], slots: &[TimeSlotId]) -> Result<()> {
    let mut errors = Vec::new();
    if classrooms.is_empty() {
        errors.push("select at least one classroom");
    }
    if slots.is_empty() {
        errors.push("select at least one time slot");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoverageError::validation(errors.join("; ")))
    }
}

pub async fn flex_availability<S: Store + ?Sized>(
    store: &S,
    req: &FlexAvailabilityRequest,
    weighting: FloaterWeighting,
) -> Result<FlexAvailabilityResponse> {
    require_selection(&req.classroom_ids, &req.time_slot_ids)?;
    let keys = enumerate_shift_keys(
        req.start_date,
        req.end_date,
        &req.time_slot_ids,
        req.day_filter.as_ref(),
    )?;

    let occupancy = Occupancy::load(store).await?;
    let mut flex_staff: Vec<_> = store.staff().await?.into_iter().filter(|s| s.is_flex).collect();
    flex_staff.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    let staff = flex_staff
        .into_iter()
        .map(|s| StaffAvailability {
            available_shift_keys: keys
                .iter()
                .filter(|k| occupancy.is_free(&s.id, k))
                .cloned()
                .collect(),
            id: s.id,
            name: s.name,
        })
        .collect();

    let dated = DatedStaffing::load(store, weighting).await?;
    let shift_metrics = keys
        .iter()
        .flat_map(|k| {
            req.classroom_ids
                .iter()
                .map(|c| dated.metric(k.date, &k.time_slot_id, c))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(FlexAvailabilityResponse {
        staff,
        shift_metrics,
        day_options: day_options(req.start_date, req.end_date),
    })
}

/// All-or-nothing: every key is checked before the single event write.
pub async fn create_flex_assignment<S: Store + ?Sized>(
    store: &S,
    req: &FlexAssignmentRequest,
    weighting: FloaterWeighting,
) -> Result<FlexAssignmentCreated> {
    check_range(req.start_date, req.end_date)?;
    require_selection(&req.classroom_ids, &req.time_slot_ids)?;
    if req.shifts.is_empty() {
        return Err(CoverageError::validation("select at least one shift"));
    }

    let member = store
        .staff()
        .await?
        .into_iter()
        .find(|s| s.id == req.staff_id)
        .ok_or_else(|| CoverageError::not_found(format!("staff member {}", req.staff_id)))?;
    if !member.is_flex {
        return Err(CoverageError::validation(format!(
            "{} is not flex staff",
            member.name
        )));
    }

    let keys: Vec<ShiftKey> = {
        let mut seen = HashSet::new();
        req.shifts.iter().filter(|k| seen.insert(*k)).cloned().collect()
    };
    let occupancy = Occupancy::load(store).await?;
    let mut errors = Vec::new();
    for k in &keys {
        if k.date < req.start_date || k.date > req.end_date {
            errors.push(format!("shift {k} is outside {}..{}", req.start_date, req.end_date));
        } else if !req.time_slot_ids.contains(&k.time_slot_id) {
            errors.push(format!("shift {k} uses an unselected time slot"));
        } else if !occupancy.is_free(&member.id, k) {
            errors.push(format!("{} is not available for {k}", member.name));
        }
    }
    if !errors.is_empty() {
        return Err(CoverageError::validation(errors.join("; ")));
    }

    let shifts = expand_shifts(&keys, &req.classroom_ids);
    let dated = DatedStaffing::load(store, weighting).await?;
    let (mut below_required, mut below_preferred) = (0, 0);
    for s in &shifts {
        match dated.metric(s.date, &s.time_slot_id, &s.classroom_id).status {
            StaffingStatus::BelowRequired => below_required += 1,
            StaffingStatus::BelowPreferred => below_preferred += 1,
            StaffingStatus::Adequate => {}
        }
    }
    if below_required + below_preferred > 0 {
        warn!(
            staff = %member.id,
            below_required,
            below_preferred,
            "flex shifts land on under-staffed cells"
        );
    }

    let shift_count = shifts.len();
    let event = store
        .create_flex_event(NewFlexEvent {
            staff_id: member.id.clone(),
            start_date: req.start_date,
            end_date: req.end_date,
            classroom_ids: req.classroom_ids.clone(),
            time_slot_ids: req.time_slot_ids.clone(),
            shifts,
        })
        .await
        .map_err(|e| {
            CoverageError::write(format!("failed to create flex assignment for {}", member.name), e)
        })?;

    info!(staff = %member.id, event = %event.id, shift_count, "flex assignment created");
    Ok(FlexAssignmentCreated {
        event_id: event.id,
        shift_count,
        below_required,
        below_preferred,
    })
}

fn removal_filter(
    event: &FlexStaffingEvent,
    scope: RemovalScope,
    req: &FlexRemoveRequest,
) -> Result<Box<dyn Fn(&FlexShift) -> bool + Send + Sync>> {
    if event.shifts.len() <= 1 {
        return Ok(Box::new(|_: &FlexShift| true));
    }
    match scope {
        RemovalScope::AllShifts => Ok(Box::new(|_: &FlexShift| true)),
        RemovalScope::SingleShift => {
            let (Some(date), Some(slot), Some(room)) = (
                req.date,
                req.time_slot_id.clone(),
                req.classroom_id.clone(),
            ) else {
                return Err(CoverageError::validation(
                    "single_shift removal needs date, time_slot_id and classroom_id",
                ));
            };
            Ok(Box::new(move |s: &FlexShift| {
                s.date == date && s.time_slot_id == slot && s.classroom_id == room
            }))
        }
        RemovalScope::Weekday => {
            let day = req
                .day_of_week
                .or(req.date.map(DayOfWeek::of))
                .ok_or_else(|| {
                    CoverageError::validation("weekday removal needs day_of_week or date")
                })?;
            let room = req.classroom_id.clone();
            let slot = req.time_slot_id.clone();
            Ok(Box::new(move |s: &FlexShift| {
                s.day_of_week == day
                    && room.as_ref().map_or(true, |r| *r == s.classroom_id)
                    && slot.as_ref().map_or(true, |t| *t == s.time_slot_id)
            }))
        }
    }
}

pub async fn remove_flex_assignment<S: Store + ?Sized>(
    store: &S,
    req: &FlexRemoveRequest,
) -> Result<FlexRemoved> {
    let event = store
        .flex_event(&req.event_id)
        .await?
        .ok_or_else(|| CoverageError::not_found(format!("flex event {}", req.event_id)))?;
    let applied_scope = effective_scope(&event, req.scope);
    let remove = removal_filter(&event, applied_scope, req)?;

    let (removed, kept): (Vec<FlexShift>, Vec<FlexShift>) =
        event.shifts.iter().cloned().partition(|s| remove(s));
    if removed.is_empty() {
        return Err(CoverageError::not_found(format!(
            "no shifts of flex event {} match the removal",
            event.id
        )));
    }

    let event_deleted = kept.is_empty();
    let context = format!("failed to remove flex shifts from event {}", event.id);
    if event_deleted {
        store
            .delete_flex_event(&event.id)
            .await
            .map_err(|e| CoverageError::write(context, e))?;
    } else {
        store
            .replace_flex_shifts(&event.id, kept)
            .await
            .map_err(|e| CoverageError::write(context, e))?;
    }

    info!(
        event = %event.id,
        scope = ?applied_scope,
        removed = removed.len(),
        event_deleted,
        "flex shifts removed"
    );
    Ok(FlexRemoved {
        removed_shifts: removed.len(),
        event_deleted,
        applied_scope,
    })
}
