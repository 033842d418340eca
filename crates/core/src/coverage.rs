//! Substitute coverage for an absence: shift status, remaining shifts,
//! availability, contact state and shift assignment.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use types::{
    AbsenceId, Ack, AssignConfirmation, AssignSubShiftsRequest, AssignSubShiftsResponse,
    AssignedSub, Classroom, ClassroomId, ContactId, ContactStatus, ContactUpdate, ContactView,
    CoverageCounters, CoverageRequest, CoverageRequestId, CoverageRequestShift,
    CoverageRequestView, CoverageShiftId, CoverageStatus, DayOfWeek, RemainingShifts,
    ResponseStatus, ShiftAvailability, ShiftDetail, ShiftKey, ShiftOverride,
    ShiftOverridesRequest, ShiftOverridesResponse, StaffId, StaffMember, SubAssignment,
    SubCandidate, SubUnavailability, SubstituteContact, TimeSlotId, UnassignScope,
    UnassignShiftsRequest, UnavailableReason,
};

use crate::error::{CoverageError, Result, StoreError};
use crate::{AssignmentFilter, NewSubAssignment, StaffDirectory, Store};

/// Any full assignment covers the shift; partial ones only partly.
pub fn shift_status(shift_id: &CoverageShiftId, subs: &[SubAssignment]) -> CoverageStatus {
    let mut held = subs
        .iter()
        .filter(|s| s.coverage_request_shift_id == *shift_id)
        .peekable();
    if held.peek().is_none() {
        CoverageStatus::Uncovered
    } else if held.any(|s| !s.is_partial) {
        CoverageStatus::FullyCovered
    } else {
        CoverageStatus::PartiallyCovered
    }
}

pub fn counters<'a>(statuses: impl IntoIterator<Item = &'a CoverageStatus>) -> CoverageCounters {
    let mut c = CoverageCounters::default();
    for s in statuses {
        c.total_shifts += 1;
        match s {
            CoverageStatus::Uncovered => c.uncovered_shifts += 1,
            CoverageStatus::FullyCovered => c.assigned_shifts += 1,
            CoverageStatus::PartiallyCovered => c.partial_shifts += 1,
        }
    }
    c
}

/// Shift keys of the request not yet held by any substitute, one per
/// date and slot.
pub fn remaining_shift_keys(request: &CoverageRequest, subs: &[SubAssignment]) -> RemainingShifts {
    let held: HashSet<&CoverageShiftId> = subs
        .iter()
        .filter(|s| s.coverage_request_id == request.id)
        .map(|s| &s.coverage_request_shift_id)
        .collect();
    let total: BTreeSet<ShiftKey> = request.shifts.iter().map(|s| s.shift_key()).collect();
    let assigned: BTreeSet<ShiftKey> = request
        .shifts
        .iter()
        .filter(|s| held.contains(&s.id))
        .map(|s| s.shift_key())
        .collect();
    let remaining_shift_keys: Vec<ShiftKey> = total.difference(&assigned).cloned().collect();
    RemainingShifts {
        remaining_shift_count: remaining_shift_keys.len(),
        remaining_shift_keys,
    }
}

async fn request_for_absence<S: Store + ?Sized>(store: &S, absence_id: &AbsenceId) -> Result<CoverageRequest> {
    store
        .coverage_request_for_absence(absence_id)
        .await?
        .ok_or_else(|| CoverageError::not_found(format!("coverage request for absence {absence_id}")))
}

async fn request_by_id<S: Store + ?Sized>(store: &S, id: &CoverageRequestId) -> Result<CoverageRequest> {
    store
        .coverage_request(id)
        .await?
        .ok_or_else(|| CoverageError::not_found(format!("coverage request {id}")))
}

fn substitute<'a>(staff: &'a StaffDirectory, id: &StaffId) -> Result<&'a StaffMember> {
    let member = staff
        .get(id)
        .ok_or_else(|| CoverageError::not_found(format!("staff member {id}")))?;
    if !member.is_substitute {
        return Err(CoverageError::validation(format!("{} is not a substitute", member.name)));
    }
    Ok(member)
}

fn sorted_shifts(request: &CoverageRequest) -> Vec<&CoverageRequestShift> {
    let mut shifts: Vec<&CoverageRequestShift> = request.shifts.iter().collect();
    shifts.sort_by(|a, b| {
        (a.date, &a.time_slot_id, &a.classroom_id).cmp(&(b.date, &b.time_slot_id, &b.classroom_id))
    });
    shifts
}

pub async fn coverage_request<S: Store + ?Sized>(
    store: &S,
    absence_id: &AbsenceId,
) -> Result<CoverageRequestView> {
    let request = request_for_absence(store, absence_id).await?;
    let subs = store.sub_assignments().await?;
    let staff = StaffDirectory::load(store).await?;

    let shift_details: Vec<ShiftDetail> = sorted_shifts(&request)
        .into_iter()
        .map(|shift| ShiftDetail {
            status: shift_status(&shift.id, &subs),
            assigned_subs: subs
                .iter()
                .filter(|s| s.coverage_request_shift_id == shift.id)
                .map(|s| AssignedSub {
                    sub_id: s.sub_id.clone(),
                    name: staff.name(&s.sub_id),
                    is_partial: s.is_partial,
                })
                .collect(),
            shift: shift.clone(),
        })
        .collect();
    let counters = counters(shift_details.iter().map(|d| &d.status));

    Ok(CoverageRequestView {
        coverage_request_id: request.id,
        absence_id: request.absence_id,
        teacher_id: request.teacher_id,
        shift_details,
        counters,
    })
}

pub async fn assigned_shifts<S: Store + ?Sized>(
    store: &S,
    absence_id: &AbsenceId,
) -> Result<RemainingShifts> {
    let request = request_for_absence(store, absence_id).await?;
    let subs = store.sub_assignments().await?;
    Ok(remaining_shift_keys(&request, &subs))
}

/// Everything that can keep a substitute off a shift.
pub struct Availability {
    teaching: HashSet<(StaffId, DayOfWeek, TimeSlotId)>,
    subbing: HashMap<StaffId, Vec<(CoverageRequestId, ShiftKey)>>,
    unavailable: Vec<SubUnavailability>,
    classrooms: HashMap<ClassroomId, Classroom>,
}

impl Availability {
    pub async fn load<S: Store + ?Sized>(store: &S) -> Result<Self> {
        let assignments = store.teacher_schedules(&AssignmentFilter::default()).await?;
        let requests = store.coverage_requests().await?;
        let subs = store.sub_assignments().await?;
        let unavailable = store.unavailability().await?;
        let classrooms = store.classrooms().await?;

        let shift_keys: HashMap<&CoverageShiftId, ShiftKey> = requests
            .iter()
            .flat_map(|r| r.shifts.iter().map(|s| (&s.id, s.shift_key())))
            .collect();
        let mut subbing: HashMap<StaffId, Vec<(CoverageRequestId, ShiftKey)>> = HashMap::new();
        for s in &subs {
            if let Some(key) = shift_keys.get(&s.coverage_request_shift_id) {
                subbing
                    .entry(s.sub_id.clone())
                    .or_default()
                    .push((s.coverage_request_id.clone(), key.clone()));
            }
        }

        Ok(Self {
            teaching: assignments
                .into_iter()
                .map(|a| (a.teacher_id, a.day_of_week, a.time_slot_id))
                .collect(),
            subbing,
            unavailable,
            classrooms: classrooms.into_iter().map(|c| (c.id.clone(), c)).collect(),
        })
    }

    /// First blocking reason, checked in a fixed order.
    pub fn reason(
        &self,
        sub: &StaffMember,
        request_id: &CoverageRequestId,
        shift: &CoverageRequestShift,
    ) -> Option<UnavailableReason> {
        let key = shift.shift_key();
        if self
            .teaching
            .contains(&(sub.id.clone(), shift.day_of_week, shift.time_slot_id.clone()))
        {
            return Some(UnavailableReason::ScheduleConflict);
        }
        if self
            .subbing
            .get(&sub.id)
            .is_some_and(|held| held.iter().any(|(r, k)| r != request_id && *k == key))
        {
            return Some(UnavailableReason::SubConflict);
        }
        if self
            .unavailable
            .iter()
            .any(|u| u.blocks(&sub.id, shift.date, &shift.time_slot_id))
        {
            return Some(UnavailableReason::Unavailable);
        }
        let lacks_qualification = self.classrooms.get(&shift.classroom_id).is_some_and(|c| {
            c.required_qualifications
                .iter()
                .any(|q| !sub.qualifications.contains(q))
        });
        lacks_qualification.then_some(UnavailableReason::QualificationMismatch)
    }

    pub fn for_request(&self, sub: &StaffMember, request: &CoverageRequest) -> Vec<ShiftAvailability> {
        sorted_shifts(request)
            .into_iter()
            .map(|shift| {
                let reason = self.reason(sub, &request.id, shift);
                ShiftAvailability {
                    coverage_request_shift_id: shift.id.clone(),
                    shift_key: shift.shift_key(),
                    can_cover: reason.is_none(),
                    reason,
                }
            })
            .collect()
    }
}

/// Every substitute with per-shift availability, best coverage first.
pub async fn candidates<S: Store + ?Sized>(
    store: &S,
    absence_id: &AbsenceId,
) -> Result<Vec<SubCandidate>> {
    let request = request_for_absence(store, absence_id).await?;
    let availability = Availability::load(store).await?;
    let contacts: HashMap<StaffId, ContactStatus> = store
        .contacts_for_request(&request.id)
        .await?
        .into_iter()
        .map(|c| (c.sub_id.clone(), c.contact_status()))
        .collect();

    let mut out: Vec<SubCandidate> = store
        .staff()
        .await?
        .into_iter()
        .filter(|s| s.is_substitute)
        .map(|sub| {
            let shifts = availability.for_request(&sub, &request);
            SubCandidate {
                can_cover_count: shifts.iter().filter(|s| s.can_cover).count(),
                contact_status: contacts
                    .get(&sub.id)
                    .copied()
                    .unwrap_or(ContactStatus::NotContacted),
                sub_id: sub.id,
                name: sub.name,
                shifts,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.can_cover_count
            .cmp(&a.can_cover_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(out)
}

pub async fn get_or_create_contact<S: Store + ?Sized>(
    store: &S,
    coverage_request_id: &CoverageRequestId,
    sub_id: &StaffId,
) -> Result<ContactView> {
    request_by_id(store, coverage_request_id).await?;
    let staff = StaffDirectory::load(store).await?;
    let sub = substitute(&staff, sub_id)?;
    let contact = store
        .create_contact(coverage_request_id, sub_id)
        .await
        .map_err(|e| CoverageError::write(format!("failed to open contact for {}", sub.name), e))?;
    Ok(contact.into())
}

/// Move a contact to `update.contact_status`. `has_assigned_shifts` says
/// whether the sub already holds shifts on this request.
pub fn apply_contact_update(
    contact: &mut SubstituteContact,
    update: &ContactUpdate,
    has_assigned_shifts: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    match update.contact_status {
        ContactStatus::NotContacted => {
            contact.is_contacted = false;
            contact.contacted_at = None;
            contact.response_status = ResponseStatus::None;
        }
        status => {
            if status == ContactStatus::Confirmed
                && contact.selected_shift_ids().next().is_none()
                && !has_assigned_shifts
            {
                return Err(CoverageError::validation(
                    "confirmed requires at least one selected or assigned shift; pick shifts or change the status",
                ));
            }
            contact.is_contacted = true;
            contact.contacted_at.get_or_insert(now);
            contact.response_status = match status {
                ContactStatus::Confirmed => ResponseStatus::Confirmed,
                ContactStatus::DeclinedAll => ResponseStatus::DeclinedAll,
                _ => ResponseStatus::Pending,
            };
            if status == ContactStatus::DeclinedAll {
                contact.shift_overrides.clear();
            }
        }
    }
    if let Some(notes) = &update.notes {
        contact.notes = Some(notes.clone());
    }
    Ok(())
}

/// The stored contact, created on first use. Callers validate before this.
async fn open_contact<S: Store + ?Sized>(
    store: &S,
    existing: Option<SubstituteContact>,
    coverage_request_id: &CoverageRequestId,
    sub: &StaffMember,
) -> Result<SubstituteContact> {
    match existing {
        Some(contact) => Ok(contact),
        None => store
            .create_contact(coverage_request_id, &sub.id)
            .await
            .map_err(|e| CoverageError::write(format!("failed to open contact for {}", sub.name), e)),
    }
}

fn holds_shifts(subs: &[SubAssignment], request_id: &CoverageRequestId, sub_id: &StaffId) -> bool {
    subs.iter()
        .any(|s| s.coverage_request_id == *request_id && s.sub_id == *sub_id)
}

pub async fn update_contact<S: Store + ?Sized>(
    store: &S,
    id: &ContactId,
    update: &ContactUpdate,
) -> Result<ContactView> {
    let mut contact = store
        .contact_by_id(id)
        .await?
        .ok_or_else(|| CoverageError::not_found(format!("substitute contact {id}")))?;
    let subs = store.sub_assignments().await?;
    let assigned = holds_shifts(&subs, &contact.coverage_request_id, &contact.sub_id);
    let from = contact.contact_status();
    apply_contact_update(&mut contact, update, assigned, Utc::now())?;

    let staff = StaffDirectory::load(store).await?;
    let name = staff.name(&contact.sub_id);
    let saved = store
        .put_contact(contact)
        .await
        .map_err(|e| CoverageError::write(format!("failed to update contact for {name}"), e))?;
    info!(contact = %saved.id, ?from, to = ?saved.contact_status(), "contact status changed");
    Ok(saved.into())
}

/// Record which shifts a sub is picked for and which unavailable shifts the
/// director overrides. Replaces any earlier selection.
pub async fn save_shift_overrides<S: Store + ?Sized>(
    store: &S,
    req: &ShiftOverridesRequest,
) -> Result<ShiftOverridesResponse> {
    let request = request_by_id(store, &req.coverage_request_id).await?;
    let staff = StaffDirectory::load(store).await?;
    let sub = substitute(&staff, &req.sub_id)?;
    let existing = store.contact(&request.id, &sub.id).await?;
    let status = existing
        .as_ref()
        .map_or(ContactStatus::NotContacted, |c| c.contact_status());
    if status == ContactStatus::DeclinedAll {
        return Err(CoverageError::validation(format!(
            "{} declined all shifts; change the status before selecting shifts",
            sub.name
        )));
    }

    let request_keys: HashSet<ShiftKey> = request.shifts.iter().map(|s| s.shift_key()).collect();
    let unknown: Vec<String> = req
        .selected_shift_keys
        .iter()
        .chain(&req.override_shift_keys)
        .filter(|k| !request_keys.contains(*k))
        .map(|k| k.to_string())
        .collect();
    if !unknown.is_empty() {
        return Err(CoverageError::validation(format!(
            "shifts not part of this request: {}",
            unknown.join(", ")
        )));
    }

    let selected: HashSet<&ShiftKey> = req.selected_shift_keys.iter().collect();
    let overridden: HashSet<&ShiftKey> = req.override_shift_keys.iter().collect();
    let client_available: HashSet<&ShiftKey> = req.available_shift_keys.iter().collect();
    let client_unavailable: HashSet<&ShiftKey> = req.unavailable_shift_keys.iter().collect();

    let availability = Availability::load(store).await?;
    let mut overrides = Vec::new();
    let mut errors = Vec::new();
    for shift in sorted_shifts(&request) {
        let key = shift.shift_key();
        let reason = availability.reason(sub, &request.id, shift);
        if (reason.is_none() && client_unavailable.contains(&key))
            || (reason.is_some() && client_available.contains(&key))
        {
            warn!(sub = %sub.id, shift = %key, ?reason, "client availability disagrees with server");
        }

        let is_selected = selected.contains(&key);
        match reason {
            None if is_selected => overrides.push(ShiftOverride {
                coverage_request_shift_id: shift.id.clone(),
                selected: true,
                override_availability: false,
            }),
            None => {}
            Some(reason) if overridden.contains(&key) => {
                if reason.is_overridable() {
                    overrides.push(ShiftOverride {
                        coverage_request_shift_id: shift.id.clone(),
                        selected: is_selected,
                        override_availability: true,
                    });
                } else {
                    errors.push(format!("{key} cannot be overridden ({reason:?})"));
                }
            }
            Some(reason) if is_selected => {
                errors.push(format!("{key} is unavailable ({reason:?}) and not overridden"));
            }
            Some(_) => {}
        }
    }
    if status == ContactStatus::Confirmed
        && !overrides.iter().any(|o| o.selected)
        && !holds_shifts(&store.sub_assignments().await?, &request.id, &sub.id)
    {
        errors.push(format!(
            "{} is confirmed; keep at least one selected or assigned shift or change the status",
            sub.name
        ));
    }
    if !errors.is_empty() {
        return Err(CoverageError::validation(errors.join("; ")));
    }

    let mut contact = open_contact(store, existing, &request.id, sub).await?;
    contact.shift_overrides = overrides;
    let saved = store
        .put_contact(contact)
        .await
        .map_err(|e| CoverageError::write(format!("failed to save shift selection for {}", sub.name), e))?;
    Ok(ShiftOverridesResponse {
        selected_shift_ids: saved.selected_shift_ids().cloned().collect(),
        shift_overrides: saved.shift_overrides,
    })
}

/// Validates the whole selection before the first write.
pub async fn assign_sub_shifts<S: Store + ?Sized>(
    store: &S,
    req: &AssignSubShiftsRequest,
) -> Result<AssignSubShiftsResponse> {
    if req.selected_shift_ids.is_empty() {
        return Err(CoverageError::validation("select at least one shift to assign"));
    }
    let request = request_by_id(store, &req.coverage_request_id).await?;
    let staff = StaffDirectory::load(store).await?;
    let sub = substitute(&staff, &req.sub_id)?;
    let existing = store.contact(&request.id, &sub.id).await?;

    let status = existing
        .as_ref()
        .map_or(ContactStatus::NotContacted, |c| c.contact_status());
    if status == ContactStatus::DeclinedAll {
        return Err(CoverageError::validation(format!(
            "{} declined all shifts; change the status before assigning",
            sub.name
        )));
    }
    let mark_confirmed = match (status, req.confirmation) {
        (ContactStatus::Confirmed, _) => false,
        (_, Some(AssignConfirmation::MarkConfirmedAndAssign)) => true,
        (_, Some(AssignConfirmation::AssignWithoutConfirming)) => false,
        (_, None) => {
            return Err(CoverageError::validation(format!(
                "{} has not confirmed; assign without confirming or mark confirmed and assign",
                sub.name
            )))
        }
    };

    let shifts: HashMap<&CoverageShiftId, &CoverageRequestShift> =
        request.shifts.iter().map(|s| (&s.id, s)).collect();
    let overridden: HashSet<&CoverageShiftId> = existing
        .iter()
        .flat_map(|c| c.shift_overrides.iter())
        .filter(|o| o.override_availability)
        .map(|o| &o.coverage_request_shift_id)
        .collect();
    let availability = Availability::load(store).await?;
    let subs = store.sub_assignments().await?;

    let mut errors = Vec::new();
    let mut to_assign: Vec<&CoverageRequestShift> = Vec::new();
    let mut to_release: Vec<SubAssignment> = Vec::new();
    let mut seen = HashSet::new();
    for id in req.selected_shift_ids.iter().filter(|id| seen.insert(*id)) {
        let Some(shift) = shifts.get(id).copied() else {
            errors.push(format!("shift {id} is not part of this request"));
            continue;
        };
        let key = shift.shift_key();
        let holders: Vec<&SubAssignment> = subs
            .iter()
            .filter(|s| s.coverage_request_shift_id == shift.id)
            .collect();
        if holders.iter().any(|h| h.sub_id == sub.id) {
            continue;
        }
        match availability.reason(sub, &request.id, shift) {
            None => {}
            Some(r) if r.is_overridable() && overridden.contains(&shift.id) => {}
            Some(r) => {
                errors.push(format!("{} cannot cover {key} ({r:?})", sub.name));
                continue;
            }
        }
        if !holders.is_empty() {
            if !req.swap {
                let names: Vec<String> = holders.iter().map(|h| staff.name(&h.sub_id)).collect();
                errors.push(format!("{key} is held by {}; swap to reassign", names.join(", ")));
                continue;
            }
            to_release.extend(holders.into_iter().cloned());
        }
        to_assign.push(shift);
    }
    for id in &req.partial_shift_ids {
        if !req.selected_shift_ids.contains(id) {
            errors.push(format!("partial shift {id} is not selected"));
        }
    }
    if !errors.is_empty() {
        return Err(CoverageError::validation(errors.join("; ")));
    }

    let mut contact = open_contact(store, existing, &request.id, sub).await?;
    if mark_confirmed {
        contact.is_contacted = true;
        contact.contacted_at.get_or_insert(Utc::now());
        contact.response_status = ResponseStatus::Confirmed;
        store.put_contact(contact).await.map_err(|e| {
            CoverageError::write(format!("failed to confirm {}", sub.name), e)
        })?;
    }

    for old in &to_release {
        let old_name = staff.name(&old.sub_id);
        match store.delete_sub_assignment(&old.id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                return Err(CoverageError::write(
                    format!("failed to release shift from {old_name}"),
                    e,
                ))
            }
        }
    }

    let mut assigned_shifts = Vec::with_capacity(to_assign.len());
    for shift in to_assign {
        let created = store
            .create_sub_assignment(NewSubAssignment {
                coverage_request_id: request.id.clone(),
                coverage_request_shift_id: shift.id.clone(),
                sub_id: sub.id.clone(),
                is_partial: req.partial_shift_ids.contains(&shift.id),
            })
            .await
            .map_err(|e| {
                CoverageError::write(
                    format!("failed to assign {} to {}", shift.shift_key(), sub.name),
                    e,
                )
            })?;
        assigned_shifts.push(created);
    }

    info!(
        sub = %sub.id,
        request = %request.id,
        assigned = assigned_shifts.len(),
        swapped = to_release.len(),
        "substitute shifts assigned"
    );
    Ok(AssignSubShiftsResponse { assigned_shifts })
}

pub async fn unassign_shifts<S: Store + ?Sized>(
    store: &S,
    req: &UnassignShiftsRequest,
) -> Result<Ack> {
    let request = request_for_absence(store, &req.absence_id).await?;
    let held: Vec<SubAssignment> = store
        .sub_assignments()
        .await?
        .into_iter()
        .filter(|s| s.coverage_request_id == request.id && s.sub_id == req.sub_id)
        .collect();

    let targets: Vec<&SubAssignment> = match req.scope {
        UnassignScope::Single => {
            let shift_id = req.coverage_request_shift_id.as_ref().ok_or_else(|| {
                CoverageError::validation("single unassign needs coverage_request_shift_id")
            })?;
            let found: Vec<&SubAssignment> = held
                .iter()
                .filter(|s| s.coverage_request_shift_id == *shift_id)
                .collect();
            if found.is_empty() {
                return Err(CoverageError::not_found(format!(
                    "assignment of shift {shift_id} to {}",
                    req.sub_id
                )));
            }
            found
        }
        UnassignScope::AllForAbsence => held.iter().collect(),
    };

    let staff = StaffDirectory::load(store).await?;
    let name = staff.name(&req.sub_id);
    let mut removed = 0;
    for a in targets {
        match store.delete_sub_assignment(&a.id).await {
            Ok(()) => removed += 1,
            Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                return Err(CoverageError::write(
                    format!("failed to unassign {name} from shift {}", a.coverage_request_shift_id),
                    e,
                ))
            }
        }
    }
    info!(sub = %req.sub_id, absence = %req.absence_id, scope = ?req.scope, removed, "substitute shifts unassigned");
    Ok(Ack::with(removed))
}
