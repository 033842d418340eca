use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use staffing_core::{
    cells, conflict, coverage, flex, reconcile, saga::Saga, CellSession, CoverageError,
    FloaterWeighting, SessionConfig, Sessions, StaffDirectory, Store,
};
use store::{InMemStore, StoreSeed};
use types::*;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn member(id: &str, name: &str) -> StaffMember {
    StaffMember {
        id: StaffId::from(id),
        name: name.into(),
        qualifications: vec![],
        is_substitute: false,
        is_flex: false,
    }
}

fn row(id: &str, teacher: &str, room: &str, day: DayOfWeek, slot: &str, floater: bool) -> TeacherScheduleAssignment {
    TeacherScheduleAssignment {
        id: AssignmentId::from(id),
        teacher_id: StaffId::from(teacher),
        classroom_id: ClassroomId::from(room),
        day_of_week: day,
        time_slot_id: TimeSlotId::from(slot),
        is_floater: floater,
    }
}

fn seed() -> StoreSeed {
    let mut flo = member("f1", "Flo Flex");
    flo.is_flex = true;
    let mut sam = member("s1", "Sam Sub");
    sam.is_substitute = true;
    sam.qualifications = vec!["infant".into()];
    let mut sue = member("s2", "Sue Sub");
    sue.is_substitute = true;
    let mut sid = member("s3", "Sid Sub");
    sid.is_substitute = true;

    StoreSeed {
        staff: vec![
            member("t1", "Ada Park"),
            member("t2", "Ben Cruz"),
            member("t3", "Cy Diaz"),
            member("t4", "Dee Ellis"),
            flo,
            sam,
            sue,
            sid,
        ],
        classrooms: vec![
            Classroom { id: ClassroomId::from("x"), name: "Room X".into(), required_qualifications: vec![] },
            Classroom { id: ClassroomId::from("y"), name: "Room Y".into(), required_qualifications: vec![] },
            Classroom { id: ClassroomId::from("inf"), name: "Infants".into(), required_qualifications: vec!["infant".into()] },
        ],
        time_slots: vec![
            TimeSlot { id: TimeSlotId::from("pm"), code: "PM".into(), display_order: 2 },
            TimeSlot { id: TimeSlotId::from("am"), code: "AM".into(), display_order: 1 },
        ],
        class_groups: vec![ClassGroup {
            id: ClassGroupId::from("toddlers"),
            name: "Toddlers".into(),
            required_ratio: 5,
            preferred_ratio: Some(4),
            min_age: Some(2),
            max_age: Some(3),
            is_active: true,
        }],
        cells: vec![ScheduleCell {
            classroom_id: ClassroomId::from("x"),
            day_of_week: DayOfWeek::Mon,
            time_slot_id: TimeSlotId::from("am"),
            is_active: true,
            enrollment_for_staffing: Some(10),
            notes: None,
            class_group_ids: vec![ClassGroupId::from("toddlers")],
        }],
        teacher_schedules: vec![
            row("a1", "t1", "x", DayOfWeek::Mon, "am", true),
            row("a2", "t2", "x", DayOfWeek::Mon, "am", false),
            row("a3", "t3", "y", DayOfWeek::Mon, "am", false),
            row("a4", "s3", "y", DayOfWeek::Tue, "am", false),
        ],
        coverage_requests: vec![CoverageRequest {
            id: CoverageRequestId::from("cr1"),
            absence_id: AbsenceId::from("abs1"),
            teacher_id: StaffId::from("t2"),
            start_date: date(1),
            end_date: date(5),
            shifts: (1..=5)
                .map(|d| CoverageRequestShift {
                    id: CoverageShiftId(format!("sh{d}")),
                    date: date(d),
                    day_of_week: DayOfWeek::of(date(d)),
                    time_slot_id: TimeSlotId::from("am"),
                    classroom_id: ClassroomId::from("x"),
                })
                .collect(),
        }],
        unavailability: vec![SubUnavailability {
            staff_id: StaffId::from("s2"),
            date: date(4),
            time_slot_id: None,
        }],
        ..StoreSeed::default()
    }
}

fn x_mon_am() -> CellKey {
    CellKey::new(ClassroomId::from("x"), DayOfWeek::Mon, TimeSlotId::from("am"))
}

fn teacher(id: &str, floater: bool) -> DesiredTeacher {
    DesiredTeacher { teacher_id: StaffId::from(id), is_floater: floater }
}

fn save_request(teachers: Vec<DesiredTeacher>) -> SaveCellRequest {
    SaveCellRequest {
        classroom_id: ClassroomId::from("x"),
        day_of_week: DayOfWeek::Mon,
        time_slot_id: TimeSlotId::from("am"),
        apply_scope: ApplyScope::SingleCell,
        is_active: true,
        enrollment_for_staffing: Some(10),
        notes: None,
        class_group_ids: vec![ClassGroupId::from("toddlers")],
        teachers,
        resolutions: vec![],
    }
}

async fn roster_of(store: &InMemStore, key: &CellKey) -> Vec<(String, bool)> {
    let mut out: Vec<(String, bool)> = cells::roster(store, key)
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.teacher_id.0, a.is_floater))
        .collect();
    out.sort();
    out
}

fn shift_key(d: u32) -> ShiftKey {
    ShiftKey::new(date(d), TimeSlotId::from("am"))
}

#[tokio::test]
async fn save_reconciles_roster_and_reports_staffing() {
    let store = InMemStore::from_seed(seed());
    let outcome = cells::save_cells(
        &store,
        &save_request(vec![teacher("t2", false), teacher("t4", false)]),
        FloaterWeighting::Fixed,
    )
    .await
    .unwrap();

    let SaveOutcome::Saved { report, staffing } = outcome else {
        panic!("expected saved, got {outcome:?}");
    };
    assert!(report.steps.iter().all(|s| s.outcome == StepOutcome::Applied));
    assert_eq!(report.steps.len(), 3);
    assert_eq!(
        roster_of(&store, &x_mon_am()).await,
        vec![("t2".into(), false), ("t4".into(), false)]
    );

    let summary = staffing[0].summary.clone().unwrap();
    assert_eq!(summary.required, Some(2));
    assert_eq!(summary.preferred, Some(3));
    assert_eq!(summary.scheduled, 2.0);
    assert_eq!(summary.status, StaffingStatus::BelowPreferred);
    assert_eq!(summary.shortfall, Some(1.0));
}

#[tokio::test]
async fn active_cell_without_groups_is_rejected_before_writing() {
    let store = InMemStore::from_seed(seed());
    let mut req = save_request(vec![teacher("t2", false)]);
    req.class_group_ids.clear();
    let err = cells::save_cells(&store, &req, FloaterWeighting::Fixed).await.unwrap_err();
    assert!(matches!(err, CoverageError::Validation(_)));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn unresolved_conflicts_hold_the_whole_save() {
    let store = InMemStore::from_seed(seed());
    let req = save_request(vec![teacher("t2", false), teacher("t3", false)]);
    let outcome = cells::save_cells(&store, &req, FloaterWeighting::Fixed).await.unwrap();

    let SaveOutcome::ConflictsPending { conflicts } = outcome else {
        panic!("expected pending conflicts, got {outcome:?}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].teacher_name, "Cy Diaz");
    assert_eq!(conflicts[0].conflicting_classroom_id, ClassroomId::from("y"));
    assert_eq!(store.write_count(), 0);
}

async fn save_with_resolution(kind: ConflictResolutionKind) -> (InMemStore, SagaReport) {
    let store = InMemStore::from_seed(seed());
    let mut req = save_request(vec![teacher("t2", false), teacher("t3", false)]);
    req.resolutions = vec![ConflictResolution {
        teacher_id: StaffId::from("t3"),
        day_of_week: DayOfWeek::Mon,
        time_slot_id: TimeSlotId::from("am"),
        conflicting_assignment_id: AssignmentId::from("a3"),
        resolution: kind,
    }];
    let outcome = cells::save_cells(&store, &req, FloaterWeighting::Fixed).await.unwrap();
    let SaveOutcome::Saved { report, .. } = outcome else {
        panic!("expected saved, got {outcome:?}");
    };
    let resolves = report.steps.iter().filter(|s| s.label.starts_with("resolve")).count();
    assert_eq!(resolves, 1);
    (store, report)
}

#[tokio::test]
async fn remove_other_moves_the_teacher() {
    let (store, _) = save_with_resolution(ConflictResolutionKind::RemoveOther).await;
    assert_eq!(
        roster_of(&store, &x_mon_am()).await,
        vec![("t2".into(), false), ("t3".into(), false)]
    );
    let y = CellKey::new(ClassroomId::from("y"), DayOfWeek::Mon, TimeSlotId::from("am"));
    assert!(roster_of(&store, &y).await.is_empty());
}

#[tokio::test]
async fn mark_floater_keeps_both_rooms() {
    let (store, _) = save_with_resolution(ConflictResolutionKind::MarkFloater).await;
    assert_eq!(
        roster_of(&store, &x_mon_am()).await,
        vec![("t2".into(), false), ("t3".into(), true)]
    );
    let y = CellKey::new(ClassroomId::from("y"), DayOfWeek::Mon, TimeSlotId::from("am"));
    assert_eq!(roster_of(&store, &y).await, vec![("t3".into(), false)]);
}

#[tokio::test]
async fn cancel_drops_the_new_assignment() {
    let (store, _) = save_with_resolution(ConflictResolutionKind::Cancel).await;
    assert_eq!(roster_of(&store, &x_mon_am()).await, vec![("t2".into(), false)]);
    let y = CellKey::new(ClassroomId::from("y"), DayOfWeek::Mon, TimeSlotId::from("am"));
    assert_eq!(roster_of(&store, &y).await, vec![("t3".into(), false)]);
}

#[tokio::test]
async fn failed_write_reports_what_was_applied() {
    let store = InMemStore::from_seed(seed());
    store.fail_assignment_writes_for(StaffId::from("t4"));
    let outcome = cells::save_cells(
        &store,
        &save_request(vec![teacher("t2", false), teacher("t4", false)]),
        FloaterWeighting::Fixed,
    )
    .await
    .unwrap();

    let SaveOutcome::PartiallyApplied { report, error } = outcome else {
        panic!("expected partial failure, got {outcome:?}");
    };
    assert!(error.contains("failed to add Dee Ellis to x/mon/am"), "{error}");
    let outcomes: Vec<&StepOutcome> = report.steps.iter().map(|s| &s.outcome).collect();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], &StepOutcome::Applied);
    assert_eq!(outcomes[1], &StepOutcome::Applied);
    assert!(matches!(outcomes[2], StepOutcome::Failed { .. }));
    // the delete of Ada stays applied
    assert_eq!(roster_of(&store, &x_mon_am()).await, vec![("t2".into(), false)]);
}

#[tokio::test]
async fn racing_create_counts_as_done() {
    let store = InMemStore::from_seed(seed());
    let key = x_mon_am();
    let snapshot = cells::roster(&store, &key).await.unwrap();
    let plan = reconcile::plan_roster(
        &key,
        &[teacher("t1", true), teacher("t2", false), teacher("t4", false)],
        &snapshot,
    );
    store
        .create_assignment(plan.creations[0].clone())
        .await
        .unwrap();

    let staff = StaffDirectory::load(&store).await.unwrap();
    let mut saga = Saga::new();
    reconcile::apply_plan(&store, &plan, &staff, &mut saga).await.unwrap();
    let report = saga.into_report();
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].outcome, StepOutcome::AlreadyApplied);
    assert_eq!(roster_of(&store, &key).await.len(), 3);
}

#[tokio::test]
async fn same_slot_scope_fans_out_across_weekdays() {
    let store = InMemStore::from_seed(seed());
    let mut req = save_request(vec![teacher("t2", false)]);
    req.apply_scope = ApplyScope::SameSlotAllDays;
    let outcome = cells::save_cells(&store, &req, FloaterWeighting::Fixed).await.unwrap();
    let SaveOutcome::Saved { staffing, .. } = outcome else {
        panic!("expected saved, got {outcome:?}");
    };
    assert_eq!(staffing.len(), 5);
    for day in cells::SCHOOL_DAYS {
        let key = CellKey::new(ClassroomId::from("x"), day, TimeSlotId::from("am"));
        assert_eq!(roster_of(&store, &key).await, vec![("t2".into(), false)], "{key}");
        assert_eq!(cells::load_cell(&store, &key).await.unwrap().enrollment_for_staffing, Some(10));
    }
}

#[tokio::test]
async fn same_day_scope_follows_slot_order() {
    let store = InMemStore::from_seed(seed());
    let mut req = save_request(vec![]);
    req.apply_scope = ApplyScope::SameDayAllSlots;
    let keys = cells::target_cells(&store, &req).await.unwrap();
    let slots: Vec<&str> = keys.iter().map(|k| k.time_slot_id.0.as_str()).collect();
    assert_eq!(slots, ["am", "pm"]);
}

#[tokio::test]
async fn standalone_resolve_writes_once() {
    let store = InMemStore::from_seed(seed());
    let ack = conflict::resolve(
        &store,
        &ResolveConflictRequest {
            teacher_id: StaffId::from("t3"),
            day_of_week: DayOfWeek::Mon,
            time_slot_id: TimeSlotId::from("am"),
            resolution: ConflictResolutionKind::RemoveOther,
            target_classroom_id: ClassroomId::from("x"),
            conflicting_assignment_id: AssignmentId::from("a3"),
        },
    )
    .await
    .unwrap();
    assert!(ack.ok);
    assert_eq!(store.write_count(), 1);
    assert!(roster_of(&store, &x_mon_am()).await.contains(&("t3".into(), false)));
}

#[tokio::test]
async fn flex_assignment_lifecycle() {
    let store = InMemStore::from_seed(seed());
    let rooms = vec![ClassroomId::from("x"), ClassroomId::from("y")];
    let slots = vec![TimeSlotId::from("am")];
    let availability = flex::flex_availability(
        &store,
        &FlexAvailabilityRequest {
            start_date: date(1),
            end_date: date(14),
            time_slot_ids: slots.clone(),
            classroom_ids: rooms.clone(),
            day_filter: Some(DayFilter::SpecificWeekdays {
                weekdays: vec![DayOfWeek::Mon, DayOfWeek::Wed],
            }),
        },
        FloaterWeighting::Fixed,
    )
    .await
    .unwrap();
    assert_eq!(availability.staff.len(), 1);
    let keys = availability.staff[0].available_shift_keys.clone();
    assert_eq!(keys, vec![shift_key(1), shift_key(3), shift_key(8), shift_key(10)]);
    assert_eq!(availability.shift_metrics.len(), 8);
    assert_eq!(availability.day_options.len(), 7);

    let created = flex::create_flex_assignment(
        &store,
        &FlexAssignmentRequest {
            staff_id: StaffId::from("f1"),
            start_date: date(1),
            end_date: date(14),
            classroom_ids: rooms,
            time_slot_ids: slots.clone(),
            shifts: keys.clone(),
        },
        FloaterWeighting::Fixed,
    )
    .await
    .unwrap();
    assert_eq!(created.shift_count, 8);

    let again = flex::create_flex_assignment(
        &store,
        &FlexAssignmentRequest {
            staff_id: StaffId::from("f1"),
            start_date: date(1),
            end_date: date(14),
            classroom_ids: vec![ClassroomId::from("x")],
            time_slot_ids: slots,
            shifts: vec![shift_key(1)],
        },
        FloaterWeighting::Fixed,
    )
    .await
    .unwrap_err();
    assert!(again.to_string().contains("not available"), "{again}");

    let removed = flex::remove_flex_assignment(
        &store,
        &FlexRemoveRequest {
            event_id: created.event_id.clone(),
            scope: RemovalScope::Weekday,
            date: None,
            day_of_week: Some(DayOfWeek::Wed),
            classroom_id: None,
            time_slot_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(removed.removed_shifts, 4);
    assert!(!removed.event_deleted);

    let removed = flex::remove_flex_assignment(
        &store,
        &FlexRemoveRequest {
            event_id: created.event_id.clone(),
            scope: RemovalScope::AllShifts,
            date: None,
            day_of_week: None,
            classroom_id: None,
            time_slot_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(removed.removed_shifts, 4);
    assert!(removed.event_deleted);
    assert!(store.flex_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn flex_assignment_needs_shifts() {
    let store = InMemStore::from_seed(seed());
    let err = flex::create_flex_assignment(
        &store,
        &FlexAssignmentRequest {
            staff_id: StaffId::from("f1"),
            start_date: date(1),
            end_date: date(5),
            classroom_ids: vec![ClassroomId::from("x")],
            time_slot_ids: vec![TimeSlotId::from("am")],
            shifts: vec![],
        },
        FloaterWeighting::Fixed,
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "select at least one shift");
    assert_eq!(store.write_count(), 0);
}

fn assign(sub: &str, shifts: &[&str]) -> AssignSubShiftsRequest {
    AssignSubShiftsRequest {
        coverage_request_id: CoverageRequestId::from("cr1"),
        sub_id: StaffId::from(sub),
        selected_shift_ids: shifts.iter().map(|s| CoverageShiftId::from(*s)).collect(),
        partial_shift_ids: vec![],
        swap: false,
        confirmation: Some(AssignConfirmation::AssignWithoutConfirming),
    }
}

#[tokio::test]
async fn remaining_shifts_after_two_subs() {
    let store = InMemStore::from_seed(seed());
    coverage::assign_sub_shifts(&store, &assign("s1", &["sh1", "sh2"])).await.unwrap();
    coverage::assign_sub_shifts(&store, &assign("s2", &["sh3"])).await.unwrap();

    let remaining = coverage::assigned_shifts(&store, &AbsenceId::from("abs1")).await.unwrap();
    assert_eq!(remaining.remaining_shift_count, 2);
    assert_eq!(remaining.remaining_shift_keys, vec![shift_key(4), shift_key(5)]);

    let view = coverage::coverage_request(&store, &AbsenceId::from("abs1")).await.unwrap();
    assert_eq!(view.counters.total_shifts, 5);
    assert_eq!(view.counters.assigned_shifts, 3);
    assert_eq!(view.counters.uncovered_shifts, 2);
    assert_eq!(view.shift_details[0].assigned_subs[0].name, "Sam Sub");
}

#[tokio::test]
async fn assigning_before_confirmation_needs_a_choice() {
    let store = InMemStore::from_seed(seed());
    let mut req = assign("s1", &["sh1"]);
    req.confirmation = None;
    let err = coverage::assign_sub_shifts(&store, &req).await.unwrap_err();
    assert!(err.to_string().contains("has not confirmed"), "{err}");

    req.confirmation = Some(AssignConfirmation::MarkConfirmedAndAssign);
    coverage::assign_sub_shifts(&store, &req).await.unwrap();
    let contact = store
        .contact(&CoverageRequestId::from("cr1"), &StaffId::from("s1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contact.contact_status(), ContactStatus::Confirmed);
}

#[tokio::test]
async fn taking_a_held_shift_requires_swap() {
    let store = InMemStore::from_seed(seed());
    coverage::assign_sub_shifts(&store, &assign("s1", &["sh1"])).await.unwrap();

    let mut req = assign("s2", &["sh1"]);
    let err = coverage::assign_sub_shifts(&store, &req).await.unwrap_err();
    assert!(err.to_string().contains("held by Sam Sub"), "{err}");

    req.swap = true;
    let assigned = coverage::assign_sub_shifts(&store, &req).await.unwrap();
    assert_eq!(assigned.assigned_shifts.len(), 1);
    let holders: Vec<StaffId> = store
        .sub_assignments()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.sub_id)
        .collect();
    assert_eq!(holders, vec![StaffId::from("s2")]);
}

#[tokio::test]
async fn unassign_single_and_all() {
    let store = InMemStore::from_seed(seed());
    coverage::assign_sub_shifts(&store, &assign("s1", &["sh1", "sh2", "sh3"])).await.unwrap();

    let ack = coverage::unassign_shifts(
        &store,
        &UnassignShiftsRequest {
            absence_id: AbsenceId::from("abs1"),
            sub_id: StaffId::from("s1"),
            scope: UnassignScope::Single,
            coverage_request_shift_id: Some(CoverageShiftId::from("sh2")),
        },
    )
    .await
    .unwrap();
    assert_eq!(ack.affected, 1);

    let ack = coverage::unassign_shifts(
        &store,
        &UnassignShiftsRequest {
            absence_id: AbsenceId::from("abs1"),
            sub_id: StaffId::from("s1"),
            scope: UnassignScope::AllForAbsence,
            coverage_request_shift_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(ack.affected, 2);
    assert!(store.sub_assignments().await.unwrap().is_empty());
}

#[tokio::test]
async fn candidates_carry_reasons_in_order() {
    let store = InMemStore::from_seed(seed());
    coverage::assign_sub_shifts(&store, &assign("s1", &["sh1"])).await.unwrap();

    let candidates = coverage::candidates(&store, &AbsenceId::from("abs1")).await.unwrap();
    let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Sam Sub", "Sid Sub", "Sue Sub"]);
    assert_eq!(candidates[0].can_cover_count, 5);

    let sid = &candidates[1];
    assert_eq!(sid.can_cover_count, 4);
    assert_eq!(sid.shifts[1].reason, Some(UnavailableReason::ScheduleConflict));

    let sue = &candidates[2];
    assert_eq!(sue.shifts[3].reason, Some(UnavailableReason::Unavailable));
}

#[tokio::test]
async fn overrides_respect_reason_rules() {
    let store = InMemStore::from_seed(seed());
    let base = ShiftOverridesRequest {
        coverage_request_id: CoverageRequestId::from("cr1"),
        sub_id: StaffId::from("s2"),
        selected_shift_keys: vec![shift_key(1), shift_key(4)],
        override_shift_keys: vec![],
        available_shift_keys: vec![],
        unavailable_shift_keys: vec![],
    };
    let err = coverage::save_shift_overrides(&store, &base).await.unwrap_err();
    assert!(err.to_string().contains("not overridden"), "{err}");

    let mut req = base.clone();
    req.override_shift_keys = vec![shift_key(4)];
    let saved = coverage::save_shift_overrides(&store, &req).await.unwrap();
    assert_eq!(
        saved.selected_shift_ids,
        vec![CoverageShiftId::from("sh1"), CoverageShiftId::from("sh4")]
    );
    assert!(saved.shift_overrides[1].override_availability);

    // teaching elsewhere cannot be overridden
    let mut req = base;
    req.sub_id = StaffId::from("s3");
    req.selected_shift_keys = vec![shift_key(2)];
    req.override_shift_keys = vec![shift_key(2)];
    let err = coverage::save_shift_overrides(&store, &req).await.unwrap_err();
    assert!(err.to_string().contains("cannot be overridden"), "{err}");
}

#[tokio::test]
async fn contact_status_round_trip() {
    let store = InMemStore::from_seed(seed());
    let view = coverage::get_or_create_contact(&store, &CoverageRequestId::from("cr1"), &StaffId::from("s1"))
        .await
        .unwrap();
    assert_eq!(view.contact_status, ContactStatus::NotContacted);
    let id = view.contact.id.clone();

    let update = |status| ContactUpdate { contact_status: status, notes: None };
    let err = coverage::update_contact(&store, &id, &update(ContactStatus::Confirmed))
        .await
        .unwrap_err();
    assert!(matches!(err, CoverageError::Validation(_)));

    coverage::save_shift_overrides(
        &store,
        &ShiftOverridesRequest {
            coverage_request_id: CoverageRequestId::from("cr1"),
            sub_id: StaffId::from("s1"),
            selected_shift_keys: vec![shift_key(2)],
            override_shift_keys: vec![],
            available_shift_keys: vec![],
            unavailable_shift_keys: vec![],
        },
    )
    .await
    .unwrap();
    let confirmed = coverage::update_contact(&store, &id, &update(ContactStatus::Confirmed))
        .await
        .unwrap();
    assert_eq!(confirmed.contact_status, ContactStatus::Confirmed);
    assert!(confirmed.contact.contacted_at.is_some());

    let declined = coverage::update_contact(&store, &id, &update(ContactStatus::DeclinedAll))
        .await
        .unwrap();
    assert!(declined.contact.shift_overrides.is_empty());

    let again = coverage::get_or_create_contact(&store, &CoverageRequestId::from("cr1"), &StaffId::from("s1"))
        .await
        .unwrap();
    assert_eq!(again.contact.id, id);
    assert_eq!(again.contact_status, ContactStatus::DeclinedAll);
}

#[tokio::test]
async fn session_cache_invalidates_on_save_and_rides_out_lag() {
    let store = InMemStore::from_seed(seed());
    let session = CellSession::new(
        Arc::new(store.clone()),
        SessionConfig {
            settle_delay: Duration::from_millis(5),
            stale_window: Duration::from_secs(60),
            ..SessionConfig::default()
        },
        FloaterWeighting::Fixed,
    );
    let key = x_mon_am();

    let first = session.roster(&key).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.assignments.len(), 2);
    assert!(session.roster(&key).await.unwrap().from_cache);

    session
        .save(&save_request(vec![teacher("t2", false), teacher("t4", false)]))
        .await
        .unwrap();
    assert!(session.cache().get(&key).is_none());

    // the store has not caught up yet
    for a in cells::roster(&store, &key).await.unwrap() {
        store.delete_assignment(&a.id).await.unwrap();
    }
    let lagging = session.roster(&key).await.unwrap();
    assert!(lagging.stale);
    let mut names: Vec<&str> = lagging.assignments.iter().map(|a| a.teacher_id.0.as_str()).collect();
    names.sort();
    assert_eq!(names, ["t2", "t4"]);

    session.invalidate(&key);
    let settled = session.roster(&key).await.unwrap();
    assert!(!settled.stale);
    assert!(settled.assignments.is_empty());
}

#[tokio::test]
async fn demo_seed_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/seed.json");
    let store = InMemStore::from_json_file(path).unwrap();
    let rollup = staffing_core::staffing::load_rollup(&store, FloaterWeighting::Fixed)
        .await
        .unwrap();
    assert_eq!(rollup.below_required, 3);
    assert_eq!(rollup.exempt, 1);

    let candidates = coverage::candidates(&store, &AbsenceId::from("abs-1")).await.unwrap();
    assert_eq!(candidates[0].name, "Sam Ito");
    assert_eq!(candidates[0].can_cover_count, 2);
    assert_eq!(candidates[1].can_cover_count, 0);
}

#[tokio::test]
async fn mixed_resolutions_for_one_teacher_write_nothing() {
    let mut seed = seed();
    seed.teacher_schedules
        .push(row("a9", "t3", "inf", DayOfWeek::Mon, "am", false));
    let store = InMemStore::from_seed(seed);
    let resolution = |id: &str, kind| ConflictResolution {
        teacher_id: StaffId::from("t3"),
        day_of_week: DayOfWeek::Mon,
        time_slot_id: TimeSlotId::from("am"),
        conflicting_assignment_id: AssignmentId::from(id),
        resolution: kind,
    };
    let mut req = save_request(vec![teacher("t2", false), teacher("t3", false)]);
    req.resolutions = vec![
        resolution("a3", ConflictResolutionKind::RemoveOther),
        resolution("a9", ConflictResolutionKind::Cancel),
    ];

    let err = cells::save_cells(&store, &req, FloaterWeighting::Fixed).await.unwrap_err();
    assert!(matches!(err, CoverageError::Validation(_)), "{err}");
    assert!(err.to_string().contains("Cy Diaz has mixed resolutions"), "{err}");
    assert_eq!(store.write_count(), 0);
    assert_eq!(
        roster_of(&store, &x_mon_am()).await,
        vec![("t1".into(), true), ("t2".into(), false)]
    );
}

fn select(sub: &str, days: &[u32]) -> ShiftOverridesRequest {
    ShiftOverridesRequest {
        coverage_request_id: CoverageRequestId::from("cr1"),
        sub_id: StaffId::from(sub),
        selected_shift_keys: days.iter().map(|d| shift_key(*d)).collect(),
        override_shift_keys: vec![],
        available_shift_keys: vec![],
        unavailable_shift_keys: vec![],
    }
}

#[tokio::test]
async fn confirmed_contact_keeps_a_shift() {
    let store = InMemStore::from_seed(seed());
    coverage::save_shift_overrides(&store, &select("s1", &[2])).await.unwrap();
    let contact = store
        .contact(&CoverageRequestId::from("cr1"), &StaffId::from("s1"))
        .await
        .unwrap()
        .unwrap();
    coverage::update_contact(
        &store,
        &contact.id,
        &ContactUpdate { contact_status: ContactStatus::Confirmed, notes: None },
    )
    .await
    .unwrap();

    let err = coverage::save_shift_overrides(&store, &select("s1", &[])).await.unwrap_err();
    assert!(matches!(err, CoverageError::Validation(_)));
    assert!(err.to_string().contains("Sam Sub is confirmed"), "{err}");
    let kept = store.contact_by_id(&contact.id).await.unwrap().unwrap();
    assert_eq!(kept.selected_shift_ids().count(), 1);

    // an assigned shift satisfies the rule on its own
    coverage::assign_sub_shifts(&store, &assign("s1", &["sh2"])).await.unwrap();
    let saved = coverage::save_shift_overrides(&store, &select("s1", &[])).await.unwrap();
    assert!(saved.selected_shift_ids.is_empty());
}

#[tokio::test]
async fn rejected_requests_leave_no_contact_behind() {
    let store = InMemStore::from_seed(seed());
    let request = CoverageRequestId::from("cr1");
    let sue = StaffId::from("s2");

    let err = coverage::save_shift_overrides(&store, &select("s2", &[4])).await.unwrap_err();
    assert!(err.to_string().contains("not overridden"), "{err}");

    let mut req = assign("s2", &["sh4"]);
    req.confirmation = Some(AssignConfirmation::MarkConfirmedAndAssign);
    let err = coverage::assign_sub_shifts(&store, &req).await.unwrap_err();
    assert!(err.to_string().contains("cannot cover"), "{err}");

    assert!(store.contact(&request, &sue).await.unwrap().is_none());
    assert_eq!(store.write_count(), 0);
}

fn sessions(store: &InMemStore, idle_ttl: Duration) -> Sessions<InMemStore> {
    Sessions::new(
        Arc::new(store.clone()),
        SessionConfig {
            settle_delay: Duration::ZERO,
            idle_ttl,
            ..SessionConfig::default()
        },
        FloaterWeighting::Fixed,
    )
}

#[tokio::test]
async fn writes_from_anywhere_drop_cached_rosters() {
    let store = InMemStore::from_seed(seed());
    let sessions = sessions(&store, Duration::from_secs(60));
    let reader = sessions.get(&sessions.open()).unwrap();
    let writer = sessions.get(&sessions.open()).unwrap();
    let key = x_mon_am();

    reader.roster(&key).await.unwrap();
    assert!(reader.roster(&key).await.unwrap().from_cache);

    // plain save, outside any session
    cells::save_cells(&store, &save_request(vec![teacher("t4", false)]), FloaterWeighting::Fixed)
        .await
        .unwrap();
    let fresh = reader.roster(&key).await.unwrap();
    assert!(!fresh.from_cache);
    let names: Vec<&str> = fresh.assignments.iter().map(|a| a.teacher_id.0.as_str()).collect();
    assert_eq!(names, ["t4"]);
    assert!(reader.roster(&key).await.unwrap().from_cache);

    // save through another session
    writer
        .save(&save_request(vec![teacher("t2", false)]))
        .await
        .unwrap();
    let fresh = reader.roster(&key).await.unwrap();
    assert!(!fresh.from_cache);
    assert_eq!(fresh.assignments[0].teacher_id, StaffId::from("t2"));

    // teacher-schedule crud
    reconcile::set_floater(&store, &fresh.assignments[0].id, true).await.unwrap();
    let fresh = reader.roster(&key).await.unwrap();
    assert!(!fresh.from_cache);
    assert!(fresh.assignments[0].is_floater);
}

#[tokio::test]
async fn idle_sessions_expire() {
    let store = InMemStore::from_seed(seed());
    let sessions = sessions(&store, Duration::from_millis(300));
    let idle = sessions.open();
    let busy = sessions.open();
    assert_eq!(sessions.len(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(sessions.get(&busy).is_some());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(sessions.get(&idle).is_none());
    assert!(sessions.get(&busy).is_some());
    assert_eq!(sessions.len(), 1);
}
