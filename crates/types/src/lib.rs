use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Clone,
            Debug,
            Serialize,
            Deserialize,
            ToSchema,
            JsonSchema,
            Eq,
            PartialEq,
            Hash,
            PartialOrd,
            Ord,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}
id_newtype!(StaffId);
id_newtype!(ClassroomId);
id_newtype!(ClassGroupId);
id_newtype!(TimeSlotId);
id_newtype!(AssignmentId);
id_newtype!(FlexEventId);
id_newtype!(AbsenceId);
id_newtype!(CoverageRequestId);
id_newtype!(CoverageShiftId);
id_newtype!(ContactId);
id_newtype!(SubAssignmentId);
id_newtype!(SessionId);

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
        DayOfWeek::Sat,
        DayOfWeek::Sun,
    ];

    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Mon => "mon",
            DayOfWeek::Tue => "tue",
            DayOfWeek::Wed => "wed",
            DayOfWeek::Thu => "thu",
            DayOfWeek::Fri => "fri",
            DayOfWeek::Sat => "sat",
            DayOfWeek::Sun => "sun",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(w: Weekday) -> Self {
        match w {
            Weekday::Mon => DayOfWeek::Mon,
            Weekday::Tue => DayOfWeek::Tue,
            Weekday::Wed => DayOfWeek::Wed,
            Weekday::Thu => DayOfWeek::Thu,
            Weekday::Fri => DayOfWeek::Fri,
            Weekday::Sat => DayOfWeek::Sat,
            Weekday::Sun => DayOfWeek::Sun,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayOfWeek::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown day of week: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    #[serde(default)]
    pub qualifications: Vec<String>,
    #[serde(default)]
    pub is_substitute: bool,
    #[serde(default)]
    pub is_flex: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct Classroom {
    pub id: ClassroomId,
    pub name: String,
    #[serde(default)]
    pub required_qualifications: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct TimeSlot {
    pub id: TimeSlotId,
    pub code: String,
    #[serde(default)]
    pub display_order: u32,
}

fn default_true() -> bool {
    true
}

/// Children-per-teacher ratios for an age band.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ClassGroup {
    pub id: ClassGroupId,
    pub name: String,
    pub required_ratio: u32,
    #[serde(default)]
    pub preferred_ratio: Option<u32>,
    #[serde(default)]
    pub min_age: Option<u32>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Weekly schedule
// ---------------------------------------------------------------------------

#[derive(
    Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
)]
pub struct CellKey {
    pub classroom_id: ClassroomId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
}

impl CellKey {
    pub fn new(classroom_id: ClassroomId, day_of_week: DayOfWeek, time_slot_id: TimeSlotId) -> Self {
        Self {
            classroom_id,
            day_of_week,
            time_slot_id,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.classroom_id, self.day_of_week, self.time_slot_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ScheduleCell {
    pub classroom_id: ClassroomId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub enrollment_for_staffing: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub class_group_ids: Vec<ClassGroupId>,
}

impl ScheduleCell {
    pub fn key(&self) -> CellKey {
        CellKey::new(
            self.classroom_id.clone(),
            self.day_of_week,
            self.time_slot_id.clone(),
        )
    }

    /// An unsaved cell: active, no enrollment, no groups.
    pub fn empty(key: &CellKey) -> Self {
        Self {
            classroom_id: key.classroom_id.clone(),
            day_of_week: key.day_of_week,
            time_slot_id: key.time_slot_id.clone(),
            is_active: true,
            enrollment_for_staffing: None,
            notes: None,
            class_group_ids: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq, Eq)]
pub struct TeacherScheduleAssignment {
    pub id: AssignmentId,
    pub teacher_id: StaffId,
    pub classroom_id: ClassroomId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    #[serde(default)]
    pub is_floater: bool,
}

impl TeacherScheduleAssignment {
    pub fn key(&self) -> CellKey {
        CellKey::new(
            self.classroom_id.clone(),
            self.day_of_week,
            self.time_slot_id.clone(),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct NewAssignment {
    pub teacher_id: StaffId,
    pub classroom_id: ClassroomId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    #[serde(default)]
    pub is_floater: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FloaterUpdate {
    pub is_floater: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct AssignmentFilter {
    #[serde(default)]
    pub teacher_id: Option<StaffId>,
    #[serde(default)]
    pub classroom_id: Option<ClassroomId>,
    #[serde(default)]
    pub day_of_week: Option<DayOfWeek>,
    #[serde(default)]
    pub time_slot_id: Option<TimeSlotId>,
}

impl AssignmentFilter {
    pub fn cell(key: &CellKey) -> Self {
        Self {
            teacher_id: None,
            classroom_id: Some(key.classroom_id.clone()),
            day_of_week: Some(key.day_of_week),
            time_slot_id: Some(key.time_slot_id.clone()),
        }
    }

    pub fn matches(&self, a: &TeacherScheduleAssignment) -> bool {
        self.teacher_id.as_ref().map_or(true, |t| *t == a.teacher_id)
            && self.classroom_id.as_ref().map_or(true, |c| *c == a.classroom_id)
            && self.day_of_week.map_or(true, |d| d == a.day_of_week)
            && self.time_slot_id.as_ref().map_or(true, |s| *s == a.time_slot_id)
    }
}

/// A cell roster as served through an edit session.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct RosterView {
    pub assignments: Vec<TeacherScheduleAssignment>,
    pub from_cache: bool,
    /// The store returned nothing right after a save; this is the roster
    /// the save was projected to leave instead.
    pub stale: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SessionOpened {
    pub session_id: SessionId,
}

// ---------------------------------------------------------------------------
// Staffing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffingStatus {
    BelowRequired,
    BelowPreferred,
    Adequate,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct StaffingSummary {
    pub required: Option<u32>,
    pub preferred: Option<u32>,
    pub scheduled: f64,
    pub status: StaffingStatus,
    pub shortfall: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct CellStaffing {
    pub classroom_id: ClassroomId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    pub is_active: bool,
    /// `None` for inactive cells, which are exempt.
    pub summary: Option<StaffingSummary>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct StaffingRollup {
    pub cells: Vec<CellStaffing>,
    pub below_required: usize,
    pub below_preferred: usize,
    pub adequate: usize,
    pub exempt: usize,
}

// ---------------------------------------------------------------------------
// Cell saves and conflicts
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ApplyScope {
    #[default]
    SingleCell,
    SameSlotAllDays,
    SameDayAllSlots,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
pub struct DesiredTeacher {
    pub teacher_id: StaffId,
    #[serde(default)]
    pub is_floater: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolutionKind {
    RemoveOther,
    Cancel,
    MarkFloater,
}

/// A teacher who would be in two classrooms during the same day/slot.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct Conflict {
    pub teacher_id: StaffId,
    pub teacher_name: String,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    pub target_classroom_id: ClassroomId,
    pub conflicting_classroom_id: ClassroomId,
    pub conflicting_assignment_id: AssignmentId,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct ConflictResolution {
    pub teacher_id: StaffId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    pub conflicting_assignment_id: AssignmentId,
    pub resolution: ConflictResolutionKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct ResolveConflictRequest {
    pub teacher_id: StaffId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    pub resolution: ConflictResolutionKind,
    pub target_classroom_id: ClassroomId,
    pub conflicting_assignment_id: AssignmentId,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SaveCellRequest {
    pub classroom_id: ClassroomId,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    #[serde(default)]
    pub apply_scope: ApplyScope,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub enrollment_for_staffing: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub class_group_ids: Vec<ClassGroupId>,
    #[serde(default)]
    pub teachers: Vec<DesiredTeacher>,
    #[serde(default)]
    pub resolutions: Vec<ConflictResolution>,
}

impl SaveCellRequest {
    pub fn anchor(&self) -> CellKey {
        CellKey::new(
            self.classroom_id.clone(),
            self.day_of_week,
            self.time_slot_id.clone(),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    AlreadyApplied,
    Failed { message: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct SagaStep {
    pub label: String,
    pub outcome: StepOutcome,
}

/// Ordered log of the writes a batch issued.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct SagaReport {
    pub steps: Vec<SagaStep>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    ConflictsPending {
        conflicts: Vec<Conflict>,
    },
    Saved {
        report: SagaReport,
        staffing: Vec<CellStaffing>,
    },
    PartiallyApplied {
        report: SagaReport,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Dated shifts
// ---------------------------------------------------------------------------

/// A date plus time slot, rendered on the wire as `YYYY-MM-DD|slot`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShiftKey {
    pub date: NaiveDate,
    pub time_slot_id: TimeSlotId,
}

impl ShiftKey {
    pub fn new(date: NaiveDate, time_slot_id: TimeSlotId) -> Self {
        Self { date, time_slot_id }
    }

    pub fn day_of_week(&self) -> DayOfWeek {
        DayOfWeek::of(self.date)
    }
}

impl fmt::Display for ShiftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.date.format("%Y-%m-%d"), self.time_slot_id)
    }
}

impl FromStr for ShiftKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, slot) = s
            .split_once('|')
            .ok_or_else(|| format!("shift key has invalid format: {s}"))?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| format!("shift key has invalid date {date}: {e}"))?;
        if slot.is_empty() {
            return Err(format!("shift key has empty time slot: {s}"));
        }
        Ok(Self::new(date, TimeSlotId(slot.to_string())))
    }
}

impl TryFrom<String> for ShiftKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ShiftKey> for String {
    fn from(k: ShiftKey) -> Self {
        k.to_string()
    }
}

impl JsonSchema for ShiftKey {
    fn schema_name() -> String {
        "ShiftKey".into()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl<'s> ToSchema<'s> for ShiftKey {
    fn schema() -> (
        &'s str,
        utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
    ) {
        use utoipa::openapi::{ObjectBuilder, RefOr, Schema, SchemaType};
        (
            "ShiftKey",
            RefOr::T(Schema::Object(
                ObjectBuilder::new().schema_type(SchemaType::String).build(),
            )),
        )
    }
}

// ---------------------------------------------------------------------------
// Flex staffing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DayFilter {
    /// Only dates sharing the start date's weekday.
    ThisDayOnly,
    SpecificWeekdays { weekdays: Vec<DayOfWeek> },
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
pub struct FlexShift {
    pub date: NaiveDate,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    pub classroom_id: ClassroomId,
}

impl FlexShift {
    pub fn shift_key(&self) -> ShiftKey {
        ShiftKey::new(self.date, self.time_slot_id.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FlexStaffingEvent {
    pub id: FlexEventId,
    pub staff_id: StaffId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub classroom_ids: Vec<ClassroomId>,
    pub time_slot_ids: Vec<TimeSlotId>,
    pub shifts: Vec<FlexShift>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FlexAvailabilityRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub time_slot_ids: Vec<TimeSlotId>,
    pub classroom_ids: Vec<ClassroomId>,
    #[serde(default)]
    pub day_filter: Option<DayFilter>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct StaffAvailability {
    pub id: StaffId,
    pub name: String,
    pub available_shift_keys: Vec<ShiftKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct ShiftMetric {
    pub date: NaiveDate,
    pub time_slot_id: TimeSlotId,
    pub classroom_id: ClassroomId,
    pub required: Option<u32>,
    pub preferred: Option<u32>,
    pub scheduled: f64,
    pub status: StaffingStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FlexAvailabilityResponse {
    pub staff: Vec<StaffAvailability>,
    pub shift_metrics: Vec<ShiftMetric>,
    pub day_options: Vec<DayOfWeek>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FlexAssignmentRequest {
    pub staff_id: StaffId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub classroom_ids: Vec<ClassroomId>,
    pub time_slot_ids: Vec<TimeSlotId>,
    pub shifts: Vec<ShiftKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FlexAssignmentCreated {
    pub event_id: FlexEventId,
    pub shift_count: usize,
    pub below_required: usize,
    pub below_preferred: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalScope {
    SingleShift,
    Weekday,
    AllShifts,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FlexRemoveRequest {
    pub event_id: FlexEventId,
    pub scope: RemovalScope,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub day_of_week: Option<DayOfWeek>,
    #[serde(default)]
    pub classroom_id: Option<ClassroomId>,
    #[serde(default)]
    pub time_slot_id: Option<TimeSlotId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct FlexRemoved {
    pub removed_shifts: usize,
    pub event_deleted: bool,
    pub applied_scope: RemovalScope,
}

// ---------------------------------------------------------------------------
// Substitute coverage
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Uncovered,
    PartiallyCovered,
    FullyCovered,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct CoverageRequestShift {
    pub id: CoverageShiftId,
    pub date: NaiveDate,
    pub day_of_week: DayOfWeek,
    pub time_slot_id: TimeSlotId,
    pub classroom_id: ClassroomId,
}

impl CoverageRequestShift {
    pub fn shift_key(&self) -> ShiftKey {
        ShiftKey::new(self.date, self.time_slot_id.clone())
    }
}

/// An absence and the dated shifts it leaves open.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct CoverageRequest {
    pub id: CoverageRequestId,
    pub absence_id: AbsenceId,
    pub teacher_id: StaffId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub shifts: Vec<CoverageRequestShift>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq)]
pub struct SubAssignment {
    pub id: SubAssignmentId,
    pub coverage_request_id: CoverageRequestId,
    pub coverage_request_shift_id: CoverageShiftId,
    pub sub_id: StaffId,
    #[serde(default)]
    pub is_partial: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SubUnavailability {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    /// `None` blocks the whole day.
    #[serde(default)]
    pub time_slot_id: Option<TimeSlotId>,
}

impl SubUnavailability {
    pub fn blocks(&self, staff_id: &StaffId, date: NaiveDate, time_slot_id: &TimeSlotId) -> bool {
        self.staff_id == *staff_id
            && self.date == date
            && self.time_slot_id.as_ref().map_or(true, |s| s == time_slot_id)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct CoverageCounters {
    pub total_shifts: usize,
    pub uncovered_shifts: usize,
    pub assigned_shifts: usize,
    pub partial_shifts: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct AssignedSub {
    pub sub_id: StaffId,
    pub name: String,
    pub is_partial: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ShiftDetail {
    pub shift: CoverageRequestShift,
    pub status: CoverageStatus,
    pub assigned_subs: Vec<AssignedSub>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct CoverageRequestView {
    pub coverage_request_id: CoverageRequestId,
    pub absence_id: AbsenceId,
    pub teacher_id: StaffId,
    pub shift_details: Vec<ShiftDetail>,
    pub counters: CoverageCounters,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct RemainingShifts {
    pub remaining_shift_keys: Vec<ShiftKey>,
    pub remaining_shift_count: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    None,
    Pending,
    Confirmed,
    DeclinedAll,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    NotContacted,
    Pending,
    Confirmed,
    DeclinedAll,
}

impl ContactStatus {
    /// Collapses the stored contact fields into the single displayed state.
    pub fn project(is_contacted: bool, response: ResponseStatus) -> Self {
        match response {
            ResponseStatus::Confirmed => ContactStatus::Confirmed,
            ResponseStatus::DeclinedAll => ContactStatus::DeclinedAll,
            ResponseStatus::Pending => ContactStatus::Pending,
            ResponseStatus::None if is_contacted => ContactStatus::Pending,
            ResponseStatus::None => ContactStatus::NotContacted,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct ShiftOverride {
    pub coverage_request_shift_id: CoverageShiftId,
    pub selected: bool,
    pub override_availability: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SubstituteContact {
    pub id: ContactId,
    pub coverage_request_id: CoverageRequestId,
    pub sub_id: StaffId,
    #[serde(default)]
    pub is_contacted: bool,
    #[serde(default)]
    pub response_status: ResponseStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub contacted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shift_overrides: Vec<ShiftOverride>,
}

impl SubstituteContact {
    pub fn contact_status(&self) -> ContactStatus {
        ContactStatus::project(self.is_contacted, self.response_status)
    }

    pub fn selected_shift_ids(&self) -> impl Iterator<Item = &CoverageShiftId> {
        self.shift_overrides
            .iter()
            .filter(|o| o.selected)
            .map(|o| &o.coverage_request_shift_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ContactView {
    pub contact: SubstituteContact,
    pub contact_status: ContactStatus,
}

impl From<SubstituteContact> for ContactView {
    fn from(contact: SubstituteContact) -> Self {
        let contact_status = contact.contact_status();
        Self {
            contact,
            contact_status,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ContactUpdate {
    pub contact_status: ContactStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    ScheduleConflict,
    SubConflict,
    Unavailable,
    QualificationMismatch,
}

impl UnavailableReason {
    pub fn is_overridable(&self) -> bool {
        matches!(
            self,
            UnavailableReason::Unavailable | UnavailableReason::QualificationMismatch
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
pub struct ShiftAvailability {
    pub coverage_request_shift_id: CoverageShiftId,
    pub shift_key: ShiftKey,
    pub can_cover: bool,
    pub reason: Option<UnavailableReason>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct SubCandidate {
    pub sub_id: StaffId,
    pub name: String,
    pub can_cover_count: usize,
    pub contact_status: ContactStatus,
    pub shifts: Vec<ShiftAvailability>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ShiftOverridesRequest {
    pub coverage_request_id: CoverageRequestId,
    pub sub_id: StaffId,
    #[serde(default)]
    pub selected_shift_keys: Vec<ShiftKey>,
    #[serde(default)]
    pub override_shift_keys: Vec<ShiftKey>,
    #[serde(default)]
    pub available_shift_keys: Vec<ShiftKey>,
    #[serde(default)]
    pub unavailable_shift_keys: Vec<ShiftKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ShiftOverridesResponse {
    pub shift_overrides: Vec<ShiftOverride>,
    pub selected_shift_ids: Vec<CoverageShiftId>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AssignConfirmation {
    AssignWithoutConfirming,
    MarkConfirmedAndAssign,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct AssignSubShiftsRequest {
    pub coverage_request_id: CoverageRequestId,
    pub sub_id: StaffId,
    pub selected_shift_ids: Vec<CoverageShiftId>,
    #[serde(default)]
    pub partial_shift_ids: Vec<CoverageShiftId>,
    /// Take shifts currently held by another substitute.
    #[serde(default)]
    pub swap: bool,
    #[serde(default)]
    pub confirmation: Option<AssignConfirmation>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct AssignSubShiftsResponse {
    pub assigned_shifts: Vec<SubAssignment>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UnassignScope {
    Single,
    AllForAbsence,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct UnassignShiftsRequest {
    pub absence_id: AbsenceId,
    pub sub_id: StaffId,
    pub scope: UnassignScope,
    #[serde(default)]
    pub coverage_request_shift_id: Option<CoverageShiftId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct Ack {
    pub ok: bool,
    #[serde(default)]
    pub affected: usize,
}

impl Ack {
    pub fn with(affected: usize) -> Self {
        Self { ok: true, affected }
    }
}
