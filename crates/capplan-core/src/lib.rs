//! # capplan-core
//!
//! Core domain model and store interfaces for the capplan production scheduler.
//!
//! This crate provides:
//! - Domain types: `Calendar`, `CalendarDay`, `ShiftTemplate`, `Machine`, `Labor`,
//!   `Operation`, `ScheduleEntry`
//! - Store traits: `AvailabilityStore`, `OperationStore`, `ScheduleWriter`, `CalendarWriter`
//! - Error types: `StoreError`, `ScheduleError`
//! - `MemoryStore`, an in-memory implementation of every store trait
//!
//! ## Example
//!
//! ```rust
//! use capplan_core::{Machine, MemoryStore, ShiftTemplate};
//! use chrono::NaiveTime;
//!
//! let mut store = MemoryStore::new();
//! let calendar = store.add_calendar("Default Machine");
//! store.add_shift_template(ShiftTemplate::new(
//!     0,
//!     "Day Shift",
//!     NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
//!     NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
//! ));
//! store.add_machine(Machine::new(1, "CNC-01", calendar));
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a work calendar
pub type CalendarId = u64;

/// Unique identifier for a calendar day
pub type CalendarDayId = u64;

/// Unique identifier for a shift template
pub type ShiftTemplateId = u64;

/// Unique identifier for a shift assigned to a calendar day
pub type CalendarShiftId = u64;

/// Unique identifier for a labor resource
pub type LaborId = u64;

/// Unique identifier for a machine resource
pub type MachineId = u64;

/// Unique identifier for a work center
pub type WorkCenterId = u64;

/// Unique identifier for a routing task
pub type TaskId = u64;

/// Unique identifier for a production order
pub type ProductionOrderId = u64;

/// Unique identifier for a production order operation
pub type OperationId = u64;

/// Unique identifier for a purchase order line
pub type PurchaseOrderLineId = u64;

/// Unique identifier for a committed schedule row
pub type ScheduleEntryId = u64;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Convert fractional hours into a time delta (millisecond resolution)
pub fn hours_to_delta(hours: f64) -> TimeDelta {
    TimeDelta::milliseconds((hours * MILLIS_PER_HOUR).round() as i64)
}

/// Convert a time delta into fractional hours
pub fn delta_to_hours(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / MILLIS_PER_HOUR
}

// ============================================================================
// Time Windows
// ============================================================================

/// Half-open interval `[start, end)` of plant-local time
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub const fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// A window is empty when it has no positive length
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn hours(&self) -> f64 {
        delta_to_hours(self.duration())
    }

    /// Whether `other` lies entirely inside this window
    pub fn encloses(&self, other: &TimeWindow) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Whether two windows share any time
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

// ============================================================================
// Calendar
// ============================================================================

/// Named work calendar owned by machines and labor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: CalendarId,
    pub name: String,
}

/// A date on a calendar, working or not
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub id: CalendarDayId,
    pub calendar: CalendarId,
    pub date: NaiveDate,
    pub is_working_day: bool,
    #[serde(default)]
    pub note: String,
}

/// Named shift pattern (time-of-day only)
///
/// A template whose `end_time` is not after its `start_time` is an overnight
/// shift: it runs into the following calendar date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: ShiftTemplateId,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ShiftTemplate {
    pub fn new(
        id: ShiftTemplateId,
        name: impl Into<String>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            start_time,
            end_time,
        }
    }

    pub fn is_overnight(&self) -> bool {
        self.end_time <= self.start_time
    }

    /// Absolute window of this shift when worked on `date`
    pub fn window_on(&self, date: NaiveDate) -> TimeWindow {
        let end_date = if self.is_overnight() {
            date.succ_opt().unwrap_or(date)
        } else {
            date
        };
        TimeWindow::new(date.and_time(self.start_time), end_date.and_time(self.end_time))
    }

    /// Length of one occurrence of the shift in hours
    pub fn hours(&self) -> f64 {
        self.window_on(NaiveDate::default()).hours()
    }
}

/// A shift template worked on a specific calendar day
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarShift {
    pub id: CalendarShiftId,
    pub calendar_day: CalendarDayId,
    pub shift_template: ShiftTemplateId,
    /// Labor permitted to work this shift; empty means open to all
    #[serde(default)]
    pub labors: Vec<LaborId>,
}

impl CalendarShift {
    pub fn permits(&self, labor: LaborId) -> bool {
        self.labors.is_empty() || self.labors.contains(&labor)
    }
}

// ============================================================================
// Resources
// ============================================================================

/// A bookable resource, machine or labor
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKey {
    Machine(MachineId),
    Labor(LaborId),
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKey::Machine(id) => write!(f, "machine #{}", id),
            ResourceKey::Labor(id) => write!(f, "labor #{}", id),
        }
    }
}

/// A pool of labor resources
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCenter {
    pub id: WorkCenterId,
    pub code: String,
    #[serde(default)]
    pub name: String,
}

impl WorkCenter {
    pub fn new(id: WorkCenterId, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id,
            name: code.clone(),
            code,
        }
    }
}

/// A person who can be booked on operations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labor {
    pub id: LaborId,
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub workcenter: Option<WorkCenterId>,
    pub calendar: CalendarId,
}

impl Labor {
    pub fn new(id: LaborId, code: impl Into<String>, calendar: CalendarId) -> Self {
        let code = code.into();
        Self {
            id,
            name: code.clone(),
            code,
            workcenter: None,
            calendar,
        }
    }

    /// Attach the laborer to a work center pool
    pub fn in_workcenter(mut self, workcenter: WorkCenterId) -> Self {
        self.workcenter = Some(workcenter);
        self
    }
}

/// Equipment that can be booked on operations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub calendar: CalendarId,
}

impl Machine {
    pub fn new(id: MachineId, code: impl Into<String>, calendar: CalendarId) -> Self {
        let code = code.into();
        Self {
            id,
            name: code.clone(),
            code,
            calendar,
        }
    }
}

/// Time off for a labor resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaborVacation {
    pub labor: LaborId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Only approved vacations block availability
    #[serde(default = "default_true")]
    pub approved: bool,
}

fn default_true() -> bool {
    true
}

impl LaborVacation {
    pub fn new(labor: LaborId, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            labor,
            start,
            end,
            approved: true,
        }
    }

    /// Whole-day vacation covering `first..=last`
    pub fn for_dates(labor: LaborId, first: NaiveDate, last: NaiveDate) -> Self {
        let end = last.succ_opt().unwrap_or(last);
        Self::new(labor, first.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN))
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

/// Planned or unplanned machine outage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDowntime {
    pub machine: MachineId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub description: String,
}

impl MachineDowntime {
    pub fn new(
        machine: MachineId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        description: impl Into<String>,
    ) -> Self {
        Self {
            machine,
            start,
            end,
            description: description.into(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

// ============================================================================
// Production
// ============================================================================

/// Routing step: which machines can perform the work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub primary_machine: Option<MachineId>,
    #[serde(default)]
    pub alternate_machines: Vec<MachineId>,
}

impl Task {
    pub fn new(id: TaskId, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id,
            name: code.clone(),
            code,
            primary_machine: None,
            alternate_machines: Vec::new(),
        }
    }

    pub fn primary(mut self, machine: MachineId) -> Self {
        self.primary_machine = Some(machine);
        self
    }

    pub fn alternate(mut self, machine: MachineId) -> Self {
        self.alternate_machines.push(machine);
        self
    }
}

/// Upstream purchase whose receipt gates downstream operations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub id: PurchaseOrderLineId,
    pub order: String,
    pub line: u32,
    pub final_receive_date: Option<NaiveDateTime>,
}

/// Parent of a sequence of operations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: ProductionOrderId,
    pub number: String,
}

/// Unit of work to schedule
///
/// Unique per `(production_order, sequence)`. Times are in hours.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub production_order: ProductionOrderId,
    /// Position within the production order
    pub sequence: u32,
    pub task: Option<TaskId>,
    /// Assigned primary machine
    pub machine: Option<MachineId>,
    /// Pool of eligible labor
    pub workcenter: Option<WorkCenterId>,
    /// Hours still required
    pub remaining_time: f64,
    pub required_start: NaiveDateTime,
    /// Due date; finishing after it makes the operation late
    pub required_end: Option<NaiveDateTime>,
    /// Lower = more urgent
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Upstream receipt this operation's output depends on
    pub purchase_line: Option<PurchaseOrderLineId>,
}

fn default_priority() -> u32 {
    999
}

impl Operation {
    pub fn new(
        id: OperationId,
        production_order: ProductionOrderId,
        sequence: u32,
        required_start: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            production_order,
            sequence,
            task: None,
            machine: None,
            workcenter: None,
            remaining_time: 0.0,
            required_start,
            required_end: None,
            priority: default_priority(),
            purchase_line: None,
        }
    }

    pub fn remaining(mut self, hours: f64) -> Self {
        self.remaining_time = hours;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn machine(mut self, machine: MachineId) -> Self {
        self.machine = Some(machine);
        self
    }

    pub fn workcenter(mut self, workcenter: WorkCenterId) -> Self {
        self.workcenter = Some(workcenter);
        self
    }

    pub fn task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    pub fn purchase_line(mut self, line: PurchaseOrderLineId) -> Self {
        self.purchase_line = Some(line);
        self
    }

    pub fn required_end(mut self, end: NaiveDateTime) -> Self {
        self.required_end = Some(end);
        self
    }
}

// ============================================================================
// Schedule (Result)
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    #[default]
    Unscheduled,
    Scheduled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Planned,
    InProgress,
    Completed,
    Late,
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleState::Unscheduled => write!(f, "unscheduled"),
            ScheduleState::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// One committed booking: a chunk of an operation on a machine/labor pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleEntryId,
    pub operation: OperationId,
    pub machine: MachineId,
    pub labor: LaborId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub schedule_state: ScheduleState,
    #[serde(default)]
    pub execution_state: ExecutionState,
}

impl ScheduleEntry {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }

    /// Whether this booking occupies the given resource
    pub fn books(&self, resource: ResourceKey) -> bool {
        match resource {
            ResourceKey::Machine(id) => self.machine == id,
            ResourceKey::Labor(id) => self.labor == id,
        }
    }
}

/// A booking about to be committed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewScheduleEntry {
    pub operation: OperationId,
    pub machine: MachineId,
    pub labor: LaborId,
    pub window: TimeWindow,
    pub schedule_state: ScheduleState,
}

// ============================================================================
// Store Traits
// ============================================================================

/// Read access to everything that shapes a resource's free time
pub trait AvailabilityStore {
    fn machine(&self, id: MachineId) -> Option<Machine>;

    fn labor(&self, id: LaborId) -> Option<Labor>;

    fn calendar_day(&self, calendar: CalendarId, date: NaiveDate) -> Option<CalendarDay>;

    /// Shifts worked on a calendar day, paired with their templates
    fn day_shifts(&self, day: CalendarDayId) -> Vec<(CalendarShift, ShiftTemplate)>;

    /// Vacations of `labor` overlapping `window`
    fn vacations(&self, labor: LaborId, window: TimeWindow) -> Vec<LaborVacation>;

    /// Downtime of `machine` overlapping `window`
    fn downtime(&self, machine: MachineId, window: TimeWindow) -> Vec<MachineDowntime>;

    /// Committed bookings of `resource` overlapping `window`, ordered by start
    fn bookings(&self, resource: ResourceKey, window: TimeWindow) -> Vec<ScheduleEntry>;
}

/// Read access to the operation backlog and its routing data
pub trait OperationStore {
    fn operation(&self, id: OperationId) -> Option<Operation>;

    /// The operation immediately before `operation` in its production order
    fn predecessor(&self, operation: &Operation) -> Option<Operation>;

    fn task(&self, id: TaskId) -> Option<Task>;

    /// Labor attached to a work center, ordered by id
    fn workcenter_labor(&self, workcenter: WorkCenterId) -> Vec<Labor>;

    fn purchase_line(&self, id: PurchaseOrderLineId) -> Option<PurchaseOrderLine>;

    /// Schedule rows of an operation, ordered by start
    fn operation_schedule(&self, operation: OperationId) -> Vec<ScheduleEntry>;

    /// Operations that have no schedule rows
    fn unscheduled_operations(&self) -> Vec<Operation>;
}

/// Write access to committed schedule rows
pub trait ScheduleWriter {
    fn commit(&mut self, entry: NewScheduleEntry) -> Result<ScheduleEntry, StoreError>;

    /// Remove every schedule row, returning how many were removed
    fn clear_schedule(&mut self) -> Result<usize, StoreError>;
}

/// Write access used by calendar generation
pub trait CalendarWriter {
    /// Fetch the day, creating it with `is_working_day` if absent.
    /// The flag reports whether a new day was created.
    fn get_or_create_day(
        &mut self,
        calendar: CalendarId,
        date: NaiveDate,
        is_working_day: bool,
    ) -> Result<(CalendarDay, bool), StoreError>;

    /// Fetch the shift, creating it if absent.
    /// The flag reports whether a new shift was created.
    fn get_or_create_shift(
        &mut self,
        day: CalendarDayId,
        template: ShiftTemplateId,
    ) -> Result<(CalendarShift, bool), StoreError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Storage failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Calendar not found: {0}")]
    CalendarNotFound(CalendarId),

    #[error("Calendar day not found: {0}")]
    CalendarDayNotFound(CalendarDayId),

    #[error("Calendar shift not found: {0}")]
    CalendarShiftNotFound(CalendarShiftId),

    #[error("Shift template not found: {0}")]
    ShiftTemplateNotFound(ShiftTemplateId),

    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("Operation {production_order}/{sequence} already exists as operation {existing}")]
    DuplicateOperation {
        production_order: ProductionOrderId,
        sequence: u32,
        existing: OperationId,
    },

    #[error("Booking {window} for operation {operation} overlaps a booking of {resource}")]
    Overlap {
        operation: OperationId,
        resource: ResourceKey,
        window: TimeWindow,
    },

    #[error("Degenerate booking {window} for operation {operation}")]
    EmptyWindow {
        operation: OperationId,
        window: TimeWindow,
    },
}

/// Scheduling error
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Operation {operation}: no feasible slot within {lookahead_days} days")]
    NoFeasibleSlot {
        operation: OperationId,
        lookahead_days: u32,
    },

    #[error("Operation {operation}: no eligible resource ({reason})")]
    NoEligibleResource {
        operation: OperationId,
        reason: String,
    },

    #[error("Operation {operation}: no remaining work to schedule")]
    NoRemainingWork { operation: OperationId },

    #[error("Operation {operation}: time budget exhausted")]
    TimeBudgetExceeded { operation: OperationId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScheduleError {
    /// Failures that mean "this operation cannot be placed" rather than a defect.
    /// A batch run skips these and carries on.
    pub fn is_infeasible(&self) -> bool {
        matches!(
            self,
            ScheduleError::NoFeasibleSlot { .. }
                | ScheduleError::NoEligibleResource { .. }
                | ScheduleError::NoRemainingWork { .. }
                | ScheduleError::TimeBudgetExceeded { .. }
        )
    }

    /// The operation the failure is about, if it names one
    pub fn operation(&self) -> Option<OperationId> {
        match self {
            ScheduleError::NoFeasibleSlot { operation, .. }
            | ScheduleError::NoEligibleResource { operation, .. }
            | ScheduleError::NoRemainingWork { operation }
            | ScheduleError::TimeBudgetExceeded { operation } => Some(*operation),
            ScheduleError::Store(StoreError::Overlap { operation, .. })
            | ScheduleError::Store(StoreError::EmptyWindow { operation, .. }) => Some(*operation),
            ScheduleError::Store(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
