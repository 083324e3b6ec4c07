//! In-memory store
//!
//! `MemoryStore` implements every store trait over plain vectors. It is the
//! fixture type for tests and, through serde, the dataset format read and
//! written by the command-line tool.
//!
//! Records added with an id of `0` are assigned the next free id.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    AvailabilityStore, Calendar, CalendarDay, CalendarDayId, CalendarId, CalendarShift,
    CalendarShiftId, CalendarWriter, Labor, LaborId, LaborVacation, Machine, MachineDowntime,
    MachineId, NewScheduleEntry, Operation, OperationId, OperationStore, ProductionOrder,
    PurchaseOrderLine, PurchaseOrderLineId, ResourceKey, ScheduleEntry, ScheduleState,
    ScheduleWriter, ShiftTemplate, ShiftTemplateId, StoreError, Task, TaskId, TimeWindow,
    WorkCenter, WorkCenterId,
};

/// Vector-backed implementation of the store traits
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    pub calendars: Vec<Calendar>,
    pub calendar_days: Vec<CalendarDay>,
    pub shift_templates: Vec<ShiftTemplate>,
    pub calendar_shifts: Vec<CalendarShift>,
    pub workcenters: Vec<WorkCenter>,
    pub machines: Vec<Machine>,
    pub labors: Vec<Labor>,
    pub vacations: Vec<LaborVacation>,
    pub downtimes: Vec<MachineDowntime>,
    pub tasks: Vec<Task>,
    pub purchase_lines: Vec<PurchaseOrderLine>,
    pub production_orders: Vec<ProductionOrder>,
    pub operations: Vec<Operation>,
    pub schedule: Vec<ScheduleEntry>,
}

fn next_id<T>(rows: &[T], id: impl Fn(&T) -> u64) -> u64 {
    rows.iter().map(id).max().unwrap_or(0) + 1
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_calendar(&mut self, name: impl Into<String>) -> CalendarId {
        let id = next_id(&self.calendars, |c| c.id);
        self.calendars.push(Calendar {
            id,
            name: name.into(),
        });
        id
    }

    pub fn add_shift_template(&mut self, mut template: ShiftTemplate) -> ShiftTemplateId {
        if template.id == 0 {
            template.id = next_id(&self.shift_templates, |t| t.id);
        }
        let id = template.id;
        self.shift_templates.push(template);
        id
    }

    pub fn add_workcenter(&mut self, mut workcenter: WorkCenter) -> WorkCenterId {
        if workcenter.id == 0 {
            workcenter.id = next_id(&self.workcenters, |w| w.id);
        }
        let id = workcenter.id;
        self.workcenters.push(workcenter);
        id
    }

    pub fn add_machine(&mut self, mut machine: Machine) -> MachineId {
        if machine.id == 0 {
            machine.id = next_id(&self.machines, |m| m.id);
        }
        let id = machine.id;
        self.machines.push(machine);
        id
    }

    pub fn add_labor(&mut self, mut labor: Labor) -> LaborId {
        if labor.id == 0 {
            labor.id = next_id(&self.labors, |l| l.id);
        }
        let id = labor.id;
        self.labors.push(labor);
        id
    }

    pub fn add_task(&mut self, mut task: Task) -> TaskId {
        if task.id == 0 {
            task.id = next_id(&self.tasks, |t| t.id);
        }
        let id = task.id;
        self.tasks.push(task);
        id
    }

    pub fn add_purchase_line(&mut self, mut line: PurchaseOrderLine) -> PurchaseOrderLineId {
        if line.id == 0 {
            line.id = next_id(&self.purchase_lines, |l| l.id);
        }
        let id = line.id;
        self.purchase_lines.push(line);
        id
    }

    /// Adds an operation, refusing a second one at the same order position
    pub fn add_operation(&mut self, mut operation: Operation) -> Result<OperationId, StoreError> {
        if let Some(existing) = self.operations.iter().find(|o| {
            o.production_order == operation.production_order && o.sequence == operation.sequence
        }) {
            return Err(StoreError::DuplicateOperation {
                production_order: operation.production_order,
                sequence: operation.sequence,
                existing: existing.id,
            });
        }
        if operation.id == 0 {
            operation.id = next_id(&self.operations, |o| o.id);
        }
        let id = operation.id;
        self.operations.push(operation);
        Ok(id)
    }

    pub fn add_vacation(&mut self, vacation: LaborVacation) {
        self.vacations.push(vacation);
    }

    pub fn add_downtime(&mut self, downtime: MachineDowntime) {
        self.downtimes.push(downtime);
    }

    /// Restrict a calendar shift to the given labor
    pub fn restrict_shift(
        &mut self,
        shift: CalendarShiftId,
        labors: Vec<LaborId>,
    ) -> Result<(), StoreError> {
        let found = self
            .calendar_shifts
            .iter_mut()
            .find(|s| s.id == shift)
            .ok_or(StoreError::CalendarShiftNotFound(shift))?;
        found.labors = labors;
        Ok(())
    }

    /// Shifts attached to a calendar date, if the date exists
    pub fn shifts_on(&self, calendar: CalendarId, date: NaiveDate) -> Vec<&CalendarShift> {
        let Some(day) = self
            .calendar_days
            .iter()
            .find(|d| d.calendar == calendar && d.date == date)
        else {
            return Vec::new();
        };
        self
            .calendar_shifts
            .iter()
            .filter(|s| s.calendar_day == day.id)
            .collect()
    }
}

// ============================================================================
// Reads
// ============================================================================

impl AvailabilityStore for MemoryStore {
    fn machine(&self, id: MachineId) -> Option<Machine> {
        self.machines.iter().find(|m| m.id == id).cloned()
    }

    fn labor(&self, id: LaborId) -> Option<Labor> {
        self.labors.iter().find(|l| l.id == id).cloned()
    }

    fn calendar_day(&self, calendar: CalendarId, date: NaiveDate) -> Option<CalendarDay> {
        self
            .calendar_days
            .iter()
            .find(|d| d.calendar == calendar && d.date == date)
            .cloned()
    }

    fn day_shifts(&self, day: CalendarDayId) -> Vec<(CalendarShift, ShiftTemplate)> {
        self
            .calendar_shifts
            .iter()
            .filter(|s| s.calendar_day == day)
            .filter_map(|s| {
                let template = self
                    .shift_templates
                    .iter()
                    .find(|t| t.id == s.shift_template)?;
                Some((s.clone(), template.clone()))
            })
            .collect()
    }

    fn vacations(&self, labor: LaborId, window: TimeWindow) -> Vec<LaborVacation> {
        self
            .vacations
            .iter()
            .filter(|v| v.labor == labor && v.window().overlaps(&window))
            .cloned()
            .collect()
    }

    fn downtime(&self, machine: MachineId, window: TimeWindow) -> Vec<MachineDowntime> {
        let mut rows: Vec<_> = self
            .downtimes
            .iter()
            .filter(|d| d.machine == machine && d.window().overlaps(&window))
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.start);
        rows
    }

    fn bookings(&self, resource: ResourceKey, window: TimeWindow) -> Vec<ScheduleEntry> {
        let mut rows: Vec<_> = self
            .schedule
            .iter()
            .filter(|e| {
                e.schedule_state == ScheduleState::Scheduled
                    && e.books(resource)
                    && e.window().overlaps(&window)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.start, e.id));
        rows
    }
}

impl OperationStore for MemoryStore {
    fn operation(&self, id: OperationId) -> Option<Operation> {
        self.operations.iter().find(|o| o.id == id).cloned()
    }

    fn predecessor(&self, operation: &Operation) -> Option<Operation> {
        self
            .operations
            .iter()
            .filter(|o| {
                o.production_order == operation.production_order && o.sequence < operation.sequence
            })
            .max_by_key(|o| o.sequence)
            .cloned()
    }

    fn task(&self, id: TaskId) -> Option<Task> {
        self.tasks.iter().find(|t| t.id == id).cloned()
    }

    fn workcenter_labor(&self, workcenter: WorkCenterId) -> Vec<Labor> {
        let mut labor: Vec<_> = self
            .labors
            .iter()
            .filter(|l| l.workcenter == Some(workcenter))
            .cloned()
            .collect();
        labor.sort_by_key(|l| l.id);
        labor
    }

    fn purchase_line(&self, id: PurchaseOrderLineId) -> Option<PurchaseOrderLine> {
        self.purchase_lines.iter().find(|l| l.id == id).cloned()
    }

    fn operation_schedule(&self, operation: OperationId) -> Vec<ScheduleEntry> {
        let mut rows: Vec<_> = self
            .schedule
            .iter()
            .filter(|e| e.operation == operation)
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.start, e.id));
        rows
    }

    fn unscheduled_operations(&self) -> Vec<Operation> {
        self
            .operations
            .iter()
            .filter(|o| !self.schedule.iter().any(|e| e.operation == o.id))
            .cloned()
            .collect()
    }
}

// ============================================================================
// Writes
// ============================================================================

impl ScheduleWriter for MemoryStore {
    /// Commits a booking, refusing one that would double-book its machine or labor
    fn commit(&mut self, entry: NewScheduleEntry) -> Result<ScheduleEntry, StoreError> {
        if entry.window.is_empty() {
            return Err(StoreError::EmptyWindow {
                operation: entry.operation,
                window: entry.window,
            });
        }
        if self.operation(entry.operation).is_none() {
            return Err(StoreError::OperationNotFound(entry.operation));
        }
        for resource in [ResourceKey::Machine(entry.machine), ResourceKey::Labor(entry.labor)] {
            if !self.bookings(resource, entry.window).is_empty() {
                return Err(StoreError::Overlap {
                    operation: entry.operation,
                    resource,
                    window: entry.window,
                });
            }
        }

        let row = ScheduleEntry {
            id: next_id(&self.schedule, |e| e.id),
            operation: entry.operation,
            machine: entry.machine,
            labor: entry.labor,
            start: entry.window.start,
            end: entry.window.end,
            schedule_state: entry.schedule_state,
            execution_state: Default::default(),
        };
        self.schedule.push(row.clone());
        Ok(row)
    }

    fn clear_schedule(&mut self) -> Result<usize, StoreError> {
        let removed = self.schedule.len();
        self.schedule.clear();
        Ok(removed)
    }
}

impl CalendarWriter for MemoryStore {
    fn get_or_create_day(
        &mut self,
        calendar: CalendarId,
        date: NaiveDate,
        is_working_day: bool,
    ) -> Result<(CalendarDay, bool), StoreError> {
        if !self.calendars.iter().any(|c| c.id == calendar) {
            return Err(StoreError::CalendarNotFound(calendar));
        }
        if let Some(day) = self.calendar_day(calendar, date) {
            return Ok((day, false));
        }
        let day = CalendarDay {
            id: next_id(&self.calendar_days, |d| d.id),
            calendar,
            date,
            is_working_day,
            note: String::new(),
        };
        self.calendar_days.push(day.clone());
        Ok((day, true))
    }

    fn get_or_create_shift(
        &mut self,
        day: CalendarDayId,
        template: ShiftTemplateId,
    ) -> Result<(CalendarShift, bool), StoreError> {
        if !self.calendar_days.iter().any(|d| d.id == day) {
            return Err(StoreError::CalendarDayNotFound(day));
        }
        if !self.shift_templates.iter().any(|t| t.id == template) {
            return Err(StoreError::ShiftTemplateNotFound(template));
        }
        if let Some(shift) = self
            .calendar_shifts
            .iter()
            .find(|s| s.calendar_day == day && s.shift_template == template)
        {
            return Ok((shift.clone(), false));
        }
        let shift = CalendarShift {
            id: next_id(&self.calendar_shifts, |s| s.id),
            calendar_day: day,
            shift_template: template,
            labors: Vec::new(),
        };
        self.calendar_shifts.push(shift.clone());
        Ok((shift, true))
    }
}
