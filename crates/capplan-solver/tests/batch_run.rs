//! Integration tests for batch scheduling runs

use capplan_core::{
    AvailabilityStore, CalendarDay, CalendarDayId, CalendarId, CalendarShift, Labor, LaborId,
    LaborVacation, Machine, MachineDowntime, MachineId, MemoryStore, NewScheduleEntry, Operation,
    OperationId, OperationStore, PurchaseOrderLine, PurchaseOrderLineId, ResourceKey, ScheduleEntry,
    ScheduleError, ScheduleWriter, ShiftTemplate, StoreError, Task, TaskId, TimeWindow, WorkCenter,
    WorkCenterId,
};
use capplan_solver::{
    generate_calendar, run_batch, validate_schedule, ForwardScheduler, GenerationRequest,
    OperationOutcome, SchedulerConfig, StartBound,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pretty_assertions::assert_eq;

/// Store whose writes lose every race against another writer
struct ContendedStore {
    inner: MemoryStore,
    commits: usize,
}

impl AvailabilityStore for ContendedStore {
    fn machine(&self, id: MachineId) -> Option<Machine> {
        self.inner.machine(id)
    }

    fn labor(&self, id: LaborId) -> Option<Labor> {
        self.inner.labor(id)
    }

    fn calendar_day(&self, calendar: CalendarId, date: NaiveDate) -> Option<CalendarDay> {
        self.inner.calendar_day(calendar, date)
    }

    fn day_shifts(&self, day: CalendarDayId) -> Vec<(CalendarShift, ShiftTemplate)> {
        self.inner.day_shifts(day)
    }

    fn vacations(&self, labor: LaborId, window: TimeWindow) -> Vec<LaborVacation> {
        self.inner.vacations(labor, window)
    }

    fn downtime(&self, machine: MachineId, window: TimeWindow) -> Vec<MachineDowntime> {
        self.inner.downtime(machine, window)
    }

    fn bookings(&self, resource: ResourceKey, window: TimeWindow) -> Vec<ScheduleEntry> {
        self.inner.bookings(resource, window)
    }
}

impl OperationStore for ContendedStore {
    fn operation(&self, id: OperationId) -> Option<Operation> {
        self.inner.operation(id)
    }

    fn predecessor(&self, operation: &Operation) -> Option<Operation> {
        self.inner.predecessor(operation)
    }

    fn task(&self, id: TaskId) -> Option<Task> {
        self.inner.task(id)
    }

    fn workcenter_labor(&self, workcenter: WorkCenterId) -> Vec<Labor> {
        self.inner.workcenter_labor(workcenter)
    }

    fn purchase_line(&self, id: PurchaseOrderLineId) -> Option<PurchaseOrderLine> {
        self.inner.purchase_line(id)
    }

    fn operation_schedule(&self, operation: OperationId) -> Vec<ScheduleEntry> {
        self.inner.operation_schedule(operation)
    }

    fn unscheduled_operations(&self) -> Vec<Operation> {
        self.inner.unscheduled_operations()
    }
}

impl ScheduleWriter for ContendedStore {
    fn commit(&mut self, entry: NewScheduleEntry) -> Result<ScheduleEntry, StoreError> {
        self.commits += 1;
        Err(StoreError::Overlap {
            operation: entry.operation,
            resource: ResourceKey::Machine(entry.machine),
            window: entry.window,
        })
    }

    fn clear_schedule(&mut self) -> Result<usize, StoreError> {
        self.inner.clear_schedule()
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
}

fn dt(day: u32, hour: u32) -> NaiveDateTime {
    date(day).and_hms_opt(hour, 0, 0).unwrap()
}

/// Two weeks of 08:00-16:00 shifts from Monday 2025-07-07
fn plant() -> MemoryStore {
    let mut store = MemoryStore::new();
    let calendar = store.add_calendar("Plant");
    let day = ShiftTemplate::new(
        1,
        "Day",
        NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    );
    store.add_shift_template(day.clone());
    generate_calendar(
        &mut store,
        &GenerationRequest::new(vec![calendar], date(7), date(20)).shift(day),
    )
    .unwrap();

    store.add_workcenter(WorkCenter::new(1, "WELD"));
    store.add_machine(Machine::new(1, "WELD-1", calendar));
    store.add_labor(Labor::new(1, "Ada", calendar).in_workcenter(1));
    store
}

fn scheduler() -> ForwardScheduler {
    ForwardScheduler::new().as_of(dt(7, 0))
}

fn op(id: u64, order: u64, sequence: u32, hours: f64) -> Operation {
    Operation::new(id, order, sequence, dt(7, 8))
        .machine(1)
        .workcenter(1)
        .remaining(hours)
}

fn span(store: &MemoryStore, operation: u64) -> Option<TimeWindow> {
    let rows: Vec<_> = store
        .schedule
        .iter()
        .filter(|e| e.operation == operation)
        .collect();
    let start = rows.iter().map(|e| e.start).min()?;
    let end = rows.iter().map(|e| e.end).max()?;
    Some(TimeWindow::new(start, end))
}

#[test]
fn lower_priority_value_goes_first() {
    let mut store = plant();
    store.add_operation(op(1, 1, 10, 2.0).priority(5)).unwrap();
    store.add_operation(op(2, 2, 10, 2.0).priority(1)).unwrap();

    let report = run_batch(&mut store, &scheduler()).unwrap();

    let order: Vec<_> = report
        .outcomes
        .iter()
        .map(OperationOutcome::operation)
        .collect();
    assert_eq!(order, vec![2, 1]);
    assert_eq!(span(&store, 2), Some(TimeWindow::new(dt(7, 8), dt(7, 10))));
    assert_eq!(span(&store, 1), Some(TimeWindow::new(dt(7, 10), dt(7, 12))));
}

#[test]
fn equal_priority_falls_back_to_required_start() {
    let mut store = plant();
    let mut later = op(1, 1, 10, 2.0);
    later.required_start = dt(7, 9);
    store.add_operation(later).unwrap();
    store.add_operation(op(2, 2, 10, 2.0)).unwrap();

    let report = run_batch(&mut store, &scheduler()).unwrap();
    let order: Vec<_> = report
        .outcomes
        .iter()
        .map(OperationOutcome::operation)
        .collect();
    assert_eq!(order, vec![2, 1]);
}

#[test]
fn infeasible_operation_is_skipped_and_the_run_continues() {
    let mut store = plant();
    store
        .add_operation(op(1, 1, 10, 2.0).priority(1).machine(99))
        .unwrap();
    store.add_operation(op(2, 2, 10, 2.0).priority(2)).unwrap();

    let report = run_batch(&mut store, &scheduler()).unwrap();

    assert_eq!(report.scheduled_count(), 1);
    assert_eq!(report.infeasible_count(), 1);
    assert!(matches!(
        report.outcome(1),
        Some(OperationOutcome::Infeasible {
            reason: ScheduleError::NoEligibleResource { .. },
            ..
        })
    ));
    assert_eq!(span(&store, 1), None);
    assert_eq!(span(&store, 2), Some(TimeWindow::new(dt(7, 8), dt(7, 10))));
}

#[test]
fn operation_beyond_the_calendar_is_infeasible() {
    let mut store = plant();
    // 10 days of 8 hours is all the calendar holds
    store.add_operation(op(1, 1, 10, 81.0)).unwrap();
    let scheduler = ForwardScheduler::with_config(SchedulerConfig {
        lookahead_days: 14,
        ..SchedulerConfig::default()
    })
    .as_of(dt(7, 0));

    let report = run_batch(&mut store, &scheduler).unwrap();

    assert!(matches!(
        report.outcome(1),
        Some(OperationOutcome::Infeasible {
            reason: ScheduleError::NoFeasibleSlot { lookahead_days: 14, .. },
            ..
        })
    ));
    assert!(store.schedule.is_empty());
}

#[test]
fn successor_waits_for_its_predecessor() {
    let mut store = plant();
    store.add_operation(op(1, 1, 10, 6.0)).unwrap();
    store.add_operation(op(2, 1, 20, 4.0)).unwrap();

    let report = run_batch(&mut store, &scheduler()).unwrap();

    assert_eq!(span(&store, 1), Some(TimeWindow::new(dt(7, 8), dt(7, 14))));
    // Two hours left on Monday, the rest on Tuesday
    assert_eq!(span(&store, 2), Some(TimeWindow::new(dt(7, 14), dt(8, 10))));
    let Some(OperationOutcome::Scheduled(second)) = report.outcome(2) else {
        panic!("operation 2 should be scheduled");
    };
    assert_eq!(second.earliest.bound, StartBound::Predecessor(1));
}

#[test]
fn successor_waits_for_material_receipt() {
    let mut store = plant();
    let line = store.add_purchase_line(PurchaseOrderLine {
        id: 0,
        order: "PO-4411".into(),
        line: 1,
        final_receive_date: Some(dt(9, 12)),
    });
    store
        .add_operation(op(1, 1, 10, 2.0).purchase_line(line))
        .unwrap();
    store.add_operation(op(2, 1, 20, 2.0)).unwrap();

    run_batch(&mut store, &scheduler()).unwrap();

    assert_eq!(span(&store, 2), Some(TimeWindow::new(dt(9, 12), dt(9, 14))));
}

#[test]
fn rerun_replaces_the_previous_schedule() {
    let mut store = plant();
    store.add_operation(op(1, 1, 10, 3.0)).unwrap();
    run_batch(&mut store, &scheduler()).unwrap();
    let first = store.schedule.len();

    let report = run_batch(&mut store, &scheduler()).unwrap();

    assert_eq!(report.cleared, first);
    assert_eq!(store.schedule.len(), first);
}

#[test]
fn batch_output_passes_validation() {
    let mut store = plant();
    store.add_machine(Machine::new(2, "WELD-2", 1));
    store.add_labor(Labor::new(2, "Grace", 1).in_workcenter(1));
    for order in 1..=4 {
        store
            .add_operation(op(order * 10, order, 10, 5.0).machine(1 + order % 2))
            .unwrap();
        store
            .add_operation(op(order * 10 + 1, order, 20, 7.5).machine(2 - order % 2))
            .unwrap();
    }

    let report = run_batch(&mut store, &scheduler()).unwrap();

    assert_eq!(report.infeasible_count(), 0);
    let violations = validate_schedule(&store, &store.schedule, 1e-6);
    assert!(violations.is_empty(), "unexpected violations: {:?}", violations);
}

#[test]
fn store_failure_aborts_the_run() {
    let mut inner = plant();
    inner.add_operation(op(1, 1, 10, 2.0)).unwrap();
    inner.add_operation(op(2, 2, 10, 2.0)).unwrap();
    let mut store = ContendedStore { inner, commits: 0 };

    let result = run_batch(&mut store, &scheduler());

    assert!(matches!(
        result,
        Err(ScheduleError::Store(StoreError::Overlap { operation: 1, .. }))
    ));
    // The second operation is never attempted
    assert_eq!(store.commits, 1);
    assert!(store.inner.schedule.is_empty());
}

#[test]
fn booking_across_an_overnight_handover_passes_validation() {
    let mut store = MemoryStore::new();
    let calendar = store.add_calendar("Plant");
    let early = ShiftTemplate::new(
        1,
        "Early",
        NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
    );
    let night = ShiftTemplate::new(
        2,
        "Night",
        NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
    );
    store.add_shift_template(early.clone());
    store.add_shift_template(night.clone());
    generate_calendar(
        &mut store,
        &GenerationRequest::new(vec![calendar], date(7), date(11))
            .shift(early)
            .shift(night),
    )
    .unwrap();
    store.add_workcenter(WorkCenter::new(1, "WELD"));
    store.add_machine(Machine::new(1, "WELD-1", calendar));
    store.add_labor(Labor::new(1, "Ada", calendar).in_workcenter(1));
    store.add_operation(op(1, 1, 10, 4.0)).unwrap();

    let report = run_batch(&mut store, &ForwardScheduler::new().as_of(dt(8, 1))).unwrap();

    assert_eq!(report.scheduled_count(), 1);
    // Monday's night shift runs straight into Tuesday's early shift
    assert_eq!(span(&store, 1), Some(TimeWindow::new(dt(8, 1), dt(8, 5))));
    assert_eq!(store.schedule.len(), 1);
    let violations = validate_schedule(&store, &store.schedule, 1e-6);
    assert!(violations.is_empty(), "unexpected violations: {:?}", violations);
}

#[test]
fn late_finish_is_flagged() {
    let mut store = plant();
    // Runs into Tuesday morning
    store
        .add_operation(op(1, 1, 10, 10.0).required_end(dt(7, 16)))
        .unwrap();
    store
        .add_operation(op(2, 2, 10, 1.0).required_end(dt(9, 16)))
        .unwrap();

    let report = run_batch(&mut store, &scheduler()).unwrap();

    let late: Vec<_> = report
        .outcomes
        .iter()
        .filter_map(|o| match o {
            OperationOutcome::Scheduled(done) if done.is_late() => Some(done.operation),
            _ => None,
        })
        .collect();
    assert_eq!(late, vec![1]);
}
