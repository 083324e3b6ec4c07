//! Schedule validation
//!
//! Checks committed bookings against the invariants the scheduler is meant
//! to uphold. Returns every violation found rather than stopping at the first.

use std::collections::BTreeMap;

use capplan_core::{
    AvailabilityStore, OperationId, OperationStore, ResourceKey, ScheduleEntry, ScheduleEntryId,
    TimeWindow,
};

use crate::availability::shift_windows;
use crate::intervals::normalize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// Booking with no positive length
    EmptyBooking,
    /// Two bookings share a machine at the same time
    MachineOverlap,
    /// Two bookings share a laborer at the same time
    LaborOverlap,
    /// Two chunks of one operation overlap
    ChunkOverlap,
    /// Booked hours differ from the operation's remaining time
    DurationMismatch,
    /// Booking lies outside the resource's shift time
    OutsideShift,
    /// Booking overlaps machine downtime or approved labor vacation
    BlockedTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    pub entries: Vec<ScheduleEntryId>,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Validate `rows` against the store they were scheduled from
pub fn validate_schedule<S>(store: &S, rows: &[ScheduleEntry], epsilon: f64) -> Vec<Violation>
where
    S: AvailabilityStore + OperationStore + ?Sized,
{
    let mut violations = Vec::new();

    for row in rows.iter().filter(|r| r.window().is_empty()) {
        violations.push(Violation {
            kind: ViolationKind::EmptyBooking,
            message: format!("booking {} for operation {} is empty", row.id, row.operation),
            entries: vec![row.id],
        });
    }

    check_overlaps(rows, |r| r.machine, ViolationKind::MachineOverlap, &mut violations);
    check_overlaps(rows, |r| r.labor, ViolationKind::LaborOverlap, &mut violations);
    check_overlaps(rows, |r| r.operation, ViolationKind::ChunkOverlap, &mut violations);
    check_durations(store, rows, epsilon, &mut violations);

    for row in rows {
        check_placement(store, row, &mut violations);
    }
    violations
}

fn check_overlaps(
    rows: &[ScheduleEntry],
    key: impl Fn(&ScheduleEntry) -> u64,
    kind: ViolationKind,
    violations: &mut Vec<Violation>,
) {
    let mut groups: BTreeMap<u64, Vec<&ScheduleEntry>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(row);
    }

    for (id, mut group) in groups {
        group.sort_by_key(|r| (r.start, r.id));
        for pair in group.windows(2) {
            if pair[0].window().overlaps(&pair[1].window()) {
                violations.push(Violation {
                    kind,
                    message: format!(
                        "#{}: booking {} {} overlaps booking {} {}",
                        id,
                        pair[0].id,
                        pair[0].window(),
                        pair[1].id,
                        pair[1].window()
                    ),
                    entries: vec![pair[0].id, pair[1].id],
                });
            }
        }
    }
}

fn check_durations<S>(
    store: &S,
    rows: &[ScheduleEntry],
    epsilon: f64,
    violations: &mut Vec<Violation>,
) where
    S: OperationStore + ?Sized,
{
    let mut booked: BTreeMap<OperationId, (f64, Vec<ScheduleEntryId>)> = BTreeMap::new();
    for row in rows {
        let entry = booked.entry(row.operation).or_default();
        entry.0 += row.window().hours();
        entry.1.push(row.id);
    }

    for (operation, (hours, entries)) in booked {
        let Some(op) = store.operation(operation) else {
            continue;
        };
        // Millisecond rounding allows one epsilon of drift per chunk.
        let tolerance = epsilon * entries.len().max(1) as f64;
        if (hours - op.remaining_time).abs() > tolerance {
            violations.push(Violation {
                kind: ViolationKind::DurationMismatch,
                message: format!(
                    "operation {} booked {:.4}h of {:.4}h",
                    operation, hours, op.remaining_time
                ),
                entries,
            });
        }
    }
}

/// Shift time of `resource` that can contain `row`
///
/// Spans the day before the booking starts through the day it ends, merged,
/// so a booking running from an overnight remainder into the next shift is
/// covered by one window.
fn working_time<S>(store: &S, resource: ResourceKey, row: &ScheduleEntry) -> Vec<TimeWindow>
where
    S: AvailabilityStore + ?Sized,
{
    let first = row.start.date().pred_opt().unwrap_or(row.start.date());
    let mut windows = Vec::new();
    for date in first.iter_days().take_while(|d| *d <= row.end.date()) {
        windows.extend(shift_windows(store, resource, date));
    }
    normalize(windows)
}

fn check_placement<S>(store: &S, row: &ScheduleEntry, violations: &mut Vec<Violation>)
where
    S: AvailabilityStore + ?Sized,
{
    let window = row.window();
    for resource in [ResourceKey::Machine(row.machine), ResourceKey::Labor(row.labor)] {
        if !working_time(store, resource, row).iter().any(|w| w.encloses(&window)) {
            violations.push(Violation {
                kind: ViolationKind::OutsideShift,
                message: format!(
                    "booking {} {} is outside shift time of {}",
                    row.id, window, resource
                ),
                entries: vec![row.id],
            });
        }
    }

    let downtime = store.downtime(row.machine, window);
    let vacation = store
        .vacations(row.labor, window)
        .into_iter()
        .filter(|v| v.approved)
        .count();
    if !downtime.is_empty() || vacation > 0 {
        violations.push(Violation {
            kind: ViolationKind::BlockedTime,
            message: format!("booking {} {} overlaps downtime or vacation", row.id, window),
            entries: vec![row.id],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capplan_core::{
        CalendarWriter, Labor, Machine, MachineDowntime, MemoryStore, Operation, ScheduleState,
        ShiftTemplate,
    };
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

    /// Hours past Monday 2025-07-07 midnight
    fn at(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 7)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::hours(hour)
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let calendar = store.add_calendar("Plant");
        let shift = store.add_shift_template(ShiftTemplate::new(
            0,
            "Day",
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        ));
        let (day, _) = store
            .get_or_create_day(calendar, at(0).date(), true)
            .unwrap();
        store.get_or_create_shift(day.id, shift).unwrap();
        store.add_machine(Machine::new(1, "M1", calendar));
        store.add_labor(Labor::new(1, "L1", calendar));
        store.add_labor(Labor::new(2, "L2", calendar));
        store
            .add_operation(Operation::new(1, 1, 10, at(8)).remaining(2.0))
            .unwrap();
        store
            .add_operation(Operation::new(2, 2, 10, at(8)).remaining(2.0))
            .unwrap();
        store
    }

    /// 03:00-11:00 and 18:00-03:00 on Monday and Tuesday
    fn two_shift_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let calendar = store.add_calendar("Plant");
        let early = store.add_shift_template(ShiftTemplate::new(
            0,
            "Early",
            NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        ));
        let night = store.add_shift_template(ShiftTemplate::new(
            0,
            "Night",
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
        ));
        for date in [at(0).date(), at(24).date()] {
            let (day, _) = store.get_or_create_day(calendar, date, true).unwrap();
            store.get_or_create_shift(day.id, early).unwrap();
            store.get_or_create_shift(day.id, night).unwrap();
        }
        store.add_machine(Machine::new(1, "M1", calendar));
        store.add_labor(Labor::new(1, "L1", calendar));
        store
            .add_operation(Operation::new(1, 1, 10, at(8)).remaining(4.0))
            .unwrap();
        store
    }

    fn row(id: u64, operation: u64, labor: u64, start: i64, end: i64) -> ScheduleEntry {
        ScheduleEntry {
            id,
            operation,
            machine: 1,
            labor,
            start: at(start),
            end: at(end),
            schedule_state: ScheduleState::Scheduled,
            execution_state: Default::default(),
        }
    }

    fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    #[test]
    fn clean_schedule_has_no_violations() {
        let store = store();
        let rows = vec![row(1, 1, 1, 8, 10), row(2, 2, 2, 10, 12)];
        assert!(validate_schedule(&store, &rows, 1e-6).is_empty());
    }

    #[test]
    fn machine_overlap_is_reported() {
        let store = store();
        let rows = vec![row(1, 1, 1, 8, 10), row(2, 2, 2, 9, 11)];
        assert_eq!(
            kinds(&validate_schedule(&store, &rows, 1e-6)),
            vec![ViolationKind::MachineOverlap]
        );
    }

    #[test]
    fn short_booking_is_a_duration_mismatch() {
        let store = store();
        let rows = vec![row(1, 1, 1, 8, 9)];
        assert_eq!(
            kinds(&validate_schedule(&store, &rows, 1e-6)),
            vec![ViolationKind::DurationMismatch]
        );
    }

    #[test]
    fn booking_outside_shift_is_reported_per_resource() {
        let store = store();
        let rows = vec![row(1, 1, 1, 16, 18)];
        assert_eq!(
            kinds(&validate_schedule(&store, &rows, 1e-6)),
            vec![ViolationKind::OutsideShift, ViolationKind::OutsideShift]
        );
    }

    #[test]
    fn booking_during_downtime_is_reported() {
        let mut store = store();
        store.add_downtime(MachineDowntime::new(1, at(9), at(10), "PM"));
        let rows = vec![row(1, 1, 1, 8, 10)];
        assert_eq!(
            kinds(&validate_schedule(&store, &rows, 1e-6)),
            vec![ViolationKind::BlockedTime]
        );
    }

    #[test]
    fn booking_spanning_a_shift_handover_is_inside_shift() {
        let store = two_shift_store();
        // Tuesday 01:00-05:00: Monday night into Tuesday early
        let rows = vec![row(1, 1, 1, 25, 29)];
        assert!(validate_schedule(&store, &rows, 1e-6).is_empty());
    }

    #[test]
    fn booking_into_a_gap_between_shifts_is_outside_shift() {
        let store = two_shift_store();
        // Tuesday 09:00-13:00 runs past the early shift
        let rows = vec![row(1, 1, 1, 33, 37)];
        assert_eq!(
            kinds(&validate_schedule(&store, &rows, 1e-6)),
            vec![ViolationKind::OutsideShift, ViolationKind::OutsideShift]
        );
    }
}
