//! Availability Resolver
//!
//! Computes the free windows of one machine or labor resource on one
//! calendar date: the shifts worked that day, minus committed bookings,
//! machine downtime, and labor vacation.
//!
//! Shifts are anchored on the date they start. An overnight shift
//! (`end_time <= start_time`) worked on `D` yields a window running into
//! `D + 1`, so callers looking for time just after midnight must also ask
//! about the previous date; `free_windows_from` does exactly that.
//!
//! None of these functions fail. Missing calendars, non-working days and
//! unknown resources all resolve to "no availability".

use capplan_core::{AvailabilityStore, CalendarId, ResourceKey, ScheduleEntry, TimeWindow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::intervals::{normalize, subtract};

fn calendar_of<S: AvailabilityStore + ?Sized>(
    store: &S,
    resource: ResourceKey,
) -> Option<CalendarId> {
    match resource {
        ResourceKey::Machine(id) => store.machine(id).map(|m| m.calendar),
        ResourceKey::Labor(id) => store.labor(id).map(|l| l.calendar),
    }
}

/// The full calendar date as a window, midnight to midnight
fn day_span(date: NaiveDate) -> TimeWindow {
    let start = date.and_time(NaiveTime::MIN);
    let end = date.succ_opt()
        .map(|d| d.and_time(NaiveTime::MIN))
        .unwrap_or(start);
    TimeWindow::new(start, end)
}

/// Shift time the resource is scheduled to work on `date`, before any bookings
///
/// Labor only sees shifts it is permitted to work. The result is sorted and
/// disjoint; overlapping shifts are merged.
pub fn shift_windows<S: AvailabilityStore + ?Sized>(
    store: &S,
    resource: ResourceKey,
    date: NaiveDate,
) -> Vec<TimeWindow> {
    let Some(calendar) = calendar_of(store, resource) else {
        return Vec::new();
    };
    let Some(day) = store
        .calendar_day(calendar, date)
        .filter(|d| d.is_working_day)
    else {
        return Vec::new();
    };

    let windows = store
        .day_shifts(day.id)
        .into_iter()
        .filter(|(shift, _)| match resource {
            ResourceKey::Labor(id) => shift.permits(id),
            ResourceKey::Machine(_) => true,
        })
        .map(|(_, template)| template.window_on(date))
        .collect();
    normalize(windows)
}

/// Free windows of `resource` for shifts worked on `date`
///
/// Windows are non-empty, sorted ascending and non-overlapping.
pub fn free_windows<S: AvailabilityStore + ?Sized>(
    store: &S,
    resource: ResourceKey,
    date: NaiveDate,
) -> Vec<TimeWindow> {
    if let ResourceKey::Labor(id) = resource {
        let day = day_span(date);
        if store
            .vacations(id, day)
            .iter()
            .any(|v| v.approved && v.window().encloses(&day))
        {
            return Vec::new();
        }
    }

    let shifts = shift_windows(store, resource, date);
    let (Some(first), Some(last)) = (shifts.first(), shifts.last()) else {
        return Vec::new();
    };
    let envelope = TimeWindow::new(first.start, last.end);

    let mut blocked: Vec<TimeWindow> = store
        .bookings(resource, envelope)
        .iter()
        .map(ScheduleEntry::window)
        .collect();
    match resource {
        ResourceKey::Machine(id) => {
            blocked.extend(store.downtime(id, envelope).iter().map(|d| d.window()));
        }
        ResourceKey::Labor(id) => {
            blocked.extend(
                store
                    .vacations(id, envelope)
                    .iter()
                    .filter(|v| v.approved)
                    .map(|v| v.window()),
            );
        }
    }
    let blocked = normalize(blocked);

    shifts
        .iter()
        .flat_map(|shift| subtract(*shift, &blocked))
        .collect()
}

/// Free windows reachable from `cursor` on its date
///
/// Covers the shifts of `cursor`'s date plus any overnight remainder of the
/// previous date's shifts that is still ahead of `cursor`.
pub fn free_windows_from<S: AvailabilityStore + ?Sized>(
    store: &S,
    resource: ResourceKey,
    cursor: NaiveDateTime,
) -> Vec<TimeWindow> {
    let date = cursor.date();
    let mut windows = free_windows(store, resource, date);
    if let Some(previous) = date.pred_opt() {
        windows.extend(
            free_windows(store, resource, previous)
                .into_iter()
                .filter(|w| w.end > cursor),
        );
    }
    normalize(windows)
}
