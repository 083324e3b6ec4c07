//! Calendar Generator
//!
//! Materializes calendar days and shift assignments over a date range.
//! Re-running over an overlapping range creates nothing new: days and shifts
//! are fetched when they already exist, and an existing day keeps its
//! working flag.

use std::collections::BTreeSet;

use capplan_core::{CalendarId, CalendarWriter, ShiftTemplate, StoreError};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use tracing::{debug, info};

/// What to generate
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub calendars: Vec<CalendarId>,
    /// First date, inclusive
    pub start: NaiveDate,
    /// Last date, inclusive
    pub end: NaiveDate,
    pub work_weekdays: Vec<Weekday>,
    pub shift_templates: Vec<ShiftTemplate>,
}

impl GenerationRequest {
    /// Monday to Friday, no shifts
    pub fn new(calendars: Vec<CalendarId>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            calendars,
            start,
            end,
            work_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            shift_templates: Vec::new(),
        }
    }

    pub fn weekdays(mut self, weekdays: Vec<Weekday>) -> Self {
        self.work_weekdays = weekdays;
        self
    }

    pub fn shift(mut self, template: ShiftTemplate) -> Self {
        self.shift_templates.push(template);
        self
    }
}

/// Counts of what a generation run touched
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub days_created: usize,
    pub days_existing: usize,
    pub shifts_created: usize,
    pub shifts_existing: usize,
}

impl GenerationReport {
    fn day(&mut self, created: bool) {
        if created {
            self.days_created += 1;
        } else {
            self.days_existing += 1;
        }
    }

    fn shift(&mut self, created: bool) {
        if created {
            self.shifts_created += 1;
        } else {
            self.shifts_existing += 1;
        }
    }
}

/// Generate calendar days and shifts for every calendar in the request
///
/// Overnight shifts also make sure the following date exists as a working
/// day, without attaching a shift to it. Every date is counted once in the
/// report, however many overnight templates reach it.
pub fn generate_calendar<S: CalendarWriter + ?Sized>(
    store: &mut S,
    request: &GenerationRequest,
) -> Result<GenerationReport, StoreError> {
    let mut report = GenerationReport::default();
    let overnight = request
        .shift_templates
        .iter()
        .any(ShiftTemplate::is_overnight);

    for &calendar in &request.calendars {
        // Dates created as the tail of an overnight shift, already counted
        let mut carried = BTreeSet::new();
        let mut date = request.start;
        while date <= request.end {
            let is_working = request.work_weekdays.contains(&date.weekday());
            let (day, created) = store.get_or_create_day(calendar, date, is_working)?;
            if !carried.contains(&date) {
                report.day(created);
            }

            if is_working {
                for template in &request.shift_templates {
                    let (_, created) = store.get_or_create_shift(day.id, template.id)?;
                    report.shift(created);
                }

                if let Some(next) = date.succ_opt().filter(|_| overnight) {
                    let (_, created) = store.get_or_create_day(calendar, next, true)?;
                    if created {
                        carried.insert(next);
                    }
                    // Dates inside the range are counted when the loop reaches them
                    if created || next > request.end {
                        report.day(created);
                    }
                }
            }

            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        debug!(calendar, "generated calendar days");
    }

    info!(
        days_created = report.days_created,
        shifts_created = report.shifts_created,
        "calendar generation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capplan_core::MemoryStore;
    use chrono::NaiveTime;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn day_shift() -> ShiftTemplate {
        ShiftTemplate::new(
            1,
            "Day Shift",
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        )
    }

    #[test]
    fn inverted_range_is_a_no_op() {
        let mut store = MemoryStore::new();
        let calendar = store.add_calendar("Plant");
        let request = GenerationRequest::new(vec![calendar], date(2025, 7, 10), date(2025, 7, 1));

        let report = generate_calendar(&mut store, &request).unwrap();
        assert_eq!(report, GenerationReport::default());
        assert!(store.calendar_days.is_empty());
    }

    #[test]
    fn weekends_get_days_but_no_shifts() {
        let mut store = MemoryStore::new();
        let calendar = store.add_calendar("Plant");
        store.add_shift_template(day_shift());
        // Friday through Monday
        let request = GenerationRequest::new(vec![calendar], date(2025, 7, 4), date(2025, 7, 7))
            .shift(day_shift());

        let report = generate_calendar(&mut store, &request).unwrap();
        assert_eq!(report.days_created, 4);
        assert_eq!(report.shifts_created, 2);

        let saturday = store
            .calendar_days
            .iter()
            .find(|d| d.date == date(2025, 7, 5))
            .unwrap();
        assert!(!saturday.is_working_day);
        assert!(store.shifts_on(calendar, date(2025, 7, 5)).is_empty());
    }

    fn night_shift(id: u64, start: u32, end: u32) -> ShiftTemplate {
        ShiftTemplate::new(
            id,
            "Night",
            NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
        )
    }

    #[test]
    fn overnight_tail_day_is_counted_once() {
        let mut store = MemoryStore::new();
        let calendar = store.add_calendar("Plant");
        store.add_shift_template(night_shift(1, 18, 2));
        store.add_shift_template(night_shift(2, 22, 4));
        // Friday only; both templates run into Saturday
        let request = GenerationRequest::new(vec![calendar], date(2025, 7, 4), date(2025, 7, 4))
            .shift(night_shift(1, 18, 2))
            .shift(night_shift(2, 22, 4));

        let report = generate_calendar(&mut store, &request).unwrap();
        assert_eq!(report.days_created, 2);
        assert_eq!(report.days_existing, 0);
        assert_eq!(report.shifts_created, 2);

        let rerun = generate_calendar(&mut store, &request).unwrap();
        assert_eq!(rerun.days_created, 0);
        assert_eq!(rerun.days_existing, 2);
        assert_eq!(store.calendar_days.len(), 2);
    }

    #[test]
    fn overnight_run_counts_each_date_of_the_range_once() {
        let mut store = MemoryStore::new();
        let calendar = store.add_calendar("Plant");
        store.add_shift_template(night_shift(1, 18, 2));
        // Monday through Wednesday, with Thursday as the tail
        let request = GenerationRequest::new(vec![calendar], date(2025, 7, 7), date(2025, 7, 9))
            .shift(night_shift(1, 18, 2));

        let report = generate_calendar(&mut store, &request).unwrap();
        assert_eq!(report.days_created, 4);
        assert_eq!(report.days_existing, 0);
        assert_eq!(report.shifts_created, 3);
    }

    #[test]
    fn unknown_calendar_is_an_error() {
        let mut store = MemoryStore::new();
        let request = GenerationRequest::new(vec![7], date(2025, 7, 7), date(2025, 7, 7));
        assert!(matches!(
            generate_calendar(&mut store, &request),
            Err(StoreError::CalendarNotFound(7))
        ));
    }
}
