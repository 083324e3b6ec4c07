//! Interval arithmetic over sorted window lists
//!
//! All functions work on half-open `[start, end)` windows. Lists passed in
//! are expected sorted ascending by start and pairwise disjoint, which is the
//! shape `normalize` produces.

use capplan_core::TimeWindow;

/// Sort, drop empty windows, and merge windows that overlap or touch
pub fn normalize(mut windows: Vec<TimeWindow>) -> Vec<TimeWindow> {
    windows.retain(|w| !w.is_empty());
    windows.sort_unstable();

    let mut merged: Vec<TimeWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if window.start <= last.end => {
                last.end = last.end.max(window.end);
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// Windows where both inputs are free at the same time
///
/// Two-pointer merge: whichever current window ends first is advanced.
pub fn intersect(a: &[TimeWindow], b: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut result = Vec::new();
    if a.is_empty() || b.is_empty() {
        return result;
    }

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let latest_start = a[i].start.max(b[j].start);
        let earliest_end = a[i].end.min(b[j].end);
        if latest_start < earliest_end {
            result.push(TimeWindow::new(latest_start, earliest_end));
        }

        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    result
}

/// Remove every blocked interval from `window`
///
/// `blocked` must be sorted by start; it may extend past either side of the window.
pub fn subtract(window: TimeWindow, blocked: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut free = Vec::new();
    let mut current = window.start;

    for block in blocked {
        if block.end <= current || block.start >= window.end {
            continue;
        }
        if current < block.start {
            free.push(TimeWindow::new(current, block.start));
        }
        current = current.max(block.end);
        if current >= window.end {
            break;
        }
    }
    if current < window.end {
        free.push(TimeWindow::new(current, window.end));
    }
    free
}
