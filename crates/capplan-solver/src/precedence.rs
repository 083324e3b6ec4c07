//! Precedence Resolver
//!
//! The earliest instant an operation may start: its own required start,
//! pushed later by the completion of the previous operation in the same
//! production order, by the receipt date of that operation's purchase line,
//! and finally by "now".

use capplan_core::{Operation, OperationId, OperationStore, PurchaseOrderLineId, ScheduleState};
use chrono::NaiveDateTime;

/// What determined an earliest start
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartBound {
    RequiredStart,
    /// Completion of the preceding operation
    Predecessor(OperationId),
    /// Final receipt of the preceding operation's purchase line
    Receipt(PurchaseOrderLineId),
    /// Bookings never start in the past
    Now,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EarliestStart {
    pub at: NaiveDateTime,
    pub bound: StartBound,
}

impl EarliestStart {
    fn raise(&mut self, candidate: NaiveDateTime, bound: StartBound) {
        if candidate > self.at {
            self.at = candidate;
            self.bound = bound;
        }
    }
}

/// Earliest permissible start for `operation` given committed state
pub fn earliest_start<S: OperationStore + ?Sized>(
    store: &S,
    operation: &Operation,
    now: NaiveDateTime,
) -> EarliestStart {
    let mut earliest = EarliestStart {
        at: operation.required_start,
        bound: StartBound::RequiredStart,
    };

    if let Some(previous) = store.predecessor(operation) {
        let finished = store
            .operation_schedule(previous.id)
            .iter()
            .filter(|e| e.schedule_state == ScheduleState::Scheduled)
            .map(|e| e.end)
            .max();
        if let Some(finished) = finished {
            earliest.raise(finished, StartBound::Predecessor(previous.id));
        }

        let receipt = previous
            .purchase_line
            .and_then(|id| store.purchase_line(id))
            .and_then(|line| line.final_receive_date.map(|at| (line.id, at)));
        if let Some((line, received)) = receipt {
            earliest.raise(received, StartBound::Receipt(line));
        }
    }

    earliest.raise(now, StartBound::Now);
    earliest
}
