//! Batch scheduler run
//!
//! Clears every committed booking, then schedules the backlog one operation
//! at a time in ascending `(priority, required_start)` order. Operations that
//! cannot be placed are reported and skipped; any other error aborts the run.

use capplan_core::{AvailabilityStore, OperationId, OperationStore, ScheduleError, ScheduleWriter};
use tracing::{info, warn};

use crate::forward::{ForwardScheduler, ScheduledOperation};

/// Result of one operation within a batch
#[derive(Debug)]
pub enum OperationOutcome {
    Scheduled(ScheduledOperation),
    Infeasible {
        operation: OperationId,
        reason: ScheduleError,
    },
}

impl OperationOutcome {
    pub fn operation(&self) -> OperationId {
        match self {
            OperationOutcome::Scheduled(done) => done.operation,
            OperationOutcome::Infeasible { operation, .. } => *operation,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, OperationOutcome::Scheduled(_))
    }
}

/// Summary of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Bookings removed before scheduling
    pub cleared: usize,
    /// One outcome per operation, in processing order
    pub outcomes: Vec<OperationOutcome>,
}

impl BatchReport {
    pub fn scheduled_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_scheduled()).count()
    }

    pub fn infeasible_count(&self) -> usize {
        self.outcomes.len() - self.scheduled_count()
    }

    pub fn outcome(&self, operation: OperationId) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.operation() == operation)
    }
}

/// Reschedule the whole backlog
pub fn run_batch<S>(
    store: &mut S,
    scheduler: &ForwardScheduler,
) -> Result<BatchReport, ScheduleError>
where
    S: AvailabilityStore + OperationStore + ScheduleWriter,
{
    let cleared = store.clear_schedule()?;

    let mut backlog = store.unscheduled_operations();
    backlog.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.required_start.cmp(&b.required_start))
            .then(a.id.cmp(&b.id))
    });

    let mut report = BatchReport {
        cleared,
        outcomes: Vec::with_capacity(backlog.len()),
    };
    for operation in &backlog {
        match scheduler.schedule(store, operation) {
            Ok(done) => report.outcomes.push(OperationOutcome::Scheduled(done)),
            Err(reason) if reason.is_infeasible() => {
                warn!(operation = operation.id, %reason, "skipping operation");
                report.outcomes.push(OperationOutcome::Infeasible {
                    operation: operation.id,
                    reason,
                });
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        cleared,
        scheduled = report.scheduled_count(),
        infeasible = report.infeasible_count(),
        "batch run finished"
    );
    Ok(report)
}
