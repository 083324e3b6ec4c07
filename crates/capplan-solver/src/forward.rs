//! Chunked Forward Scheduler
//!
//! Places one operation on the earliest free time shared by an eligible
//! machine and an eligible laborer, splitting it into chunks where a single
//! window is too short.
//!
//! ## Algorithm
//!
//! 1. Start the cursor at the operation's earliest permissible start.
//! 2. For every (machine, labor) pair, intersect their free windows on the
//!    cursor's date and clamp them to the cursor.
//! 3. Take the option with the earliest start; ties go to the lowest machine
//!    id, then the lowest labor id. Book `min(remaining, window length)`.
//! 4. Move the cursor to the chunk's end and repeat until no work remains.
//! 5. A day with no option moves the cursor to the next midnight. More than
//!    `lookahead_days` such days in a row makes the operation infeasible.
//!
//! Chunks are planned against committed state and committed together once
//! the whole duration is placed, so an infeasible operation leaves no rows.
//! Within one operation the cursor only moves forward, so planned chunks can
//! never collide with each other.

use std::time::{Duration, Instant};

use capplan_core::{
    delta_to_hours, hours_to_delta, AvailabilityStore, LaborId, MachineId, NewScheduleEntry,
    Operation, OperationId, OperationStore, ResourceKey, ScheduleEntry, ScheduleError,
    ScheduleState, ScheduleWriter, TimeWindow,
};
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::availability::free_windows_from;
use crate::intervals::intersect;
use crate::precedence::{earliest_start, EarliestStart};

/// Tunables for the forward scheduler
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Consecutive days without progress before an operation is infeasible
    pub lookahead_days: u32,
    /// Work below this many hours counts as done; never finer than a millisecond
    pub epsilon_hours: f64,
    /// Optional wall-clock bound per operation
    pub time_budget_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_days: 700,
            epsilon_hours: 1e-6,
            time_budget_ms: None,
        }
    }
}

impl SchedulerConfig {
    /// `epsilon_hours` raised to the millisecond resolution of bookings
    pub fn effective_epsilon(&self) -> f64 {
        self
            .epsilon_hours
            .max(delta_to_hours(TimeDelta::milliseconds(1)))
    }
}

/// A planned piece of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub machine: MachineId,
    pub labor: LaborId,
    pub window: TimeWindow,
}

impl Chunk {
    fn sort_key(&self) -> (NaiveDateTime, MachineId, LaborId) {
        (self.window.start, self.machine, self.labor)
    }
}

/// Chunks for one operation, not yet committed
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub operation: OperationId,
    pub earliest: EarliestStart,
    pub chunks: Vec<Chunk>,
}

impl Plan {
    pub fn start(&self) -> Option<NaiveDateTime> {
        self.chunks.first().map(|c| c.window.start)
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.chunks.last().map(|c| c.window.end)
    }

    pub fn hours(&self) -> f64 {
        self.chunks.iter().map(|c| c.window.hours()).sum()
    }
}

/// A successfully committed operation
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledOperation {
    pub operation: OperationId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub earliest: EarliestStart,
    pub required_end: Option<NaiveDateTime>,
    /// Committed rows in ascending start order
    pub entries: Vec<ScheduleEntry>,
}

impl ScheduledOperation {
    pub fn hours(&self) -> f64 {
        self.entries.iter().map(|e| e.window().hours()).sum()
    }

    /// Finished after its due date
    pub fn is_late(&self) -> bool {
        self.required_end.is_some_and(|due| self.end > due)
    }
}

/// Loop state threaded through the chunking walk
#[derive(Clone, Copy, Debug)]
struct Walk {
    cursor: NaiveDateTime,
    remaining: f64,
    idle_days: u32,
}

/// Greedy earliest-slot scheduler
#[derive(Clone, Debug)]
pub struct ForwardScheduler {
    pub config: SchedulerConfig,
    /// Reference "now"; no booking starts before it
    pub as_of: NaiveDateTime,
}

impl ForwardScheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            as_of: Local::now().naive_local(),
        }
    }

    /// Pin the reference instant
    pub fn as_of(mut self, now: NaiveDateTime) -> Self {
        self.as_of = now;
        self
    }

    /// Plan and commit `operation`
    pub fn schedule<S>(
        &self,
        store: &mut S,
        operation: &Operation,
    ) -> Result<ScheduledOperation, ScheduleError>
    where
        S: AvailabilityStore + OperationStore + ScheduleWriter,
    {
        let plan = self.plan(store, operation)?;
        let (Some(start), Some(end)) = (plan.start(), plan.end()) else {
            return Err(ScheduleError::NoRemainingWork {
                operation: operation.id,
            });
        };

        let mut entries = Vec::with_capacity(plan.chunks.len());
        for chunk in &plan.chunks {
            entries.push(store.commit(NewScheduleEntry {
                operation: operation.id,
                machine: chunk.machine,
                labor: chunk.labor,
                window: chunk.window,
                schedule_state: ScheduleState::Scheduled,
            })?);
        }

        info!(
            operation = operation.id,
            chunks = entries.len(),
            start = %start,
            end = %end,
            "scheduled operation"
        );
        Ok(ScheduledOperation {
            operation: operation.id,
            start,
            end,
            earliest: plan.earliest,
            required_end: operation.required_end,
            entries,
        })
    }

    /// Compute the chunks for `operation` without writing anything
    pub fn plan<S>(&self, store: &S, operation: &Operation) -> Result<Plan, ScheduleError>
    where
        S: AvailabilityStore + OperationStore + ?Sized,
    {
        let epsilon = self.config.effective_epsilon();
        if operation.remaining_time <= epsilon {
            return Err(ScheduleError::NoRemainingWork {
                operation: operation.id,
            });
        }

        let machines = candidate_machines(store, operation)?;
        let labor = candidate_labor(store, operation)?;
        let earliest = earliest_start(store, operation, self.as_of);
        debug!(
            operation = operation.id,
            earliest = %earliest.at,
            bound = ?earliest.bound,
            machines = machines.len(),
            labor = labor.len(),
            "planning operation"
        );

        let budget = self.config.time_budget_ms.map(Duration::from_millis);
        let started = Instant::now();
        let mut walk = Walk {
            cursor: earliest.at,
            remaining: operation.remaining_time,
            idle_days: 0,
        };
        let mut chunks = Vec::new();

        while walk.remaining > epsilon {
            if budget.is_some_and(|limit| started.elapsed() > limit) {
                return Err(ScheduleError::TimeBudgetExceeded {
                    operation: operation.id,
                });
            }

            match self.earliest_chunk(store, &machines, &labor, walk.cursor, walk.remaining) {
                Some(chunk) => {
                    debug!(
                        operation = operation.id,
                        machine = chunk.machine,
                        labor = chunk.labor,
                        window = %chunk.window,
                        "planned chunk"
                    );
                    walk.idle_days = 0;
                    walk.cursor = chunk.window.end;
                    walk.remaining -= chunk.window.hours();
                    chunks.push(chunk);
                }
                None => {
                    walk.idle_days += 1;
                    let next_day = walk.cursor.date().succ_opt();
                    match next_day {
                        Some(day) if walk.idle_days <= self.config.lookahead_days => {
                            walk.cursor = day.and_time(NaiveTime::MIN);
                        }
                        _ => {
                            return Err(ScheduleError::NoFeasibleSlot {
                                operation: operation.id,
                                lookahead_days: self.config.lookahead_days,
                            });
                        }
                    }
                }
            }
        }

        Ok(Plan {
            operation: operation.id,
            earliest,
            chunks,
        })
    }

    /// Best chunk starting at or after `cursor` on the cursor's date
    fn earliest_chunk<S>(
        &self,
        store: &S,
        machines: &[MachineId],
        labor: &[LaborId],
        cursor: NaiveDateTime,
        remaining: f64,
    ) -> Option<Chunk>
    where
        S: AvailabilityStore + ?Sized,
    {
        let epsilon = self.config.effective_epsilon();

        let machine_slots: Vec<(MachineId, Vec<TimeWindow>)> = machines
            .iter()
            .map(|&id| (id, free_windows_from(store, ResourceKey::Machine(id), cursor)))
            .filter(|(_, slots)| !slots.is_empty())
            .collect();
        if machine_slots.is_empty() {
            return None;
        }
        let labor_slots: Vec<(LaborId, Vec<TimeWindow>)> = labor
            .iter()
            .map(|&id| (id, free_windows_from(store, ResourceKey::Labor(id), cursor)))
            .filter(|(_, slots)| !slots.is_empty())
            .collect();

        let mut best: Option<Chunk> = None;
        for (machine, m_slots) in &machine_slots {
            for (laborer, l_slots) in &labor_slots {
                // Joint windows are sorted, so the first usable one is this pair's earliest.
                let usable = intersect(l_slots, m_slots).into_iter().find_map(|joint| {
                    let clamped = TimeWindow::new(joint.start.max(cursor), joint.end);
                    (clamped.hours() > epsilon).then_some(clamped)
                });
                let Some(window) = usable else {
                    continue;
                };

                let end = if remaining >= window.hours() {
                    window.end
                } else {
                    (window.start + hours_to_delta(remaining)).min(window.end)
                };
                let chunk = Chunk {
                    machine: *machine,
                    labor: *laborer,
                    window: TimeWindow::new(window.start, end),
                };
                if chunk.window.is_empty() {
                    continue;
                }
                if best.map_or(true, |b| chunk.sort_key() < b.sort_key()) {
                    best = Some(chunk);
                }
            }
        }
        best
    }
}

impl Default for ForwardScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Assigned machine, the task's primary machine, and the task's alternates
fn candidate_machines<S>(store: &S, operation: &Operation) -> Result<Vec<MachineId>, ScheduleError>
where
    S: AvailabilityStore + OperationStore + ?Sized,
{
    let task = operation.task.and_then(|id| store.task(id));

    let mut machines: Vec<MachineId> = operation.machine.into_iter().collect();
    if let Some(task) = &task {
        machines.extend(task.primary_machine);
        machines.extend(task.alternate_machines.iter().copied());
    }
    machines.sort_unstable();
    machines.dedup();
    machines.retain(|&id| store.machine(id).is_some());

    if machines.is_empty() {
        return Err(ScheduleError::NoEligibleResource {
            operation: operation.id,
            reason: "no machine assigned to the operation or its task".into(),
        });
    }
    Ok(machines)
}

/// Every laborer in the operation's work center
fn candidate_labor<S>(store: &S, operation: &Operation) -> Result<Vec<LaborId>, ScheduleError>
where
    S: OperationStore + ?Sized,
{
    let Some(workcenter) = operation.workcenter else {
        return Err(ScheduleError::NoEligibleResource {
            operation: operation.id,
            reason: "operation has no work center".into(),
        });
    };
    let labor: Vec<LaborId> = store
        .workcenter_labor(workcenter)
        .iter()
        .map(|l| l.id)
        .collect();
    if labor.is_empty() {
        return Err(ScheduleError::NoEligibleResource {
            operation: operation.id,
            reason: format!("work center {} has no labor", workcenter),
        });
    }
    Ok(labor)
}
