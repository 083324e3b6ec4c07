//! Output formatting for CLI commands
//!
//! ## Exit Code Semantics
//!
//! | Exit Code | Meaning |
//! |-----------|---------|
//! | 0 | Success |
//! | 1 | Failure: violations found, infeasible operations under `--strict`, or a fatal error |

use std::fmt::Write as _;
use std::process;

use capplan_core::OperationId;
use capplan_solver::{BatchReport, GenerationReport, OperationOutcome, Violation};
use chrono::NaiveDateTime;
use serde::Serialize;

// ============================================================================
// Exit Code
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
}

impl ExitCode {
    /// Failure when `count` problems were found
    pub fn from_problem_count(count: usize) -> Self {
        if count > 0 {
            ExitCode::Failure
        } else {
            ExitCode::Success
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code())
    }
}

// ============================================================================
// Output Format
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Text,
    Json,
}

// ============================================================================
// Batch Report
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeRow {
    Scheduled {
        operation: OperationId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        chunks: usize,
        hours: f64,
        late: bool,
    },
    Infeasible {
        operation: OperationId,
        reason: String,
    },
}

impl From<&OperationOutcome> for OutcomeRow {
    fn from(outcome: &OperationOutcome) -> Self {
        match outcome {
            OperationOutcome::Scheduled(done) => OutcomeRow::Scheduled {
                operation: done.operation,
                start: done.start,
                end: done.end,
                chunks: done.entries.len(),
                hours: done.hours(),
                late: done.is_late(),
            },
            OperationOutcome::Infeasible { operation, reason } => OutcomeRow::Infeasible {
                operation: *operation,
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchSummary {
    cleared: usize,
    scheduled: usize,
    infeasible: usize,
    operations: Vec<OutcomeRow>,
}

pub fn render_batch(report: &BatchReport, format: Format) -> String {
    match format {
        Format::Json => {
            let summary = BatchSummary {
                cleared: report.cleared,
                scheduled: report.scheduled_count(),
                infeasible: report.infeasible_count(),
                operations: report.outcomes.iter().map(OutcomeRow::from).collect(),
            };
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        }
        Format::Text => {
            let mut out = String::new();
            for outcome in &report.outcomes {
                match outcome {
                    OperationOutcome::Scheduled(done) => {
                        let _ = writeln!(
                            out,
                            "operation {:>6}  scheduled   {} -> {}  ({} chunk{}, {:.2}h){}",
                            done.operation,
                            done.start.format("%Y-%m-%d %H:%M"),
                            done.end.format("%Y-%m-%d %H:%M"),
                            done.entries.len(),
                            if done.entries.len() == 1 { "" } else { "s" },
                            done.hours(),
                            if done.is_late() { "  late" } else { "" }
                        );
                    }
                    OperationOutcome::Infeasible { operation, reason } => {
                        let _ = writeln!(out, "operation {:>6}  infeasible  {}", operation, reason);
                    }
                }
            }
            let _ = writeln!(
                out,
                "\n{} scheduled, {} infeasible ({} previous bookings cleared)",
                report.scheduled_count(),
                report.infeasible_count(),
                report.cleared
            );
            out
        }
    }
}

// ============================================================================
// Violations
// ============================================================================

#[derive(Debug, Serialize)]
struct ViolationRow<'a> {
    kind: String,
    message: &'a str,
    entries: &'a [u64],
}

pub fn render_violations(violations: &[Violation], format: Format) -> String {
    match format {
        Format::Json => {
            let rows: Vec<_> = violations
                .iter()
                .map(|v| ViolationRow {
                    kind: format!("{:?}", v.kind),
                    message: &v.message,
                    entries: &v.entries,
                })
                .collect();
            serde_json::to_string_pretty(&rows).unwrap_or_default()
        }
        Format::Text if violations.is_empty() => "schedule is valid\n".to_string(),
        Format::Text => {
            let mut out = String::new();
            for violation in violations {
                let _ = writeln!(out, "error: {}", violation);
            }
            let _ = writeln!(out, "\n{} violation(s)", violations.len());
            out
        }
    }
}

pub fn render_generation(report: &GenerationReport, format: Format) -> String {
    match format {
        Format::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        Format::Text => format!(
            "days: {} created, {} existing\nshifts: {} created, {} existing\n",
            report.days_created, report.days_existing, report.shifts_created, report.shifts_existing
        ),
    }
}
