//! # capplan-solver
//!
//! Finite-capacity forward scheduling over machine and labor calendars.
//!
//! This crate provides:
//! - Calendar generation from shift templates
//! - Free-window computation per resource and date
//! - Precedence and material-receipt start bounds
//! - Chunked earliest-slot scheduling and batch runs
//! - Validation of a committed schedule
//!
//! ## Example
//!
//! ```rust,ignore
//! use capplan_core::MemoryStore;
//! use capplan_solver::{run_batch, ForwardScheduler};
//!
//! let mut store: MemoryStore = serde_json::from_str(&dataset)?;
//! let report = run_batch(&mut store, &ForwardScheduler::new())?;
//! println!("{} scheduled", report.scheduled_count());
//! ```

pub mod availability;
pub mod batch;
pub mod forward;
pub mod generator;
pub mod intervals;
pub mod precedence;
pub mod validate;

pub use availability::{free_windows, free_windows_from, shift_windows};
pub use batch::{run_batch, BatchReport, OperationOutcome};
pub use forward::{Chunk, ForwardScheduler, Plan, ScheduledOperation, SchedulerConfig};
pub use generator::{generate_calendar, GenerationReport, GenerationRequest};
pub use intervals::{intersect, normalize, subtract};
pub use precedence::{earliest_start, EarliestStart, StartBound};
pub use validate::{validate_schedule, Violation, ViolationKind};
