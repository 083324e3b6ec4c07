//! capplan CLI - Finite-Capacity Production Scheduler
//!
//! Command-line interface for generating calendars, scheduling the operation
//! backlog, and validating committed schedules over JSON datasets.

mod dataset;
mod report;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use capplan_core::ShiftTemplate;
use capplan_solver::{
    generate_calendar, run_batch, validate_schedule, ForwardScheduler, GenerationRequest,
    SchedulerConfig,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use report::{ExitCode, Format};

#[derive(Parser)]
#[command(name = "capplan")]
#[command(author, version, about = "Finite-capacity production scheduler", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate calendar days and shifts over a date range
    Generate {
        /// Dataset file (JSON)
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// Calendar id(s) to generate
        #[arg(long = "calendar", value_name = "ID", required = true, num_args = 1..)]
        calendars: Vec<u64>,

        /// Shift template id(s) to attach to working days
        #[arg(long = "shift", value_name = "ID", num_args = 1..)]
        shifts: Vec<u64>,

        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Working weekdays, comma-separated (default mon-fri)
        #[arg(long, value_delimiter = ',', value_parser = parse_weekday)]
        weekdays: Option<Vec<Weekday>>,

        /// Write the dataset here instead of in place
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Clear and reschedule every operation
    Schedule {
        /// Dataset file (JSON)
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// Reference instant; no booking starts earlier (default: now)
        #[arg(long, value_parser = parse_instant)]
        as_of: Option<NaiveDateTime>,

        /// TOML file with a [scheduler] table
        #[arg(long, env = "CAPPLAN_CONFIG")]
        config: Option<PathBuf>,

        /// Override the lookahead bound in days
        #[arg(long)]
        lookahead_days: Option<u32>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Write the dataset with its new schedule here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit 1 when any operation could not be scheduled
        #[arg(long)]
        strict: bool,
    },

    /// Validate the schedule rows of a dataset
    Check {
        /// Dataset file (JSON)
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

fn parse_weekday(s: &str) -> Result<Weekday, String> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| format!("invalid weekday '{}'", s))
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM[:SS]` or a bare date
fn parse_instant(s: &str) -> Result<NaiveDateTime, String> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| format!("invalid date/time '{}'", s))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn emit(text: &str) {
    print!("{}", text);
    if !text.ends_with('\n') {
        println!();
    }
}

fn main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Generate {
            data,
            calendars,
            shifts,
            from,
            to,
            weekdays,
            output,
            format,
        } => cmd_generate(data, calendars, shifts, from, to, weekdays, output, format)?,
        Commands::Schedule {
            data,
            as_of,
            config,
            lookahead_days,
            format,
            output,
            strict,
        } => cmd_schedule(data, as_of, config, lookahead_days, format, output, strict)?,
        Commands::Check { data, format } => cmd_check(data, format)?,
    };
    Ok(code.into())
}

fn cmd_generate(
    data: PathBuf,
    calendars: Vec<u64>,
    shifts: Vec<u64>,
    from: NaiveDate,
    to: NaiveDate,
    weekdays: Option<Vec<Weekday>>,
    output: Option<PathBuf>,
    format: Format,
) -> Result<ExitCode> {
    let mut store = dataset::load(&data)?;

    let templates: Vec<ShiftTemplate> = shifts
        .iter()
        .map(|&id| {
            store
                .shift_templates
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .with_context(|| format!("shift template {} not found in {}", id, data.display()))
        })
        .collect::<Result<_>>()?;

    let mut request = GenerationRequest::new(calendars, from, to);
    if let Some(weekdays) = weekdays {
        request = request.weekdays(weekdays);
    }
    for template in templates {
        request = request.shift(template);
    }

    let report = generate_calendar(&mut store, &request)?;
    let target = output.unwrap_or(data);
    dataset::save(&store, &target)?;
    info!(path = %target.display(), "wrote dataset");

    emit(&report::render_generation(&report, format));
    Ok(ExitCode::Success)
}

fn cmd_schedule(
    data: PathBuf,
    as_of: Option<NaiveDateTime>,
    config: Option<PathBuf>,
    lookahead_days: Option<u32>,
    format: Format,
    output: Option<PathBuf>,
    strict: bool,
) -> Result<ExitCode> {
    let mut store = dataset::load(&data)?;

    let mut settings = match &config {
        Some(path) => dataset::load_config(path)?,
        None => SchedulerConfig::default(),
    };
    if let Some(days) = lookahead_days {
        settings.lookahead_days = days;
    }
    if settings.epsilon_hours <= 0.0 {
        bail!("epsilon_hours must be positive");
    }

    let mut scheduler = ForwardScheduler::with_config(settings);
    if let Some(now) = as_of {
        scheduler = scheduler.as_of(now);
    }

    let report = run_batch(&mut store, &scheduler)?;
    if let Some(path) = &output {
        dataset::save(&store, path)?;
        info!(path = %path.display(), "wrote dataset");
    }

    emit(&report::render_batch(&report, format));
    if strict {
        Ok(ExitCode::from_problem_count(report.infeasible_count()))
    } else {
        Ok(ExitCode::Success)
    }
}

fn cmd_check(data: PathBuf, format: Format) -> Result<ExitCode> {
    let store = dataset::load(&data)?;
    let epsilon = SchedulerConfig::default().epsilon_hours;
    let violations = validate_schedule(&store, &store.schedule, epsilon);

    emit(&report::render_violations(&violations, format));
    Ok(ExitCode::from_problem_count(violations.len()))
}
