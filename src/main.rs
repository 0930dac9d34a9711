//! MiniMalloc command-line driver.
//!
//! Reads a problem CSV, solves it, and writes the placement back out as CSV.
//! Diagnostics go to stderr; the exit code is 0 on success and 1 on any
//! load, solve, validation, or write failure.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use minimalloc::csv::{from_csv_file, to_csv};
use minimalloc::solver::{SolveStatus, Solver, SolverParams};
use minimalloc::validator::{validate, ValidationResult};

#[derive(Parser)]
#[command(name = "minimalloc")]
#[command(version)]
#[command(about = "Exact static memory allocation solver", long_about = None)]
struct Cli {
    /// The path to the input CSV file
    #[arg(long)]
    input: PathBuf,

    /// The path to the output CSV file
    #[arg(long)]
    output: PathBuf,

    /// The maximum memory capacity
    #[arg(long, default_value_t = 0)]
    capacity: i64,

    /// Validate the solver's output
    #[arg(long)]
    validate: bool,

    /// Time limit for the solver (e.g. '10s', '5m', '1h', 'inf')
    #[arg(long, default_value = "")]
    timeout: String,

    /// Search for the smallest feasible capacity; a positive --capacity
    /// becomes the upper bound of the search
    #[arg(long)]
    minimize_capacity: bool,

    /// Static preordering heuristics to attempt (comma-separated)
    #[arg(long, default_value = "WAT,TAW,TWA")]
    preordering_heuristics: String,

    /// Explore canonical solutions only (default: on)
    #[arg(long, overrides_with = "no_canonical_only")]
    canonical_only: bool,
    /// Disable canonical solutions exploration
    #[arg(long, overrides_with = "canonical_only")]
    no_canonical_only: bool,

    /// Perform section inference (default: on)
    #[arg(long, overrides_with = "no_section_inference")]
    section_inference: bool,
    /// Disable section inference
    #[arg(long, overrides_with = "section_inference")]
    no_section_inference: bool,

    /// Dynamically order buffers (default: on)
    #[arg(long, overrides_with = "no_dynamic_ordering")]
    dynamic_ordering: bool,
    /// Disable dynamic ordering
    #[arg(long, overrides_with = "dynamic_ordering")]
    no_dynamic_ordering: bool,

    /// Check for dominated solutions that leave gaps (default: on)
    #[arg(long, overrides_with = "no_check_dominance")]
    check_dominance: bool,
    /// Disable dominance checking
    #[arg(long, overrides_with = "check_dominance")]
    no_check_dominance: bool,

    /// Use min offsets for lower bounds on section floors (default: on)
    #[arg(long, overrides_with = "no_unallocated_floor")]
    unallocated_floor: bool,
    /// Disable the unallocated floor bound
    #[arg(long, overrides_with = "unallocated_floor")]
    no_unallocated_floor: bool,

    /// Statically preorder buffers (default: on)
    #[arg(long, overrides_with = "no_static_preordering")]
    static_preordering: bool,
    /// Disable static preordering
    #[arg(long, overrides_with = "static_preordering")]
    no_static_preordering: bool,

    /// Dynamically decompose buffers (default: on)
    #[arg(long, overrides_with = "no_dynamic_decomposition")]
    dynamic_decomposition: bool,
    /// Disable dynamic decomposition
    #[arg(long, overrides_with = "dynamic_decomposition")]
    no_dynamic_decomposition: bool,

    /// Require monotonic solution floor increase (default: on)
    #[arg(long, overrides_with = "no_monotonic_floor")]
    monotonic_floor: bool,
    /// Disable the monotonic floor requirement
    #[arg(long, overrides_with = "monotonic_floor")]
    no_monotonic_floor: bool,

    /// Prune alternate placements for buffers with nothing overhead
    /// (default: on)
    #[arg(long, overrides_with = "no_hatless_pruning")]
    hatless_pruning: bool,
    /// Disable hatless pruning
    #[arg(long, overrides_with = "hatless_pruning")]
    no_hatless_pruning: bool,
}

/// Resolve an on-by-default `--flag` / `--no-flag` pair.
#[inline]
fn enabled(positive: bool, negative: bool) -> bool {
    positive || !negative
}

/// Parse a duration: bare seconds, an `s`/`m`/`h` suffix, or infinity.
fn parse_duration(text: &str) -> Result<Option<Duration>, String> {
    let text = text.trim().to_ascii_lowercase();
    if text.is_empty() || matches!(text.as_str(), "inf" | "infinite" | "infinity") {
        return Ok(None);
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return duration_from_seconds(seconds, &text);
    }
    for (suffix, multiplier) in [("s", 1.0), ("m", 60.0), ("h", 3600.0)] {
        if let Some(stripped) = text.strip_suffix(suffix) {
            if let Ok(value) = stripped.parse::<f64>() {
                return duration_from_seconds(value * multiplier, &text);
            }
        }
    }
    Err(format!("invalid duration format: '{text}'"))
}

fn duration_from_seconds(seconds: f64, text: &str) -> Result<Option<Duration>, String> {
    if seconds.is_infinite() && seconds > 0.0 || seconds >= 1e15 {
        return Ok(None);
    }
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("invalid duration format: '{text}'"));
    }
    Ok(Some(Duration::from_secs_f64(seconds)))
}

fn describe(status: SolveStatus) -> &'static str {
    match status {
        SolveStatus::Infeasible => "no feasible allocation exists",
        SolveStatus::Timeout => "the time limit was reached",
        SolveStatus::Cancelled => "the solve was cancelled",
        SolveStatus::Solved | SolveStatus::Idle => "unexpected solver state",
    }
}

fn run(cli: Cli) -> i32 {
    let mut problem = match from_csv_file(&cli.input) {
        Ok(problem) => problem,
        Err(e) => {
            eprintln!("Error reading input file: {e}");
            return 1;
        }
    };

    if cli.capacity > 0 {
        problem.capacity = cli.capacity;
    } else if !cli.minimize_capacity {
        eprintln!("Error: a positive --capacity or --minimize-capacity is required");
        return 1;
    }

    let timeout = match parse_duration(&cli.timeout) {
        Ok(timeout) => timeout,
        Err(message) => {
            eprintln!("Error: {message}");
            return 1;
        }
    };

    let params = SolverParams {
        timeout,
        canonical_only: enabled(cli.canonical_only, cli.no_canonical_only),
        section_inference: enabled(cli.section_inference, cli.no_section_inference),
        dynamic_ordering: enabled(cli.dynamic_ordering, cli.no_dynamic_ordering),
        check_dominance: enabled(cli.check_dominance, cli.no_check_dominance),
        unallocated_floor: enabled(cli.unallocated_floor, cli.no_unallocated_floor),
        static_preordering: enabled(cli.static_preordering, cli.no_static_preordering),
        dynamic_decomposition: enabled(cli.dynamic_decomposition, cli.no_dynamic_decomposition),
        monotonic_floor: enabled(cli.monotonic_floor, cli.no_monotonic_floor),
        hatless_pruning: enabled(cli.hatless_pruning, cli.no_hatless_pruning),
        minimize_capacity: cli.minimize_capacity,
        preordering_heuristics: cli
            .preordering_heuristics
            .split(',')
            .map(str::trim)
            .filter(|spec| !spec.is_empty())
            .map(String::from)
            .collect(),
    };

    let mut solver = match Solver::new(params) {
        Ok(solver) => solver,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    let start = Instant::now();
    let solution = solver.solve(&problem);
    eprintln!("Elapsed time: {:.3}s", start.elapsed().as_secs_f64());

    let Some(solution) = solution else {
        eprintln!("Error: solver failed: {}", describe(solver.status()));
        return 1;
    };

    // A minimized capacity may be smaller than anything the user supplied;
    // validate against the space the solution actually uses.
    if cli.minimize_capacity {
        if let Some(height) = solution.height {
            problem.capacity = problem.capacity.max(height);
        }
    }

    if cli.validate {
        let verdict = validate(&problem, &solution);
        let passed = verdict == ValidationResult::Good;
        eprintln!("{}", if passed { "PASS" } else { "FAIL" });
        if !passed {
            return 1;
        }
    }

    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error writing output file: {e}");
                return 1;
            }
        }
    }
    if let Err(e) = fs::write(&cli.output, to_csv(&problem, Some(&solution))) {
        eprintln!("Error writing output file: {e}");
        return 1;
    }

    0
}

fn main() {
    process::exit(run(Cli::parse()));
}
