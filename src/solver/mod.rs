//! The exact solver: parameter surface, heuristic scheduling, capacity
//! minimization, and irreducible-infeasible-subset extraction.
//!
//! A [`Solver`] owns no problem data; each [`Solver::solve`] call sweeps the
//! problem, tries the configured preordering heuristics left to right under a
//! shared deadline, and runs the backtracking search per partition. The
//! search is exact: infeasibility proven under any heuristic is final, so a
//! later heuristic only matters after an earlier one times out.

pub mod preorder;
mod search;

use crate::problem::{Problem, Solution};
use crate::sweeper::{sweep, SweepResult};
use preorder::{compute_preorder_data, HeuristicError, PreorderHeuristic};
use search::{run_search, SearchFlags, Stop};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tunable solver behavior. All optimizations default to on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverParams {
    /// Wall-clock limit; `None` means no limit.
    pub timeout: Option<Duration>,
    /// Explore canonical solutions only.
    pub canonical_only: bool,
    /// Propagate per-section feasibility after each assignment.
    pub section_inference: bool,
    /// Pick the unassigned buffer with the smallest domain first.
    pub dynamic_ordering: bool,
    /// Skip offsets dominated by an already-failed lower offset.
    pub check_dominance: bool,
    /// Use occupied-prefix lower bounds on section floors.
    pub unallocated_floor: bool,
    /// Rank buffers by a preordering heuristic before the search.
    pub static_preordering: bool,
    /// Solve disconnected residual groups independently.
    pub dynamic_decomposition: bool,
    /// Prefer decisions resting on the lowest section floor.
    pub monotonic_floor: bool,
    /// Place a buffer as high as possible once nothing can sit above it.
    pub hatless_pruning: bool,
    /// Search for the smallest feasible capacity instead of a single solve.
    pub minimize_capacity: bool,
    /// Heuristic specs tried left to right under a shared deadline.
    pub preordering_heuristics: Vec<String>,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            timeout: None,
            canonical_only: true,
            section_inference: true,
            dynamic_ordering: true,
            check_dominance: true,
            unallocated_floor: true,
            static_preordering: true,
            dynamic_decomposition: true,
            monotonic_floor: true,
            hatless_pruning: true,
            minimize_capacity: false,
            preordering_heuristics: vec!["WAT".into(), "TAW".into(), "TWA".into()],
        }
    }
}

/// How the last `solve` call ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SolveStatus {
    /// No solve has run yet.
    #[default]
    Idle,
    Solved,
    Infeasible,
    Timeout,
    Cancelled,
}

/// A handle for requesting cancellation from another thread.
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }
}

/// The exact static-allocation solver.
#[derive(Debug)]
pub struct Solver {
    params: SolverParams,
    heuristics: Vec<PreorderHeuristic>,
    backtracks: u64,
    status: SolveStatus,
    cancel: Arc<AtomicBool>,
}

impl Solver {
    /// Build a solver, parsing the configured heuristic specs.
    pub fn new(params: SolverParams) -> Result<Self, HeuristicError> {
        let heuristics = params
            .preordering_heuristics
            .iter()
            .map(|spec| PreorderHeuristic::parse(spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            params,
            heuristics,
            backtracks: 0,
            status: SolveStatus::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The configured parameters.
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Backtracks consumed by the most recent `solve` call.
    pub fn backtracks(&self) -> u64 {
        self.backtracks
    }

    /// Status of the most recent `solve` call.
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Request cancellation of a running (or upcoming) solve. Idempotent.
    pub fn cancel(&self) {
        self.cancel.store(true, AtomicOrdering::Relaxed);
    }

    /// A cloneable handle for cancelling from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(Arc::clone(&self.cancel))
    }

    /// Clear counters, status, and any pending cancellation.
    pub fn reset(&mut self) {
        self.backtracks = 0;
        self.status = SolveStatus::Idle;
        self.cancel.store(false, AtomicOrdering::Relaxed);
    }

    /// Solve the problem. Returns `None` on infeasibility, timeout, or
    /// cancellation; `status()` distinguishes them.
    pub fn solve(&mut self, problem: &Problem) -> Option<Solution> {
        self.backtracks = 0;
        self.status = SolveStatus::Idle;
        let start = Instant::now();
        let deadline = self.params.timeout.map(|timeout| start + timeout);

        if self.cancel.load(AtomicOrdering::Relaxed) {
            self.status = SolveStatus::Cancelled;
            return None;
        }

        let swept = sweep(problem);
        let offsets = if self.params.minimize_capacity {
            self.minimize(problem, &swept, deadline)
        } else {
            self.attempt(problem, &swept, problem.capacity, deadline)
        }?;
        Some(Solution::from_offsets(offsets, problem))
    }

    /// Find a minimal set of buffers whose sub-problem is still infeasible.
    ///
    /// Buffers are dropped one at a time in index order; a drop is kept
    /// whenever the remainder stays provably infeasible. Returns an empty
    /// set when the problem is feasible (or cannot be proven infeasible
    /// within the configured budget).
    pub fn compute_irreducible_infeasible_subset(&self, problem: &Problem) -> Vec<usize> {
        let mut params = self.params.clone();
        params.minimize_capacity = false;
        let mut inner = Solver {
            params,
            heuristics: self.heuristics.clone(),
            backtracks: 0,
            status: SolveStatus::Idle,
            cancel: Arc::clone(&self.cancel),
        };

        let subproblem = |kept: &[usize]| Problem {
            buffers: kept
                .iter()
                .map(|&b| problem.buffers[b].clone())
                .collect(),
            capacity: problem.capacity,
        };

        if inner.solve(problem).is_some() || inner.status() != SolveStatus::Infeasible {
            return Vec::new();
        }

        let mut kept: Vec<usize> = (0..problem.buffers.len()).collect();
        let mut position = 0;
        while position < kept.len() {
            let candidate: Vec<usize> = kept
                .iter()
                .copied()
                .filter(|&b| b != kept[position])
                .collect();
            let sub = subproblem(&candidate);
            if inner.solve(&sub).is_none() && inner.status() == SolveStatus::Infeasible {
                kept = candidate;
            } else {
                position += 1;
            }
        }
        kept
    }

    /// Try every configured ordering in turn, splitting the remaining time
    /// budget evenly across the remaining attempts.
    fn attempt(
        &mut self,
        problem: &Problem,
        swept: &SweepResult,
        capacity: i64,
        deadline: Option<Instant>,
    ) -> Option<Vec<i64>> {
        let data = compute_preorder_data(problem, swept);
        let n = problem.buffers.len();

        let rankings: Vec<Vec<usize>> =
            if self.params.static_preordering && !self.heuristics.is_empty() {
                self.heuristics
                    .iter()
                    .map(|heuristic| {
                        let mut order: Vec<usize> = (0..n).collect();
                        order.sort_by(|&a, &b| heuristic.compare(&data[a], &data[b]));
                        let mut rank = vec![0usize; n];
                        for (position, &idx) in order.iter().enumerate() {
                            rank[idx] = position;
                        }
                        rank
                    })
                    .collect()
            } else {
                vec![(0..n).collect()]
            };

        let flags = SearchFlags {
            canonical_only: self.params.canonical_only,
            section_inference: self.params.section_inference,
            dynamic_ordering: self.params.dynamic_ordering,
            check_dominance: self.params.check_dominance,
            unallocated_floor: self.params.unallocated_floor,
            dynamic_decomposition: self.params.dynamic_decomposition,
            monotonic_floor: self.params.monotonic_floor,
            hatless_pruning: self.params.hatless_pruning,
        };

        let attempts = rankings.len();
        for (k, rank) in rankings.iter().enumerate() {
            let attempt_deadline = match deadline {
                Some(final_deadline) if k + 1 < attempts => {
                    let now = Instant::now();
                    if now >= final_deadline {
                        Some(final_deadline)
                    } else {
                        let share = (final_deadline - now) / (attempts - k) as u32;
                        Some(now + share)
                    }
                }
                other => other,
            };

            let output = run_search(
                problem,
                swept,
                flags,
                capacity,
                rank,
                attempt_deadline,
                &self.cancel,
            );
            self.backtracks += output.backtracks;

            match output.stop {
                None => {
                    if let Some(offsets) = output.offsets {
                        self.status = SolveStatus::Solved;
                        return Some(offsets);
                    }
                    self.status = SolveStatus::Infeasible;
                    return None;
                }
                Some(Stop::Cancelled) => {
                    self.status = SolveStatus::Cancelled;
                    return None;
                }
                Some(Stop::Timeout) => {
                    let out_of_time =
                        deadline.map_or(false, |final_deadline| Instant::now() >= final_deadline);
                    if k + 1 == attempts || out_of_time {
                        self.status = SolveStatus::Timeout;
                        return None;
                    }
                }
            }
        }

        self.status = SolveStatus::Timeout;
        None
    }

    /// Binary search for the smallest feasible capacity.
    fn minimize(
        &mut self,
        problem: &Problem,
        swept: &SweepResult,
        deadline: Option<Instant>,
    ) -> Option<Vec<i64>> {
        let max_load = swept.section_loads().into_iter().max().unwrap_or(0);
        let max_size = problem.buffers.iter().map(|b| b.size).max().unwrap_or(0);
        let mut lo = max_load.max(max_size);
        let mut hi = if problem.capacity > 0 {
            problem.capacity
        } else {
            problem.buffers.iter().map(|b| b.size).sum()
        };

        if hi < lo {
            // The bound already proves infeasibility; run one probe at the
            // upper bound so the failure is witnessed by the search.
            return self.attempt(problem, swept, hi, deadline);
        }

        let mut best: Option<Vec<i64>> = None;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            match self.attempt(problem, swept, mid, deadline) {
                Some(offsets) => {
                    best = Some(offsets);
                    hi = mid - 1;
                }
                None => match self.status {
                    SolveStatus::Infeasible => lo = mid + 1,
                    // A timed-out or cancelled probe ends the minimization;
                    // keep the best capacity proven so far, if any.
                    _ => break,
                },
            }
        }

        if best.is_some() {
            self.status = SolveStatus::Solved;
        }
        best
    }
}
