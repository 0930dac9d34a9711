//! MiniMalloc: exact static memory allocation for ML accelerator buffers.
//!
//! Given a set of buffers with lifespans, sizes, alignments, optional fixed
//! offsets, and optional gaps, the solver assigns a byte offset to every
//! buffer so that buffers live at the same instant never overlap and none
//! exceeds the capacity. The search is exact and deterministic: it either
//! returns a valid placement, proves infeasibility, or reports a timeout.
//!
//! # Example
//!
//! ```rust
//! use minimalloc::csv::from_csv;
//! use minimalloc::solver::{Solver, SolverParams};
//! use minimalloc::validator::{validate, ValidationResult};
//!
//! let mut problem = from_csv("id,lower,upper,size\nb1,0,3,4\nb2,3,9,4\nb3,0,9,4\n").unwrap();
//! problem.capacity = 12;
//!
//! let mut solver = Solver::new(SolverParams::default()).unwrap();
//! let solution = solver.solve(&problem).unwrap();
//! assert_eq!(validate(&problem, &solution), ValidationResult::Good);
//! ```

pub mod csv;
pub mod problem;
pub mod solver;
pub mod sweeper;
pub mod validator;

// Re-export commonly used types
pub use problem::{Buffer, Gap, Interval, Problem, ProblemError, Solution};
pub use solver::{SolveStatus, Solver, SolverParams};
pub use validator::{validate, ValidationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::csv::{from_csv, from_csv_file, to_csv, to_csv_file};
    pub use crate::problem::{Buffer, Gap, Interval, Problem, Solution};
    pub use crate::solver::{SolveStatus, Solver, SolverParams};
    pub use crate::sweeper::{sweep, SweepResult};
    pub use crate::validator::{validate, ValidationResult};
}
