//! Standalone solution checker.
//!
//! The validator is independent of the solver: it re-derives liveness from
//! the buffers' gap-cleaved segments and performs the exact pairwise overlap
//! test, so a solver bug cannot hide behind shared code. Checks run in a
//! fixed order and the first violated rule determines the verdict.

use crate::problem::{Problem, Solution};

/// The verdict classes, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationResult {
    /// The solution satisfies every constraint.
    Good,
    /// The offset vector has the wrong length.
    BadSolution,
    /// A fixed-offset buffer was moved.
    BadFixed,
    /// An offset is negative or exceeds the capacity.
    BadOffset,
    /// An offset violates its buffer's alignment.
    BadAlignment,
    /// Two live buffers occupy intersecting offset ranges.
    BadOverlap,
    /// The declared height disagrees with the offsets or the capacity.
    BadHeight,
}

/// Validate a candidate solution against a problem.
pub fn validate(problem: &Problem, solution: &Solution) -> ValidationResult {
    let n = problem.buffers.len();
    if solution.offsets.len() != n {
        return ValidationResult::BadSolution;
    }

    for (buffer, &offset) in problem.buffers.iter().zip(&solution.offsets) {
        if let Some(fixed) = buffer.offset {
            if offset != fixed {
                return ValidationResult::BadFixed;
            }
        }
    }

    for (buffer, &offset) in problem.buffers.iter().zip(&solution.offsets) {
        if offset < 0 || offset + buffer.size > problem.capacity {
            return ValidationResult::BadOffset;
        }
    }

    for (buffer, &offset) in problem.buffers.iter().zip(&solution.offsets) {
        if offset % buffer.alignment != 0 {
            return ValidationResult::BadAlignment;
        }
    }

    for i in 0..n {
        let a = &problem.buffers[i];
        let a_offset = solution.offsets[i];
        let a_segments = a.segments();
        for j in (i + 1)..n {
            let b = &problem.buffers[j];
            let b_offset = solution.offsets[j];
            let b_segments = b.segments();
            for sa in &a_segments {
                for sb in &b_segments {
                    if !sa.time.overlaps(&sb.time) {
                        continue;
                    }
                    let a_lo = a_offset + sa.window.lower;
                    let a_hi = a_offset + sa.window.upper;
                    let b_lo = b_offset + sb.window.lower;
                    let b_hi = b_offset + sb.window.upper;
                    if a_lo < b_hi && b_lo < a_hi {
                        return ValidationResult::BadOverlap;
                    }
                }
            }
        }
    }

    if let Some(height) = solution.height {
        let observed = problem
            .buffers
            .iter()
            .zip(&solution.offsets)
            .map(|(buffer, &offset)| offset + buffer.size)
            .max()
            .unwrap_or(0);
        if height != observed || height > problem.capacity {
            return ValidationResult::BadHeight;
        }
    }

    ValidationResult::Good
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Buffer, Gap, Interval};

    fn buffer(id: &str, lower: i64, upper: i64, size: i64) -> Buffer {
        Buffer::new(id, Interval::new(lower, upper), size)
    }

    fn problem(buffers: Vec<Buffer>, capacity: i64) -> Problem {
        Problem::new(buffers, capacity).unwrap()
    }

    #[test]
    fn test_validates_good_solution() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 3, 1),
                buffer("b2", 2, 4, 1),
                buffer("b3", 3, 5, 1),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0, 1, 0], 2);

        assert_eq!(validate(&p, &s), ValidationResult::Good);
    }

    #[test]
    fn test_validates_good_solution_with_gaps() {
        let p = problem(
            vec![
                buffer("b0", 0, 10, 2).with_gaps(vec![Gap::new(Interval::new(1, 9))]),
                buffer("b1", 5, 15, 2).with_gaps(vec![Gap::new(Interval::new(6, 14))]),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0], 2);

        assert_eq!(validate(&p, &s), ValidationResult::Good);
    }

    #[test]
    fn test_validates_good_solution_with_gaps_edge_case() {
        let p = problem(
            vec![
                buffer("b0", 0, 10, 2).with_gaps(vec![Gap::new(Interval::new(1, 8))]),
                buffer("b1", 5, 15, 2).with_gaps(vec![Gap::new(Interval::new(8, 14))]),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0], 2);

        assert_eq!(validate(&p, &s), ValidationResult::Good);
    }

    #[test]
    fn test_validates_tetris() {
        let p = problem(
            vec![
                buffer("b0", 0, 10, 2)
                    .with_gaps(vec![Gap::with_window(Interval::new(0, 5), Interval::new(0, 1))]),
                buffer("b1", 0, 10, 2)
                    .with_gaps(vec![Gap::with_window(Interval::new(5, 10), Interval::new(1, 2))]),
            ],
            3,
        );
        let s = Solution::new(vec![0, 1], 3);

        assert_eq!(validate(&p, &s), ValidationResult::Good);
    }

    #[test]
    fn test_validates_stairs() {
        let p = problem(
            vec![
                buffer("b0", 0, 108, 30).with_gaps(vec![
                    Gap::with_window(Interval::new(36, 72), Interval::new(10, 30)),
                    Gap::with_window(Interval::new(72, 108), Interval::new(20, 30)),
                ]),
                buffer("b1", 36, 144, 50).with_gaps(vec![
                    Gap::with_window(Interval::new(36, 72), Interval::new(20, 30)),
                    Gap::with_window(Interval::new(72, 108), Interval::new(10, 40)),
                ]),
                buffer("b2", 84, 144, 42).with_gaps(vec![
                    Gap::with_window(Interval::new(114, 129), Interval::new(0, 28)),
                    Gap::with_window(Interval::new(129, 144), Interval::new(0, 14)),
                ]),
                buffer("b3", 84, 129, 42).with_gaps(vec![
                    Gap::with_window(Interval::new(99, 114), Interval::new(14, 42)),
                    Gap::with_window(Interval::new(114, 129), Interval::new(28, 42)),
                ]),
                buffer("b4", 99, 144, 70).with_gaps(vec![
                    Gap::with_window(Interval::new(99, 114), Interval::new(28, 42)),
                    Gap::with_window(Interval::new(114, 129), Interval::new(14, 56)),
                ]),
                buffer("b5", 0, 144, 30).with_gaps(vec![
                    Gap::with_window(Interval::new(72, 108), Interval::new(0, 20)),
                    Gap::with_window(Interval::new(108, 144), Interval::new(0, 10)),
                ]),
            ],
            144,
        );
        let s = Solution::new(vec![30, 10, 60, 102, 74, 0], 144);

        assert_eq!(validate(&p, &s), ValidationResult::Good);
    }

    #[test]
    fn test_invalidates_wrong_length() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1),
                buffer("b2", 1, 2, 1),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadSolution);
    }

    #[test]
    fn test_invalidates_moved_fixed_buffer() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1),
                buffer("b2", 1, 2, 1).with_offset(0),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0, 1], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadFixed);
    }

    #[test]
    fn test_invalidates_negative_offset() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1),
                buffer("b2", 1, 2, 1),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0, -1], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadOffset);
    }

    #[test]
    fn test_invalidates_out_of_range_offset() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1),
                buffer("b2", 1, 2, 1),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0, 2], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadOffset);
    }

    #[test]
    fn test_invalidates_undersized_height() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1),
                buffer("b2", 1, 2, 1),
            ],
            3,
        );
        let s = Solution::new(vec![0, 0, 2], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadHeight);
    }

    #[test]
    fn test_invalidates_oversized_height() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1),
                buffer("b2", 1, 2, 1),
            ],
            4,
        );
        let s = Solution::new(vec![0, 0, 2], 4);

        assert_eq!(validate(&p, &s), ValidationResult::BadHeight);
    }

    #[test]
    fn test_invalidates_overlap() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1),
                buffer("b2", 1, 2, 1),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0, 0], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadOverlap);
    }

    #[test]
    fn test_invalidates_misalignment() {
        let p = problem(
            vec![
                buffer("b0", 0, 1, 2),
                buffer("b1", 1, 2, 1).with_alignment(2),
            ],
            2,
        );
        let s = Solution::new(vec![0, 1], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadAlignment);
    }

    #[test]
    fn test_invalidates_gap_overlap() {
        let p = problem(
            vec![
                buffer("b0", 0, 10, 2).with_gaps(vec![Gap::new(Interval::new(1, 7))]),
                buffer("b1", 5, 15, 2).with_gaps(vec![Gap::new(Interval::new(8, 14))]),
            ],
            2,
        );
        let s = Solution::new(vec![0, 0], 2);

        assert_eq!(validate(&p, &s), ValidationResult::BadOverlap);
    }

    #[test]
    fn test_validates_empty_problem() {
        let p = problem(vec![], 0);
        let s = Solution::new(vec![], 0);

        assert_eq!(validate(&p, &s), ValidationResult::Good);
    }
}
