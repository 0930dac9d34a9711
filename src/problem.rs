//! Core problem types: time intervals, gaps, buffers, problems, solutions.
//!
//! All coordinates are integers. Time intervals are half-open `[lower, upper)`.
//! A buffer occupies the offset range `[offset, offset + size)` whenever it is
//! live, except inside a gap: a gap without a window makes the buffer wholly
//! absent for its duration, while a gap with a window shrinks the buffer to
//! `[offset + window.lower, offset + window.upper)`.

use std::fmt;
use thiserror::Error;

/// A half-open integer interval `[lower, upper)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub lower: i64,
    pub upper: i64,
}

impl Interval {
    /// Create a new interval.
    #[inline]
    pub fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    /// Returns the length of the interval.
    #[inline]
    pub fn duration(&self) -> i64 {
        self.upper - self.lower
    }

    /// Returns true if the interval contains no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }

    /// Check if this interval overlaps another (shares at least one point).
    #[inline]
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.lower < other.upper && other.lower < self.upper
    }

    /// Check if this interval fully contains another.
    #[inline]
    pub fn contains(&self, other: &Interval) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }

    /// Compute the intersection with another interval, if non-empty.
    #[inline]
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        if lower < upper {
            Some(Interval { lower, upper })
        } else {
            None
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// A sub-interval of a buffer's lifespan during which the buffer is either
/// wholly absent (no `window`) or occupies only `[offset + window.lower,
/// offset + window.upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gap {
    pub lifespan: Interval,
    pub window: Option<Interval>,
}

impl Gap {
    /// A gap that removes the buffer entirely for its duration.
    #[inline]
    pub fn new(lifespan: Interval) -> Self {
        Self {
            lifespan,
            window: None,
        }
    }

    /// A gap that shrinks the buffer to the given window for its duration.
    #[inline]
    pub fn with_window(lifespan: Interval, window: Interval) -> Self {
        Self {
            lifespan,
            window: Some(window),
        }
    }
}

/// One maximal run of time during which a buffer is live with a single
/// applicable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// The time range of the run.
    pub time: Interval,
    /// The occupied offset sub-range, relative to the buffer's offset.
    pub window: Interval,
}

/// A tensor to be placed in memory for a known time interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Buffer {
    pub id: String,
    pub lifespan: Interval,
    pub size: i64,
    pub alignment: i64,
    /// Gaps, sorted by start time and pairwise disjoint.
    pub gaps: Vec<Gap>,
    /// A fixed offset the solver must honor.
    pub offset: Option<i64>,
    /// A preferred offset carried through from the input.
    pub hint: Option<i64>,
}

impl Buffer {
    /// Create a buffer with default alignment and no gaps.
    pub fn new(id: impl Into<String>, lifespan: Interval, size: i64) -> Self {
        Self {
            id: id.into(),
            lifespan,
            size,
            alignment: 1,
            gaps: Vec::new(),
            offset: None,
            hint: None,
        }
    }

    /// Set the alignment requirement.
    pub fn with_alignment(mut self, alignment: i64) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set the gaps (must be sorted and disjoint).
    pub fn with_gaps(mut self, gaps: Vec<Gap>) -> Self {
        self.gaps = gaps;
        self
    }

    /// Fix the buffer at the given offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach a placement hint.
    pub fn with_hint(mut self, hint: i64) -> Self {
        self.hint = Some(hint);
        self
    }

    /// The buffer's area: size times full lifespan duration.
    #[inline]
    pub fn area(&self) -> i64 {
        self.size * self.lifespan.duration()
    }

    /// Lifespan duration with full (windowless) gaps removed.
    pub fn effective_duration(&self) -> i64 {
        let mut duration = self.lifespan.duration();
        for gap in &self.gaps {
            if gap.window.is_none() {
                duration -= gap.lifespan.duration();
            }
        }
        duration
    }

    /// The gap-cleaved active segments of this buffer, in time order.
    ///
    /// Regions outside every gap carry the full window `[0, size)`; a gap
    /// with a window contributes a segment carrying that window; a gap
    /// without one contributes nothing.
    pub fn segments(&self) -> Vec<Segment> {
        let full = Interval::new(0, self.size);
        let mut segments = Vec::with_capacity(self.gaps.len() * 2 + 1);
        let mut cursor = self.lifespan.lower;
        for gap in &self.gaps {
            if cursor < gap.lifespan.lower {
                segments.push(Segment {
                    time: Interval::new(cursor, gap.lifespan.lower),
                    window: full,
                });
            }
            if let Some(window) = gap.window {
                segments.push(Segment {
                    time: gap.lifespan,
                    window,
                });
            }
            cursor = gap.lifespan.upper;
        }
        if cursor < self.lifespan.upper {
            segments.push(Segment {
                time: Interval::new(cursor, self.lifespan.upper),
                window: full,
            });
        }
        segments
    }

    /// The size this buffer reserves against `other` while both are live,
    /// or `None` when their live times never intersect.
    ///
    /// If `self` is placed below `other`, then `other.offset` must be at
    /// least `self.offset + effective_size`.
    pub fn effective_size(&self, other: &Buffer) -> Option<i64> {
        let theirs = other.segments();
        let mut result: Option<i64> = None;
        for a in &self.segments() {
            for b in &theirs {
                if a.time.overlaps(&b.time) {
                    let reserve = a.window.upper - b.window.lower;
                    result = Some(result.map_or(reserve, |r: i64| r.max(reserve)));
                }
            }
        }
        result
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} size={}", self.id, self.lifespan, self.size)
    }
}

/// Errors caught when constructing a [`Problem`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProblemError {
    #[error("buffer {index} has an empty id")]
    EmptyId { index: usize },

    #[error("duplicate buffer id '{id}'")]
    DuplicateId { id: String },

    #[error("buffer '{id}': size must be positive, got {size}")]
    BadSize { id: String, size: i64 },

    #[error("buffer '{id}': alignment must be at least 1, got {alignment}")]
    BadAlignment { id: String, alignment: i64 },

    #[error("buffer '{id}': lifespan {lifespan} is inverted")]
    BadLifespan { id: String, lifespan: Interval },

    #[error("buffer '{id}': gap {gap} lies outside the lifespan")]
    GapOutsideLifespan { id: String, gap: Interval },

    #[error("buffer '{id}': gaps must be sorted and disjoint")]
    GapsOutOfOrder { id: String },

    #[error("buffer '{id}': gap window {window} exceeds [0, {size}]")]
    BadWindow {
        id: String,
        window: Interval,
        size: i64,
    },

    #[error("buffer '{id}': fixed offset {offset} is negative")]
    NegativeOffset { id: String, offset: i64 },

    #[error("capacity must be non-negative, got {capacity}")]
    NegativeCapacity { capacity: i64 },
}

/// A static allocation problem: buffers to place inside `[0, capacity)`.
///
/// Buffer indices are stable and are how the sweeper, solver, and solutions
/// refer to buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub buffers: Vec<Buffer>,
    pub capacity: i64,
}

impl Problem {
    /// Build a problem, validating structural preconditions.
    ///
    /// Capacity sufficiency is deliberately not checked here: a problem whose
    /// buffers cannot fit is well-formed and reported as infeasible by the
    /// solver.
    pub fn new(buffers: Vec<Buffer>, capacity: i64) -> Result<Self, ProblemError> {
        if capacity < 0 {
            return Err(ProblemError::NegativeCapacity { capacity });
        }
        let mut seen = rustc_hash::FxHashSet::default();
        for (index, buffer) in buffers.iter().enumerate() {
            if buffer.id.is_empty() {
                return Err(ProblemError::EmptyId { index });
            }
            if !seen.insert(buffer.id.as_str()) {
                return Err(ProblemError::DuplicateId {
                    id: buffer.id.clone(),
                });
            }
            if buffer.size <= 0 {
                return Err(ProblemError::BadSize {
                    id: buffer.id.clone(),
                    size: buffer.size,
                });
            }
            if buffer.alignment < 1 {
                return Err(ProblemError::BadAlignment {
                    id: buffer.id.clone(),
                    alignment: buffer.alignment,
                });
            }
            if buffer.lifespan.lower > buffer.lifespan.upper {
                return Err(ProblemError::BadLifespan {
                    id: buffer.id.clone(),
                    lifespan: buffer.lifespan,
                });
            }
            let mut cursor = buffer.lifespan.lower;
            for gap in &buffer.gaps {
                if gap.lifespan.is_empty() || !buffer.lifespan.contains(&gap.lifespan) {
                    return Err(ProblemError::GapOutsideLifespan {
                        id: buffer.id.clone(),
                        gap: gap.lifespan,
                    });
                }
                if gap.lifespan.lower < cursor {
                    return Err(ProblemError::GapsOutOfOrder {
                        id: buffer.id.clone(),
                    });
                }
                cursor = gap.lifespan.upper;
                if let Some(window) = gap.window {
                    if window.lower < 0 || window.upper > buffer.size || window.lower > window.upper
                    {
                        return Err(ProblemError::BadWindow {
                            id: buffer.id.clone(),
                            window,
                            size: buffer.size,
                        });
                    }
                }
            }
            if let Some(offset) = buffer.offset {
                if offset < 0 {
                    return Err(ProblemError::NegativeOffset {
                        id: buffer.id.clone(),
                        offset,
                    });
                }
            }
        }
        Ok(Self { buffers, capacity })
    }

    /// Number of buffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True if the problem has no buffers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// When every buffer carries a fixed offset, extract them as a solution.
    pub fn strip_solution(&self) -> Option<Solution> {
        let mut offsets = Vec::with_capacity(self.buffers.len());
        for buffer in &self.buffers {
            offsets.push(buffer.offset?);
        }
        Some(Solution::from_offsets(offsets, self))
    }
}

/// An offset assignment for every buffer of a problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Solution {
    pub offsets: Vec<i64>,
    /// The maximum of `offset + size`, when known.
    pub height: Option<i64>,
}

impl Solution {
    /// Create a solution with an explicit height.
    pub fn new(offsets: Vec<i64>, height: i64) -> Self {
        Self {
            offsets,
            height: Some(height),
        }
    }

    /// Create a solution, computing the height from the problem's sizes.
    pub fn from_offsets(offsets: Vec<i64>, problem: &Problem) -> Self {
        let height = offsets
            .iter()
            .zip(&problem.buffers)
            .map(|(offset, buffer)| offset + buffer.size)
            .max()
            .unwrap_or(0);
        Self {
            offsets,
            height: Some(height),
        }
    }
}
