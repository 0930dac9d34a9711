//! Static preordering of buffers.
//!
//! Each buffer is scored on a tuple of derived metrics and ranked by a
//! heuristic: a short sequence of keys, each sorted descending, with the
//! buffer index as the final ascending tie break. Heuristics are named by
//! letter codes (`"WAT"` = width, then area, then total) or by a single
//! full metric name (`"area"`).

use crate::problem::Problem;
use crate::sweeper::SweepResult;
use std::cmp::Ordering;
use thiserror::Error;

/// Derived per-buffer metrics consumed by the ranking heuristics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreorderData {
    /// `size * width`.
    pub area: i64,
    /// Lifespan start.
    pub lower: i64,
    /// Number of collision partners.
    pub overlaps: usize,
    /// Number of sections occupied.
    pub sections: usize,
    pub size: i64,
    /// Sum of effective sizes over all collision partners.
    pub total: i64,
    /// Lifespan end.
    pub upper: i64,
    /// Lifespan duration with full gaps removed.
    pub width: i64,
    pub buffer_idx: usize,
}

/// One ranking metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreorderKey {
    Width,
    Area,
    Total,
    Size,
    Overlaps,
    Lower,
    Upper,
}

impl PreorderKey {
    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'W' => Some(Self::Width),
            'A' => Some(Self::Area),
            'T' => Some(Self::Total),
            'S' => Some(Self::Size),
            'O' => Some(Self::Overlaps),
            'L' => Some(Self::Lower),
            'U' => Some(Self::Upper),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "width" => Some(Self::Width),
            "area" => Some(Self::Area),
            "total" => Some(Self::Total),
            "size" => Some(Self::Size),
            "overlaps" => Some(Self::Overlaps),
            "lower" => Some(Self::Lower),
            "upper" => Some(Self::Upper),
            _ => None,
        }
    }

    #[inline]
    fn extract(&self, data: &PreorderData) -> i64 {
        match self {
            Self::Width => data.width,
            Self::Area => data.area,
            Self::Total => data.total,
            Self::Size => data.size,
            Self::Overlaps => data.overlaps as i64,
            Self::Lower => data.lower,
            Self::Upper => data.upper,
        }
    }
}

/// Error for an unrecognized heuristic spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown preordering heuristic '{spec}'")]
pub struct HeuristicError {
    pub spec: String,
}

/// A parsed ranking heuristic: keys applied in order, all descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreorderHeuristic {
    keys: Vec<PreorderKey>,
    spec: String,
}

impl PreorderHeuristic {
    /// Parse a heuristic spec: a full metric name or a string of key letters.
    pub fn parse(spec: &str) -> Result<Self, HeuristicError> {
        let err = || HeuristicError {
            spec: spec.to_string(),
        };
        if spec.is_empty() {
            return Err(err());
        }
        if let Some(key) = PreorderKey::from_name(spec) {
            return Ok(Self {
                keys: vec![key],
                spec: spec.to_string(),
            });
        }
        let keys = spec
            .chars()
            .map(PreorderKey::from_letter)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(err)?;
        Ok(Self {
            keys,
            spec: spec.to_string(),
        })
    }

    /// The original spec string.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Compare two buffers' data: `Less` means `a` is ranked first.
    pub fn compare(&self, a: &PreorderData, b: &PreorderData) -> Ordering {
        for key in &self.keys {
            match key.extract(b).cmp(&key.extract(a)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        a.buffer_idx.cmp(&b.buffer_idx)
    }
}

/// Compute per-buffer preorder metrics from the sweep output.
pub fn compute_preorder_data(problem: &Problem, sweep: &SweepResult) -> Vec<PreorderData> {
    problem
        .buffers
        .iter()
        .enumerate()
        .map(|(buffer_idx, buffer)| {
            let data = &sweep.buffer_data[buffer_idx];
            let width = buffer.effective_duration();
            let sections = data
                .section_spans
                .iter()
                .map(|span| span.section_range.duration() as usize)
                .sum();
            let total = data.overlaps.iter().map(|o| o.effective_size).sum();
            PreorderData {
                area: buffer.size * width,
                lower: buffer.lifespan.lower,
                overlaps: data.overlaps.len(),
                sections,
                size: buffer.size,
                total,
                upper: buffer.lifespan.upper,
                width,
                buffer_idx,
            }
        })
        .collect()
}
