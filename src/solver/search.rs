//! Backtracking offset-assignment search over one problem.
//!
//! The search runs partition by partition. Within a partition it is a
//! classical DFS over (buffer, offset) decisions: fixed buffers are
//! pre-assigned, then buffers are picked one at a time and their candidate
//! offsets enumerated in ascending order against the live solver state.
//! Every state change goes through an explicit undo log so that backtracking
//! and cancellation always restore the exact prior state.
//!
//! Pruning rules are individually feasibility-preserving:
//! * canonical-only restricts interchangeable buffers to index-ordered
//!   offsets (any solution permutes into that form),
//! * dominance rejects a candidate whose blocking effect on every unassigned
//!   neighbor is a superset of an already-failed lower candidate,
//! * section inference fails a candidate as soon as some unassigned buffer's
//!   domain becomes empty, plus a static per-section load check,
//! * hatless pruning jumps to the highest legal offset once nothing can ever
//!   sit above the buffer,
//! * monotonic-floor and dynamic ordering only reorder decisions, and
//!   dynamic decomposition solves independent residual groups separately.

use crate::problem::Problem;
use crate::sweeper::SweepResult;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Instant;

/// Why a search stopped without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    Timeout,
    Cancelled,
}

/// Result of one recursive frame.
enum Outcome {
    Solved,
    Backtrack,
    Abort(Stop),
}

/// The boolean optimization toggles, copied out of the solver params.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchFlags {
    pub canonical_only: bool,
    pub section_inference: bool,
    pub dynamic_ordering: bool,
    pub check_dominance: bool,
    pub unallocated_floor: bool,
    pub dynamic_decomposition: bool,
    pub monotonic_floor: bool,
    pub hatless_pruning: bool,
}

/// Outcome of a full search run.
pub(crate) struct SearchOutput {
    pub offsets: Option<Vec<i64>>,
    pub stop: Option<Stop>,
    pub backtracks: u64,
}

#[derive(Debug, Clone, Copy)]
struct Neighbor {
    idx: usize,
    /// Separation this buffer demands below the neighbor.
    es_out: i64,
    /// Separation the neighbor demands below this buffer.
    es_in: i64,
}

/// Reversible edits, drained on backtrack.
enum Edit {
    Assign(usize),
    Floor { section: usize, prev: i64 },
}

#[inline]
fn align_up(value: i64, alignment: i64) -> i64 {
    debug_assert!(value >= 0 && alignment >= 1);
    (value + alignment - 1) / alignment * alignment
}

#[inline]
fn align_down(value: i64, alignment: i64) -> i64 {
    debug_assert!(value >= 0 && alignment >= 1);
    value / alignment * alignment
}

struct Search<'a> {
    problem: &'a Problem,
    sweep: &'a SweepResult,
    flags: SearchFlags,
    capacity: i64,
    rank: &'a [usize],
    neighbors: Vec<Vec<Neighbor>>,
    twin_class_of: Vec<usize>,
    twin_classes: Vec<Vec<usize>>,
    deadline: Option<Instant>,
    cancel: &'a AtomicBool,
    offsets: Vec<Option<i64>>,
    floors: Vec<i64>,
    trail: Vec<Edit>,
    backtracks: u64,
}

/// Run one complete search at the given capacity and buffer ranking.
pub(crate) fn run_search(
    problem: &Problem,
    sweep: &SweepResult,
    flags: SearchFlags,
    capacity: i64,
    rank: &[usize],
    deadline: Option<Instant>,
    cancel: &AtomicBool,
) -> SearchOutput {
    let mut search = Search::new(problem, sweep, flags, capacity, rank, deadline, cancel);
    let outcome = search.run();
    SearchOutput {
        offsets: match outcome {
            Outcome::Solved => Some(
                search
                    .offsets
                    .iter()
                    .map(|offset| offset.unwrap_or(0))
                    .collect(),
            ),
            _ => None,
        },
        stop: match outcome {
            Outcome::Abort(stop) => Some(stop),
            _ => None,
        },
        backtracks: search.backtracks,
    }
}

impl<'a> Search<'a> {
    fn new(
        problem: &'a Problem,
        sweep: &'a SweepResult,
        flags: SearchFlags,
        capacity: i64,
        rank: &'a [usize],
        deadline: Option<Instant>,
        cancel: &'a AtomicBool,
    ) -> Self {
        let n = problem.buffers.len();

        let mut neighbors = Vec::with_capacity(n);
        for i in 0..n {
            let mut list = Vec::with_capacity(sweep.buffer_data[i].overlaps.len());
            for overlap in &sweep.buffer_data[i].overlaps {
                let j = overlap.buffer_idx;
                let es_in = sweep.buffer_data[j]
                    .overlaps
                    .iter()
                    .find(|o| o.buffer_idx == i)
                    .map(|o| o.effective_size)
                    .unwrap_or(0);
                list.push(Neighbor {
                    idx: j,
                    es_out: overlap.effective_size,
                    es_in,
                });
            }
            neighbors.push(list);
        }

        // Interchangeable buffers: identical shape, free offset.
        let mut twin_class_of = vec![0usize; n];
        let mut twin_classes: Vec<Vec<usize>> = Vec::new();
        let mut index: rustc_hash::FxHashMap<(i64, i64, i64, i64, Vec<(i64, i64, i64, i64)>), usize> =
            rustc_hash::FxHashMap::default();
        for (i, buffer) in problem.buffers.iter().enumerate() {
            if buffer.offset.is_some() {
                twin_class_of[i] = twin_classes.len();
                twin_classes.push(vec![i]);
                continue;
            }
            let gaps: Vec<(i64, i64, i64, i64)> = buffer
                .gaps
                .iter()
                .map(|gap| {
                    let window = gap.window.unwrap_or(crate::problem::Interval::new(-1, -1));
                    (
                        gap.lifespan.lower,
                        gap.lifespan.upper,
                        window.lower,
                        window.upper,
                    )
                })
                .collect();
            let key = (
                buffer.lifespan.lower,
                buffer.lifespan.upper,
                buffer.size,
                buffer.alignment,
                gaps,
            );
            let class = *index.entry(key).or_insert_with(|| {
                twin_classes.push(Vec::new());
                twin_classes.len() - 1
            });
            twin_class_of[i] = class;
            twin_classes[class].push(i);
        }

        Self {
            problem,
            sweep,
            flags,
            capacity,
            rank,
            neighbors,
            twin_class_of,
            twin_classes,
            deadline,
            cancel,
            offsets: vec![None; n],
            floors: vec![0; sweep.sections.len()],
            trail: Vec::new(),
            backtracks: 0,
        }
    }

    fn run(&mut self) -> Outcome {
        if self.flags.section_inference {
            let loads = self.sweep.section_loads();
            if loads.iter().any(|&load| load > self.capacity) {
                self.backtracks += 1;
                return Outcome::Backtrack;
            }
        }

        // Buffers that are never live conflict with nothing.
        for (i, buffer) in self.problem.buffers.iter().enumerate() {
            if !self.sweep.buffer_data[i].section_spans.is_empty() {
                continue;
            }
            let offset = buffer.offset.unwrap_or(0);
            if offset % buffer.alignment != 0 || offset + buffer.size > self.capacity {
                self.backtracks += 1;
                return Outcome::Backtrack;
            }
            self.offsets[i] = Some(offset);
        }

        for p in 0..self.sweep.partitions.len() {
            let mut members = self.sweep.partitions[p].buffer_idxs.clone();
            members.sort_unstable();

            // Fixed buffers are honored before the first free decision.
            for &b in &members {
                let Some(offset) = self.problem.buffers[b].offset else {
                    continue;
                };
                let buffer = &self.problem.buffers[b];
                let mut feasible =
                    offset % buffer.alignment == 0 && offset + buffer.size <= self.capacity;
                if feasible {
                    for neighbor in &self.neighbors[b] {
                        if let Some(other) = self.offsets[neighbor.idx] {
                            if offset < other + neighbor.es_in && other < offset + neighbor.es_out {
                                feasible = false;
                                break;
                            }
                        }
                    }
                }
                if !feasible {
                    self.backtracks += 1;
                    return Outcome::Backtrack;
                }
                self.assign(b, offset);
            }

            let mut free: Vec<usize> = members
                .into_iter()
                .filter(|&b| self.problem.buffers[b].offset.is_none())
                .collect();
            free.sort_unstable_by_key(|&b| self.rank[b]);

            match self.solve_group(free) {
                Outcome::Solved => continue,
                other => return other,
            }
        }

        Outcome::Solved
    }

    fn solve_group(&mut self, group: Vec<usize>) -> Outcome {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Outcome::Abort(Stop::Timeout);
            }
        }
        if self.cancel.load(AtomicOrdering::Relaxed) {
            return Outcome::Abort(Stop::Cancelled);
        }
        if group.is_empty() {
            return Outcome::Solved;
        }

        if self.flags.dynamic_decomposition {
            let components = self.components(&group);
            if components.len() > 1 {
                let mark = self.trail.len();
                for component in components {
                    match self.solve_group(component) {
                        Outcome::Solved => continue,
                        other => {
                            self.undo_to(mark);
                            return other;
                        }
                    }
                }
                return Outcome::Solved;
            }
        }

        let picked = self.pick(&group);
        let rest: Vec<usize> = group.iter().copied().filter(|&b| b != picked).collect();
        let buffer = &self.problem.buffers[picked];
        let alignment = buffer.alignment;
        let max_off = self.capacity - buffer.size;

        let mut cursor = self.lower_bound(picked);
        let mut last_tried: Option<i64> = None;
        while let Some(candidate) = self.next_candidate(picked, cursor) {
            cursor = candidate + 1;

            if self.flags.canonical_only && !self.canonical_ok(picked, candidate) {
                continue;
            }

            let mut offset = candidate;
            let mut at_top = false;
            if self.flags.hatless_pruning && self.nothing_fits_above(picked, candidate) {
                let top = align_down(max_off, alignment);
                if top == candidate {
                    at_top = true;
                } else if !self.flags.canonical_only || self.canonical_ok(picked, top) {
                    offset = top;
                    at_top = true;
                }
            }

            if !at_top && self.flags.check_dominance {
                if let Some(prev) = last_tried {
                    if self.dominated(picked, prev, offset) {
                        continue;
                    }
                }
            }

            let mark = self.trail.len();
            self.assign(picked, offset);

            let mut viable = true;
            if self.flags.section_inference {
                for &j in &rest {
                    if self.first_candidate(j).is_none() {
                        viable = false;
                        break;
                    }
                }
            }

            if viable {
                last_tried = Some(offset);
                match self.solve_group(rest.clone()) {
                    Outcome::Solved => return Outcome::Solved,
                    Outcome::Backtrack => {}
                    abort => {
                        self.undo_to(mark);
                        return abort;
                    }
                }
            }
            self.undo_to(mark);

            // Everything above a hatless placement is dominated by the top.
            if at_top {
                break;
            }
        }

        self.backtracks += 1;
        Outcome::Backtrack
    }

    /// Choose the next buffer to assign.
    ///
    /// Monotonic-floor prefers the buffer resting on the lowest section
    /// floor (so the sequence of floors used is non-decreasing), dynamic
    /// ordering prefers the smallest remaining domain, and the static rank
    /// breaks all ties. Interchangeable buffers are taken in index order.
    fn pick(&self, group: &[usize]) -> usize {
        let mut best: Option<(i64, usize, usize)> = None;
        let mut picked = group[0];
        for &b in group {
            let base = if self.flags.monotonic_floor {
                self.base(b)
            } else {
                0
            };
            let domain = if self.flags.dynamic_ordering {
                self.count_domain(b, 64)
            } else {
                0
            };
            let key = (base, domain, self.rank[b]);
            if best.map_or(true, |k| key < k) {
                best = Some(key);
                picked = b;
            }
        }
        if self.flags.canonical_only {
            for &m in &self.twin_classes[self.twin_class_of[picked]] {
                if m == picked {
                    break;
                }
                if self.offsets[m].is_none() && group.contains(&m) {
                    return m;
                }
            }
        }
        picked
    }

    /// Max floor under the buffer's sections.
    fn base(&self, i: usize) -> i64 {
        let mut base = 0;
        for span in &self.sweep.buffer_data[i].section_spans {
            for s in span.section_range.lower..span.section_range.upper {
                base = base.max(self.floors[s as usize]);
            }
        }
        base
    }

    /// Count admissible offsets, stopping at `limit`.
    fn count_domain(&self, i: usize, limit: usize) -> usize {
        let mut count = 0;
        let mut cursor = self.lower_bound(i);
        while count < limit {
            match self.next_candidate(i, cursor) {
                Some(offset) => {
                    count += 1;
                    cursor = offset + 1;
                }
                None => break,
            }
        }
        count
    }

    /// Split a group into connected components of the overlap graph.
    fn components(&self, group: &[usize]) -> Vec<Vec<usize>> {
        let mut in_group = vec![false; self.problem.buffers.len()];
        for &b in group {
            in_group[b] = true;
        }
        let mut visited = vec![false; self.problem.buffers.len()];
        let mut components = Vec::new();
        for &start in group {
            if visited[start] {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            visited[start] = true;
            while let Some(b) = stack.pop() {
                component.push(b);
                for neighbor in &self.neighbors[b] {
                    let j = neighbor.idx;
                    if in_group[j] && !visited[j] {
                        visited[j] = true;
                        stack.push(j);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// The smallest admissible offset at or above `from`, skipping over the
    /// reservations of assigned neighbors.
    fn next_candidate(&self, i: usize, from: i64) -> Option<i64> {
        let buffer = &self.problem.buffers[i];
        let max_off = self.capacity - buffer.size;
        if let Some(fixed) = buffer.offset {
            if fixed >= from && fixed <= max_off {
                return Some(fixed);
            }
            return None;
        }
        let mut offset = align_up(from.max(0), buffer.alignment);
        'scan: loop {
            if offset > max_off {
                return None;
            }
            for neighbor in &self.neighbors[i] {
                if let Some(other) = self.offsets[neighbor.idx] {
                    if offset < other + neighbor.es_in && other < offset + neighbor.es_out {
                        offset = align_up(other + neighbor.es_in, buffer.alignment);
                        continue 'scan;
                    }
                }
            }
            return Some(offset);
        }
    }

    fn first_candidate(&self, i: usize) -> Option<i64> {
        self.next_candidate(i, self.lower_bound(i))
    }

    /// Lower bound on a buffer's offset.
    ///
    /// With unallocated-floor enabled this includes, per section, the
    /// contiguous occupied prefix starting at offset zero; offsets below it
    /// are pairwise-inadmissible anyway, so the bound only saves scanning.
    fn lower_bound(&self, i: usize) -> i64 {
        if !self.flags.unallocated_floor {
            return 0;
        }
        let sweep = self.sweep;
        let mut bound = 0i64;
        for span in &sweep.buffer_data[i].section_spans {
            if span.window.duration() == 0 {
                continue;
            }
            for s in span.section_range.lower..span.section_range.upper {
                let mut occupied: Vec<(i64, i64)> = Vec::new();
                for &j in &sweep.sections[s as usize] {
                    if j == i {
                        continue;
                    }
                    if let (Some(offset), Some(window)) =
                        (self.offsets[j], sweep.buffer_data[j].window_at(s as usize))
                    {
                        if window.duration() > 0 {
                            occupied.push((offset + window.lower, offset + window.upper));
                        }
                    }
                }
                occupied.sort_unstable();
                let mut prefix = 0i64;
                for (lo, hi) in occupied {
                    if lo <= prefix {
                        prefix = prefix.max(hi);
                    } else {
                        break;
                    }
                }
                bound = bound.max(prefix - span.window.lower);
            }
        }
        bound.max(0)
    }

    /// Interchangeable buffers must take offsets in index order.
    fn canonical_ok(&self, i: usize, offset: i64) -> bool {
        for &m in &self.twin_classes[self.twin_class_of[i]] {
            if m == i {
                continue;
            }
            if let Some(other) = self.offsets[m] {
                if m < i && other > offset {
                    return false;
                }
                if m > i && other < offset {
                    return false;
                }
            }
        }
        true
    }

    /// True when no buffer, assigned or not, can ever sit above `i` at
    /// `offset`; the highest legal placement then dominates all higher ones.
    fn nothing_fits_above(&self, i: usize, offset: i64) -> bool {
        for neighbor in &self.neighbors[i] {
            let j = neighbor.idx;
            match self.offsets[j] {
                Some(other) => {
                    // An assigned neighbor overhead blocks the climb.
                    if other + neighbor.es_in > offset {
                        return false;
                    }
                }
                None => {
                    let size = self.problem.buffers[j].size;
                    if self.capacity - size >= offset + neighbor.es_out {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// A candidate is dominated when the previously tried lower offset
    /// blocks a subset of every unassigned neighbor's admissible offsets:
    /// the failed subtree then covers this one.
    fn dominated(&self, i: usize, prev: i64, offset: i64) -> bool {
        for neighbor in &self.neighbors[i] {
            if self.offsets[neighbor.idx].is_some() {
                continue;
            }
            let lo = (prev - neighbor.es_in + 1).max(0);
            let hi = (prev + neighbor.es_out - 1).min(offset - neighbor.es_in);
            if lo > hi {
                continue;
            }
            if let Some(x) = self.next_candidate(neighbor.idx, lo) {
                if x <= hi {
                    return false;
                }
            }
        }
        true
    }

    fn assign(&mut self, i: usize, offset: i64) {
        let sweep = self.sweep;
        self.trail.push(Edit::Assign(i));
        self.offsets[i] = Some(offset);
        for span in &sweep.buffer_data[i].section_spans {
            let top = offset + span.window.upper;
            for s in span.section_range.lower..span.section_range.upper {
                let s = s as usize;
                if top > self.floors[s] {
                    self.trail.push(Edit::Floor {
                        section: s,
                        prev: self.floors[s],
                    });
                    self.floors[s] = top;
                }
            }
        }
    }

    fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            match self.trail.pop() {
                Some(Edit::Assign(i)) => self.offsets[i] = None,
                Some(Edit::Floor { section, prev }) => self.floors[section] = prev,
                None => break,
            }
        }
    }
}
