//! Line sweep over buffer segments.
//!
//! The sweeper converts the continuous-time problem into a discrete one:
//! *sections* are maximal time ranges between buffer retirements, *partitions*
//! are runs of sections connected by at least one straddling buffer, and the
//! per-buffer data records which sections a buffer occupies (with which
//! window) and which other buffers it can ever collide with.
//!
//! A section is sealed whenever some segment ends; buffers whose segments
//! continue across the seal carry over into the next section, so two buffers
//! share a section if and only if they are live at a common instant.

use crate::problem::{Interval, Problem};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

/// Whether a sweep point opens or closes a segment.
///
/// `Right` sorts before `Left` so that retiring segments release their
/// section before starting ones claim the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SweepPointKind {
    Right,
    Left,
}

/// One endpoint of a buffer segment on the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPoint {
    pub buffer_idx: usize,
    pub time: i64,
    pub kind: SweepPointKind,
    /// The window of the segment this point bounds.
    pub window: Interval,
    /// True when this point is the outer boundary of the buffer's lifespan.
    pub endpoint: bool,
}

impl Ord for SweepPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.buffer_idx.cmp(&other.buffer_idx))
    }
}

impl PartialOrd for SweepPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A buffer's contiguous run of sections under a single window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    /// Range of section indices, half-open.
    pub section_range: Interval,
    pub window: Interval,
}

/// A maximal set of sections connected by straddling buffers; an independent
/// sub-problem for the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Member buffers, in order of first appearance.
    pub buffer_idxs: Vec<usize>,
    /// Range of section indices, half-open.
    pub section_range: Interval,
}

/// A potential collision partner of a buffer.
///
/// The value stored under buffer `i` against `j` is the separation `i`
/// demands when it sits below `j`: `offset_j >= offset_i + effective_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub buffer_idx: usize,
    pub effective_size: i64,
}

/// Per-buffer sweep output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferData {
    pub section_spans: Vec<SectionSpan>,
    /// Collision partners, sorted by buffer index.
    pub overlaps: Vec<Overlap>,
}

impl BufferData {
    /// The window this buffer holds in the given section, if it occupies it.
    pub fn window_at(&self, section: usize) -> Option<Interval> {
        let section = section as i64;
        self.section_spans
            .iter()
            .find(|span| span.section_range.lower <= section && section < span.section_range.upper)
            .map(|span| span.window)
    }

    /// First and last occupied section, as a half-open range.
    pub fn section_range(&self) -> Option<Interval> {
        let first = self.section_spans.first()?;
        let last = self.section_spans.last()?;
        Some(Interval::new(
            first.section_range.lower,
            last.section_range.upper,
        ))
    }
}

/// The complete sweep output for a problem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// Member buffers per section, ascending.
    pub sections: Vec<Vec<usize>>,
    pub partitions: Vec<Partition>,
    pub buffer_data: Vec<BufferData>,
}

impl SweepResult {
    /// For each inner section boundary, the number of buffers whose overall
    /// section range crosses it. Low counts mark cheap places to split.
    pub fn calculate_cuts(&self) -> Vec<usize> {
        let boundaries = self.sections.len().saturating_sub(1);
        let mut cuts = vec![0usize; boundaries];
        for data in &self.buffer_data {
            if let Some(range) = data.section_range() {
                let first = range.lower.max(0) as usize;
                let last = range.upper as usize; // exclusive
                for cut in cuts.iter_mut().take(last.saturating_sub(1)).skip(first) {
                    *cut += 1;
                }
            }
        }
        cuts
    }

    /// Per section, the total height its members occupy.
    ///
    /// This is a hard lower bound on any feasible capacity.
    pub fn section_loads(&self) -> Vec<i64> {
        let mut loads = vec![0i64; self.sections.len()];
        for data in &self.buffer_data {
            for span in &data.section_spans {
                let height = span.window.duration();
                for s in span.section_range.lower..span.section_range.upper {
                    loads[s as usize] += height;
                }
            }
        }
        loads
    }
}

/// Build the sorted sweep points for a problem.
pub fn create_points(problem: &Problem) -> Vec<SweepPoint> {
    let mut points = Vec::with_capacity(problem.buffers.len() * 2);
    for (buffer_idx, buffer) in problem.buffers.iter().enumerate() {
        for segment in buffer.segments() {
            points.push(SweepPoint {
                buffer_idx,
                time: segment.time.lower,
                kind: SweepPointKind::Left,
                window: segment.window,
                endpoint: segment.time.lower == buffer.lifespan.lower,
            });
            points.push(SweepPoint {
                buffer_idx,
                time: segment.time.upper,
                kind: SweepPointKind::Right,
                window: segment.window,
                endpoint: segment.time.upper == buffer.lifespan.upper,
            });
        }
    }
    points.sort();
    points
}

/// Run the sweep: sections, partitions, and per-buffer spans and overlaps.
pub fn sweep(problem: &Problem) -> SweepResult {
    let n = problem.buffers.len();
    let points = create_points(problem);

    let mut sections: Vec<Vec<usize>> = Vec::new();
    let mut partitions: Vec<Partition> = Vec::new();
    let mut buffer_data: Vec<BufferData> = vec![BufferData::default(); n];

    let mut actives: Vec<usize> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut span_start = vec![0usize; n];
    let mut open_lifespans = 0i64;
    let mut partition_first_section = 0usize;
    let mut partition_members: Vec<usize> = Vec::new();

    let mut idx = 0;
    while idx < points.len() {
        let time = points[idx].time;
        let mut end = idx;
        while end < points.len() && points[end].time == time {
            end += 1;
        }
        let group = &points[idx..end];

        // Rights sort first within a time group; any of them seals the
        // section under construction.
        if group[0].kind == SweepPointKind::Right {
            sections.push(current.clone());
            for point in group.iter().filter(|p| p.kind == SweepPointKind::Right) {
                let b = point.buffer_idx;
                buffer_data[b].section_spans.push(SectionSpan {
                    section_range: Interval::new(span_start[b] as i64, sections.len() as i64),
                    window: point.window,
                });
                if let Ok(pos) = actives.binary_search(&b) {
                    actives.remove(pos);
                }
                if point.endpoint {
                    open_lifespans -= 1;
                }
            }
            current = actives.clone();
            if open_lifespans == 0 {
                partitions.push(Partition {
                    buffer_idxs: std::mem::take(&mut partition_members),
                    section_range: Interval::new(
                        partition_first_section as i64,
                        sections.len() as i64,
                    ),
                });
                partition_first_section = sections.len();
            }
        }

        for point in group.iter().filter(|p| p.kind == SweepPointKind::Left) {
            let b = point.buffer_idx;
            if let Err(pos) = actives.binary_search(&b) {
                actives.insert(pos, b);
            }
            if let Err(pos) = current.binary_search(&b) {
                current.insert(pos, b);
            }
            span_start[b] = sections.len();
            if point.endpoint {
                open_lifespans += 1;
                partition_members.push(b);
            }
        }

        idx = end;
    }

    compute_overlaps(&sections, &mut buffer_data);

    SweepResult {
        sections,
        partitions,
        buffer_data,
    }
}

/// Populate pairwise overlaps: two buffers overlap iff they co-occupy a
/// section, and each direction's effective size is the worst-case separation
/// over their common sections.
fn compute_overlaps(sections: &[Vec<usize>], buffer_data: &mut [BufferData]) {
    let mut pairs: FxHashSet<(usize, usize)> = FxHashSet::default();
    for members in sections {
        for (k, &a) in members.iter().enumerate() {
            for &b in &members[k + 1..] {
                pairs.insert((a, b));
            }
        }
    }
    let mut pair_list: Vec<(usize, usize)> = pairs.into_iter().collect();
    pair_list.sort_unstable();

    for (i, j) in pair_list {
        let mut es_ij = i64::MIN;
        let mut es_ji = i64::MIN;
        for si in &buffer_data[i].section_spans {
            for sj in &buffer_data[j].section_spans {
                if si.section_range.overlaps(&sj.section_range) {
                    es_ij = es_ij.max(si.window.upper - sj.window.lower);
                    es_ji = es_ji.max(sj.window.upper - si.window.lower);
                }
            }
        }
        debug_assert!(es_ij > i64::MIN && es_ji > i64::MIN);
        buffer_data[i].overlaps.push(Overlap {
            buffer_idx: j,
            effective_size: es_ij,
        });
        buffer_data[j].overlaps.push(Overlap {
            buffer_idx: i,
            effective_size: es_ji,
        });
    }

    for data in buffer_data {
        data.overlaps
            .sort_unstable_by_key(|o| (o.buffer_idx, o.effective_size));
    }
}
