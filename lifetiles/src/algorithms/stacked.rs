use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::algorithms::buckets::BucketCache;
use crate::algorithms::lanes::{self, LaneItem};
use crate::graph::Graph;
use crate::model::{Mutation, SegmentId};

/// Segments are stacked together when they agree on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StackSignature {
    pub mutation: Option<Mutation>,
    pub collapsed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StackedGroup {
    pub id: u32,
    pub first_bucket: usize,
    pub last_bucket: usize,
    pub start: u64,
    pub end: u64,
    pub signature: StackSignature,
    pub members: Vec<SegmentId>,
    /// Tallest member height; a group renders as one collapsed tile.
    pub height: u32,
    pub representative: SegmentId,
    pub lane_start: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StackedLevel {
    pub depth: u32,
    pub span: usize, // buckets per range
    pub groups: Vec<StackedGroup>,
    pub lane_count: u32,
}

impl StackedLevel {
    /// Groups whose bucket range intersects `[start, end]`.
    ///
    /// `groups` is ordered by `first_bucket` and ranges never overlap, so
    /// `last_bucket` is ordered too.
    pub fn groups_in(&self, start: usize, end: usize) -> impl Iterator<Item = &StackedGroup> {
        let lo = self.groups.partition_point(|g| g.last_bucket < start);
        self.groups[lo..]
            .iter()
            .take_while(move |g| g.first_bucket <= end)
    }
}

fn signature_of(g: &Graph, id: SegmentId) -> StackSignature {
    let s = &g.segments[id as usize];
    StackSignature {
        mutation: s.mutation,
        collapsed: s.content.is_collapsed(),
    }
}

/// Aggregates the indexed segments into ranges of `2^depth` buckets.
pub fn build_level(g: &Graph, index: &BucketCache, depth: u32) -> StackedLevel {
    let span = 1usize << depth.min(usize::BITS - 1);
    let n = index.number_buckets();
    let mut groups: Vec<StackedGroup> = Vec::new();
    let mut first = 0usize;
    while first < n {
        let last = first.saturating_add(span - 1).min(n - 1);
        let mut by_sig: BTreeMap<StackSignature, Vec<SegmentId>> = BTreeMap::new();
        for id in index.visible_segments(first, last) {
            by_sig.entry(signature_of(g, id)).or_default().push(id);
        }
        let start = index.bucket_span(first).0;
        let end = index.bucket_span(last).1.min(index.extent());
        for (signature, members) in by_sig {
            let mut representative = members[0];
            let mut height = 0u32;
            for id in &members {
                let h = index.height_of(*id).unwrap_or(0);
                if h > height {
                    height = h;
                    representative = *id;
                }
            }
            groups.push(StackedGroup {
                id: groups.len() as u32,
                first_bucket: first,
                last_bucket: last,
                start,
                end,
                signature,
                members,
                height,
                representative,
                lane_start: 0,
            });
        }
        first = last + 1;
    }
    let layout = lanes::pack(groups.iter().map(|gr| LaneItem {
        id: gr.id,
        start: gr.start,
        end: gr.end,
        height: gr.height,
    }));
    for gr in groups.iter_mut() {
        if let Some(slot) = layout.slot(gr.id) {
            gr.lane_start = slot.lane_start;
        }
    }
    log::debug!(
        "stacked level {}: {} groups over {} lanes",
        depth,
        groups.len(),
        layout.lane_count
    );
    StackedLevel {
        depth,
        span,
        groups,
        lane_count: layout.lane_count,
    }
}

/// Lazily built stacked levels for one bucket index.
#[derive(Debug, Default)]
pub struct StackCache {
    levels: Vec<OnceLock<StackedLevel>>, // depth is index
}

impl StackCache {
    pub fn new(max_depth: u32) -> Self {
        StackCache {
            levels: (0..=max_depth).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.levels.len().saturating_sub(1) as u32
    }

    pub fn is_built(&self, depth: u32) -> bool {
        self.levels
            .get(depth as usize)
            .is_some_and(|l| l.get().is_some())
    }

    /// Returns the level for `depth` (clamped), building it on first use.
    pub fn level(&self, g: &Graph, index: &BucketCache, depth: u32) -> Option<&StackedLevel> {
        let depth = depth.min(self.max_depth());
        let cell = self.levels.get(depth as usize)?;
        Some(cell.get_or_init(|| build_level(g, index, depth)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::rebuild::CancelToken;
    use crate::model::{SegmentContent, SequenceSegment};

    fn graph() -> Graph {
        let mut g = Graph::new();
        let a = g.intern_sequence("a").unwrap();
        let b = g.intern_sequence("b").unwrap();
        let mut add = |lo: u64, hi: u64, srcs: &[u32], m: Option<Mutation>| {
            g.add_vertex(SequenceSegment {
                start: lo,
                end: hi,
                unified_start: lo,
                unified_end: hi,
                content: SegmentContent::Sequence("N".repeat((hi - lo) as usize)),
                sources: srcs.iter().copied().collect(),
                mutation: m,
            })
            .unwrap();
        };
        add(0, 10, &[a, b], None);
        add(10, 12, &[a], Some(Mutation::Polymorphism));
        add(10, 12, &[b], None);
        add(12, 40, &[a, b], None);
        g
    }

    #[test]
    fn groups_split_by_signature_and_take_max_height() {
        let g = graph();
        let idx = BucketCache::unified(&g, None, Some(10), 8, &CancelToken::never()).unwrap();
        let level = build_level(&g, &idx, 0);
        assert_eq!(level.span, 1);
        let second: Vec<&StackedGroup> = level.groups_in(1, 1).filter(|gr| gr.first_bucket == 1).collect();
        assert_eq!(second.len(), 2);
        let plain = second.iter().find(|gr| gr.signature.mutation.is_none()).unwrap();
        assert_eq!(plain.members, vec![2, 3]);
        assert_eq!(plain.height, 2);
        assert_eq!(plain.representative, 3);
    }

    #[test]
    fn range_lookup_matches_a_full_scan() {
        let g = graph();
        let idx = BucketCache::unified(&g, None, Some(10), 8, &CancelToken::never()).unwrap();
        for depth in 0..3 {
            let level = build_level(&g, &idx, depth);
            for start in 0..5 {
                for end in start..5 {
                    let fast: Vec<u32> = level.groups_in(start, end).map(|gr| gr.id).collect();
                    let slow: Vec<u32> = level
                        .groups
                        .iter()
                        .filter(|gr| gr.first_bucket <= end && start <= gr.last_bucket)
                        .map(|gr| gr.id)
                        .collect();
                    assert_eq!(fast, slow, "depth {} [{}, {}]", depth, start, end);
                }
            }
        }
    }

    #[test]
    fn deeper_levels_merge_buckets() {
        let g = graph();
        let idx = BucketCache::unified(&g, None, Some(10), 8, &CancelToken::never()).unwrap();
        let level = build_level(&g, &idx, 2);
        assert_eq!(level.span, 4);
        assert!(level.groups.iter().all(|gr| gr.first_bucket == 0 && gr.last_bucket == 3));
        assert_eq!(level.groups.len(), 2);
        // Both groups cover the same range, so they stack.
        let lanes: Vec<u32> = level.groups.iter().map(|gr| gr.lane_start).collect();
        assert_eq!(lanes, vec![0, 2]);
    }

    #[test]
    fn cache_builds_once() {
        let g = graph();
        let idx = BucketCache::unified(&g, None, Some(10), 8, &CancelToken::never()).unwrap();
        let cache = StackCache::new(3);
        assert!(!cache.is_built(1));
        let a = cache.level(&g, &idx, 1).unwrap() as *const StackedLevel;
        assert!(cache.is_built(1));
        let b = cache.level(&g, &idx, 1).unwrap() as *const StackedLevel;
        assert_eq!(a, b);
        assert_eq!(cache.level(&g, &idx, 99).unwrap().depth, 3);
    }
}
