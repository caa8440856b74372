use std::collections::BTreeSet;

use crate::algorithms::rebuild::CancelToken;
use crate::error::Result;
use crate::graph::{Graph, OrderKey};
use crate::limits;
use crate::model::{SegmentId, SequenceId, SequenceSegment};

/// Cancellation is polled once per this many segments while building.
const CANCEL_STRIDE: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Indexed {
    pub lo: u64,
    pub hi: u64,
    pub height: u32,
    pub first: usize,
    pub last: usize,
}

/// Fixed-width bucket index over a 1D coordinate space.
///
/// Every indexed segment is registered in each bucket its half-open interval
/// `[lo, hi)` touches, and in no other bucket.
#[derive(Clone, Debug)]
pub struct BucketCache {
    pub(crate) width: u64,
    pub(crate) extent: u64,
    pub(crate) buckets: Vec<Vec<OrderKey>>,
    pub(crate) per_segment: Vec<Option<Indexed>>, // segment id is index
    pub(crate) indexed: usize,
    pub(crate) built_ver: u64,
}

/// Picks a width so that buckets hold roughly `target` segments each, while
/// keeping the bucket count under [`limits::MAX_BUCKETS`].
pub fn choose_bucket_width(extent: u64, count: usize, target: u32) -> u64 {
    if count == 0 || extent == 0 {
        return extent.max(1);
    }
    let target = target.max(1) as u128;
    let w = (extent as u128 * target).div_ceil(count as u128) as u64;
    let floor = extent.div_ceil(limits::MAX_BUCKETS as u64);
    w.max(floor).max(1)
}

fn bucket_ix(width: u64, x: u64) -> usize {
    (x / width) as usize
}

impl BucketCache {
    /// Indexes segments by unified interval. A segment is eligible when at
    /// least one of its sources passes the visibility filter.
    pub fn unified(
        g: &Graph,
        visible: Option<&BTreeSet<SequenceId>>,
        width: Option<u64>,
        target: u32,
        cancel: &CancelToken,
    ) -> Result<Self> {
        Self::build_with(g, width, target, cancel, |_, s| {
            let h = s.visible_height(visible);
            (h > 0).then_some((s.unified_start, s.unified_end, h))
        })
    }

    /// Indexes the segments traversed by `sequence` by their own source
    /// coordinates. Used to resolve genome positions against a reference.
    pub fn for_sequence(
        g: &Graph,
        sequence: SequenceId,
        width: Option<u64>,
        target: u32,
        cancel: &CancelToken,
    ) -> Result<Self> {
        Self::build_with(g, width, target, cancel, |_, s| {
            (s.sources.contains(&sequence) && s.end > s.start).then_some((s.start, s.end, 1))
        })
    }

    pub(crate) fn build_with<F>(
        g: &Graph,
        width: Option<u64>,
        target: u32,
        cancel: &CancelToken,
        interval: F,
    ) -> Result<Self>
    where
        F: Fn(SegmentId, &SequenceSegment) -> Option<(u64, u64, u32)>,
    {
        let mut spans: Vec<Option<(u64, u64, u32)>> = Vec::with_capacity(g.segments.len());
        let mut extent = 0u64;
        let mut count = 0usize;
        for (i, s) in g.segments.iter().enumerate() {
            if i % CANCEL_STRIDE == 0 {
                cancel.check()?;
            }
            let span = interval(i as SegmentId, s).filter(|(lo, hi, h)| hi > lo && *h > 0);
            if let Some((_, hi, _)) = span {
                extent = extent.max(hi);
                count += 1;
            }
            spans.push(span);
        }
        let width = width
            .filter(|w| *w > 0)
            .unwrap_or_else(|| choose_bucket_width(extent, count, target))
            .max(extent.div_ceil(limits::MAX_BUCKETS as u64))
            .max(1);
        let n = (extent.div_ceil(width) as usize).max(1);
        let mut buckets: Vec<Vec<OrderKey>> = vec![Vec::new(); n];
        let mut per_segment: Vec<Option<Indexed>> = vec![None; spans.len()];
        for (i, span) in spans.into_iter().enumerate() {
            if i % CANCEL_STRIDE == 0 {
                cancel.check()?;
            }
            let Some((lo, hi, height)) = span else {
                continue;
            };
            let first = bucket_ix(width, lo).min(n - 1);
            let last = bucket_ix(width, hi - 1).min(n - 1);
            let key = (g.segments[i].unified_start, i as SegmentId);
            for b in &mut buckets[first..=last] {
                b.push(key);
            }
            per_segment[i] = Some(Indexed {
                lo,
                hi,
                height,
                first,
                last,
            });
        }
        for b in buckets.iter_mut() {
            b.sort_unstable();
        }
        log::debug!(
            "bucket index built: {} segments in {} buckets of width {}",
            count,
            n,
            width
        );
        Ok(BucketCache {
            width,
            extent,
            buckets,
            per_segment,
            indexed: count,
            built_ver: g.struct_version(),
        })
    }

    pub fn bucket_width(&self) -> u64 {
        self.width
    }
    pub fn number_buckets(&self) -> usize {
        self.buckets.len()
    }
    /// Highest indexed end coordinate.
    pub fn extent(&self) -> u64 {
        self.extent
    }
    pub fn indexed_count(&self) -> usize {
        self.indexed
    }
    /// Structure version of the graph this index was built from.
    pub fn built_version(&self) -> u64 {
        self.built_ver
    }

    /// `floor(coordinate / width)` clamped to the valid bucket range.
    pub fn bucket_position(&self, coordinate: f64) -> usize {
        if !coordinate.is_finite() || coordinate <= 0.0 {
            return 0;
        }
        let b = (coordinate / self.width as f64).floor();
        (b as usize).min(self.buckets.len() - 1)
    }

    /// Half-open coordinate range covered by bucket `b`.
    pub fn bucket_span(&self, b: usize) -> (u64, u64) {
        let lo = b as u64 * self.width;
        (lo, lo + self.width)
    }

    pub fn bucket(&self, b: usize) -> impl Iterator<Item = SegmentId> + '_ {
        self.buckets
            .get(b)
            .into_iter()
            .flat_map(|list| list.iter().map(|(_, id)| *id))
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.indexed_entry(id).is_some()
    }

    pub(crate) fn indexed_entry(&self, id: SegmentId) -> Option<&Indexed> {
        self.per_segment.get(id as usize).and_then(|e| e.as_ref())
    }

    /// Inclusive bucket range a segment is registered in.
    pub fn buckets_of(&self, id: SegmentId) -> Option<(usize, usize)> {
        self.indexed_entry(id).map(|e| (e.first, e.last))
    }

    /// Height the segment was indexed with (visible source count).
    pub fn height_of(&self, id: SegmentId) -> Option<u32> {
        self.indexed_entry(id).map(|e| e.height)
    }

    /// Deduplicated segments registered in buckets `[start, end]`, in
    /// (unified start, identity) order.
    pub fn visible_segments(&self, start: usize, end: usize) -> Vec<SegmentId> {
        let end = end.min(self.buckets.len() - 1);
        if start > end {
            return Vec::new();
        }
        let mut out: Vec<OrderKey> = Vec::new();
        for b in start..=end {
            for key in &self.buckets[b] {
                // Report a multi-bucket segment only from its first bucket in range.
                let first = self.per_segment[key.1 as usize].map_or(b, |e| e.first);
                if first.max(start) == b {
                    out.push(*key);
                }
            }
        }
        out.sort_unstable();
        out.into_iter().map(|(_, id)| id).collect()
    }

    /// Segments whose indexed interval intersects `[lo, hi)`.
    pub fn segments_overlapping(&self, lo: u64, hi: u64) -> Vec<SegmentId> {
        if hi <= lo {
            return Vec::new();
        }
        let start = bucket_ix(self.width, lo).min(self.buckets.len() - 1);
        let end = bucket_ix(self.width, hi - 1).min(self.buckets.len() - 1);
        self.visible_segments(start, end)
            .into_iter()
            .filter(|id| {
                self.indexed_entry(*id)
                    .is_some_and(|e| e.lo < hi && lo < e.hi)
            })
            .collect()
    }

    /// Segments whose indexed interval contains `x`.
    pub fn segments_at(&self, x: u64) -> Vec<SegmentId> {
        self.segments_overlapping(x, x.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SegmentContent;

    fn graph(spans: &[(u64, u64, usize)]) -> Graph {
        let mut g = Graph::new();
        let names: Vec<u32> = (0..4)
            .map(|i| g.intern_sequence(&format!("s{}", i)).unwrap())
            .collect();
        for (lo, hi, h) in spans {
            g.add_vertex(SequenceSegment {
                start: *lo,
                end: *hi,
                unified_start: *lo,
                unified_end: *hi,
                content: SegmentContent::Sequence(String::new()),
                sources: names[..*h].iter().copied().collect(),
                mutation: None,
            })
            .unwrap();
        }
        g
    }

    #[test]
    fn width_100_extent_250_gives_three_buckets() {
        let g = graph(&[(0, 90, 1), (90, 120, 1), (120, 250, 1)]);
        let idx = BucketCache::unified(&g, None, Some(100), 8, &CancelToken::never()).unwrap();
        assert_eq!(idx.number_buckets(), 3);
        assert_eq!(idx.buckets_of(1), Some((0, 1)));
        assert!(idx.bucket(0).any(|s| s == 1));
        assert!(idx.bucket(1).any(|s| s == 1));
        assert!(!idx.bucket(2).any(|s| s == 1));
    }

    #[test]
    fn bucket_position_clamps() {
        let g = graph(&[(0, 250, 1)]);
        let idx = BucketCache::unified(&g, None, Some(100), 8, &CancelToken::never()).unwrap();
        assert_eq!(idx.bucket_position(-5.0), 0);
        assert_eq!(idx.bucket_position(99.9), 0);
        assert_eq!(idx.bucket_position(100.0), 1);
        assert_eq!(idx.bucket_position(10_000.0), 2);
        assert_eq!(idx.bucket_position(f64::NAN), 0);
    }

    #[test]
    fn visible_segments_are_deduplicated() {
        let g = graph(&[(0, 300, 2), (150, 160, 1)]);
        let idx = BucketCache::unified(&g, None, Some(100), 8, &CancelToken::never()).unwrap();
        assert_eq!(idx.visible_segments(0, 2), vec![0, 1]);
        assert_eq!(idx.visible_segments(1, 1), vec![0, 1]);
        assert_eq!(idx.visible_segments(2, 2), vec![0]);
        assert!(idx.visible_segments(2, 1).is_empty());
    }

    #[test]
    fn filter_excludes_segments_without_visible_sources() {
        let g = graph(&[(0, 10, 1), (10, 20, 3)]);
        let only_s2: BTreeSet<SequenceId> = [2].into_iter().collect();
        let idx =
            BucketCache::unified(&g, Some(&only_s2), Some(5), 8, &CancelToken::never()).unwrap();
        assert!(!idx.contains(0));
        assert_eq!(idx.height_of(1), Some(1));
        assert_eq!(idx.indexed_count(), 1);
    }

    #[test]
    fn point_lookup_uses_half_open_intervals() {
        let g = graph(&[(0, 10, 1), (10, 20, 1)]);
        let idx = BucketCache::unified(&g, None, Some(4), 8, &CancelToken::never()).unwrap();
        assert_eq!(idx.segments_at(9), vec![0]);
        assert_eq!(idx.segments_at(10), vec![1]);
        assert!(idx.segments_at(25).is_empty());
    }

    #[test]
    fn auto_width_targets_segment_density() {
        assert_eq!(choose_bucket_width(1000, 100, 10), 100);
        assert_eq!(choose_bucket_width(0, 0, 10), 1);
        assert!(choose_bucket_width(u64::MAX / 4, 1, 1) >= (u64::MAX / 4) / limits::MAX_BUCKETS as u64);
    }
}
