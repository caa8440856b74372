use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use crate::algorithms::buckets::BucketCache;
use crate::algorithms::lanes::{self, LaneItem, LaneLayout};
use crate::algorithms::stacked::{StackCache, StackedLevel};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::model::SequenceId;

/// Lets a build notice that a newer one has been requested.
#[derive(Clone, Debug)]
pub struct CancelToken {
    latest: Option<Arc<AtomicU64>>,
    generation: u64,
}

impl CancelToken {
    /// A token that is never superseded.
    pub fn never() -> Self {
        CancelToken {
            latest: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_superseded(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|l| l.load(Ordering::Acquire) != self.generation)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_superseded() {
            return Err(Error::RebuildSuperseded(self.generation));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct RebuildRequest {
    pub graph: Arc<Graph>,
    pub visible: Option<BTreeSet<SequenceId>>,
    pub bucket_width: Option<u64>,
    pub target_per_bucket: u32,
    pub max_stack_depth: u32,
}

/// Everything the viewport reads while panning. Immutable once published;
/// stacked levels fill in lazily behind `OnceLock`s.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub generation: u64,
    pub graph: Arc<Graph>,
    /// `max_unified_end` of `graph`.
    pub extent: u64,
    pub visible: Option<BTreeSet<SequenceId>>,
    pub buckets: BucketCache,
    pub stacks: StackCache,
}

impl IndexSnapshot {
    pub fn build(req: RebuildRequest, token: &CancelToken) -> Result<Self> {
        let buckets = BucketCache::unified(
            &req.graph,
            req.visible.as_ref(),
            req.bucket_width,
            req.target_per_bucket,
            token,
        )?;
        token.check()?;
        Ok(IndexSnapshot {
            generation: token.generation(),
            extent: req.graph.max_unified_end(),
            graph: req.graph,
            visible: req.visible,
            buckets,
            stacks: StackCache::new(req.max_stack_depth),
        })
    }

    /// Per-segment lane layout for buckets `[start, end]`.
    pub fn layout(&self, start: usize, end: usize) -> LaneLayout {
        let items = self
            .buckets
            .visible_segments(start, end)
            .into_iter()
            .filter_map(|id| {
                let s = self.graph.segment(id)?;
                Some(LaneItem {
                    id,
                    start: s.unified_start,
                    end: s.unified_end,
                    height: self.buckets.height_of(id)?,
                })
            });
        lanes::pack(items)
    }

    pub fn stacked(&self, depth: u32) -> Option<&StackedLevel> {
        self.stacks.level(&self.graph, &self.buckets, depth)
    }
}

type Finished = (u64, Result<IndexSnapshot>);

/// Runs index rebuilds and publishes only the most recently requested one.
///
/// With the `threads` feature builds run on a worker thread; otherwise they
/// run inline inside [`Rebuilder::request`] and are picked up by the next poll.
pub struct Rebuilder {
    latest: Arc<AtomicU64>,
    tx: Sender<Finished>,
    rx: Receiver<Finished>,
    pending: usize,
}

impl Default for Rebuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Rebuilder {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Rebuilder {
            latest: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            pending: 0,
        }
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Starts a rebuild, superseding any in flight. Returns its generation.
    pub fn request(&mut self, req: RebuildRequest) -> u64 {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancelToken {
            latest: Some(self.latest.clone()),
            generation,
        };
        log::debug!("rebuild {} requested", generation);
        self.pending += 1;
        let tx = self.tx.clone();
        #[cfg(feature = "threads")]
        std::thread::spawn(move || {
            let res = IndexSnapshot::build(req, &token);
            let _ = tx.send((generation, res));
        });
        #[cfg(not(feature = "threads"))]
        {
            let res = IndexSnapshot::build(req, &token);
            let _ = tx.send((generation, res));
        }
        generation
    }

    fn accept(&self, generation: u64, res: Result<IndexSnapshot>) -> Option<Result<Arc<IndexSnapshot>>> {
        let latest = self.latest_generation();
        match res {
            Ok(snap) if generation == latest => {
                log::debug!("rebuild {} published", generation);
                Some(Ok(Arc::new(snap)))
            }
            Err(Error::RebuildSuperseded(_)) | Ok(_) => {
                log::warn!("rebuild {} superseded by {}", generation, latest);
                None
            }
            Err(e) if generation == latest => Some(Err(e)),
            Err(e) => {
                log::warn!("stale rebuild {} failed: {}", generation, e);
                None
            }
        }
    }

    /// Collects finished builds without blocking. Yields the newest build if
    /// it belongs to the latest request.
    pub fn poll(&mut self) -> Option<Result<Arc<IndexSnapshot>>> {
        let mut out = None;
        while let Ok((generation, res)) = self.rx.try_recv() {
            self.pending = self.pending.saturating_sub(1);
            if let Some(r) = self.accept(generation, res) {
                out = Some(r);
            }
        }
        out
    }

    /// Blocks until every requested build has finished.
    pub fn wait(&mut self) -> Option<Result<Arc<IndexSnapshot>>> {
        let mut out = None;
        while self.pending > 0 {
            let Ok((generation, res)) = self.rx.recv() else {
                break;
            };
            self.pending -= 1;
            if let Some(r) = self.accept(generation, res) {
                out = Some(r);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SegmentContent, SequenceSegment};

    fn request(n: u64) -> RebuildRequest {
        let mut g = Graph::new();
        let a = g.intern_sequence("a").unwrap();
        for i in 0..n {
            g.add_vertex(SequenceSegment {
                start: i * 10,
                end: i * 10 + 10,
                unified_start: i * 10,
                unified_end: i * 10 + 10,
                content: SegmentContent::Sequence("ACGTACGTAC".into()),
                sources: [a].into_iter().collect(),
                mutation: None,
            })
            .unwrap();
        }
        RebuildRequest {
            graph: Arc::new(g),
            visible: None,
            bucket_width: Some(100),
            target_per_bucket: 8,
            max_stack_depth: 4,
        }
    }

    #[test]
    fn superseded_token_fails_check() {
        let latest = Arc::new(AtomicU64::new(2));
        let token = CancelToken {
            latest: Some(latest.clone()),
            generation: 1,
        };
        assert!(matches!(token.check(), Err(Error::RebuildSuperseded(1))));
        assert!(CancelToken::never().check().is_ok());
    }

    #[test]
    fn only_latest_request_is_published() {
        let mut rb = Rebuilder::new();
        let first = rb.request(request(10));
        let second = rb.request(request(20));
        assert!(second > first);
        let snap = rb.wait().unwrap().unwrap();
        assert_eq!(snap.generation, second);
        assert_eq!(snap.buckets.indexed_count(), 20);
        assert_eq!(rb.pending(), 0);
        assert!(rb.poll().is_none());
    }

    #[test]
    fn stale_token_abandons_the_build() {
        let latest = Arc::new(AtomicU64::new(5));
        let token = CancelToken {
            latest: Some(latest),
            generation: 4,
        };
        let err = IndexSnapshot::build(request(3), &token).unwrap_err();
        assert_eq!(err.code(), "rebuild_superseded");
    }

    #[test]
    fn snapshot_records_extent() {
        let snap = IndexSnapshot::build(request(7), &CancelToken::never()).unwrap();
        assert_eq!(snap.extent, 70);
    }

    #[cfg(feature = "threads")]
    #[test]
    fn worker_build_is_superseded_mid_flight() {
        let mut rb = Rebuilder::new();
        let old = rb.request(request(3));
        let held = rb.wait().unwrap().unwrap();
        assert_eq!(held.generation, old);

        let big = rb.request(request(50_000));
        let small = rb.request(request(4));
        assert!(small > big);
        // The held snapshot stays usable while workers run.
        assert_eq!(held.layout(0, 0).len(), 3);
        let snap = rb.wait().unwrap().unwrap();
        assert_eq!(snap.generation, small);
        assert_eq!(snap.buckets.indexed_count(), 4);
        assert_eq!(rb.pending(), 0);
    }

    #[test]
    fn layout_reads_from_snapshot() {
        let snap = IndexSnapshot::build(request(5), &CancelToken::never()).unwrap();
        let l = snap.layout(0, 0);
        assert_eq!(l.len(), 5);
        assert!(l.slots.iter().all(|s| s.lane_start == 0));
        assert_eq!(l.lane_count, 1);
    }
}
