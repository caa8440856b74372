use serde::Serialize;

use crate::algorithms::buckets::BucketCache;
use crate::algorithms::rebuild::CancelToken;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::limits;
use crate::model::{GeneAnnotation, KnownMutation, SegmentId, SequenceId};

const POSITION_TARGET_PER_BUCKET: u32 = 8;

/// A known mutation pinned to a segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub segment: SegmentId,
    /// Position inside the segment, relative to its start.
    pub offset: u64,
    pub mutation: KnownMutation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MappedAnnotation {
    pub segments: Vec<SegmentId>,
    pub annotation: GeneAnnotation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mapping<T> {
    pub mapped: Vec<T>,
    pub unmapped: usize,
}

/// Resolves genome positions to segments.
///
/// With a reference sequence positions are read in that sequence's own
/// coordinates, over the segments it traverses. Without one they are unified
/// coordinates over every segment.
#[derive(Clone, Debug)]
pub struct PositionIndex {
    reference: Option<SequenceId>,
    index: BucketCache,
}

impl PositionIndex {
    pub fn new(g: &Graph, reference: Option<SequenceId>) -> Result<Self> {
        let never = CancelToken::never();
        let index = match reference {
            Some(seq) => {
                if g.sequence_name(seq).is_none() {
                    return Err(Error::InvalidReference {
                        kind: "sequence",
                        id: seq,
                    });
                }
                BucketCache::for_sequence(g, seq, None, POSITION_TARGET_PER_BUCKET, &never)?
            }
            None => BucketCache::unified(g, None, None, POSITION_TARGET_PER_BUCKET, &never)?,
        };
        Ok(PositionIndex { reference, index })
    }

    pub fn reference(&self) -> Option<SequenceId> {
        self.reference
    }

    /// Segment containing `pos`, with the offset from that segment's start
    /// in the index's own coordinates (`start` with a reference,
    /// `unified_start` without). The lowest in order wins when several do.
    pub fn segment_at(&self, pos: u64) -> Option<(SegmentId, u64)> {
        let id = *self.index.segments_at(pos).first()?;
        let lo = self.index.indexed_entry(id)?.lo;
        Some((id, pos - lo))
    }

    /// Segments intersecting `[lo, hi)`, in order.
    pub fn segments_overlapping(&self, lo: u64, hi: u64) -> Vec<SegmentId> {
        self.index.segments_overlapping(lo, hi)
    }
}

fn check_count(n: usize) -> Result<()> {
    if n > limits::MAX_ANNOTATIONS {
        return Err(Error::CapsExceeded {
            what: "annotations",
            limit: limits::MAX_ANNOTATIONS,
        });
    }
    Ok(())
}

pub fn map_known_mutations(
    index: &PositionIndex,
    records: &[KnownMutation],
) -> Result<Mapping<Bookmark>> {
    check_count(records.len())?;
    let mut mapped = Vec::with_capacity(records.len());
    let mut unmapped = 0usize;
    for m in records {
        match index.segment_at(m.genome_position) {
            Some((segment, offset)) => mapped.push(Bookmark {
                segment,
                offset,
                mutation: m.clone(),
            }),
            None => {
                log::warn!(
                    "known mutation '{}' at {} is outside the graph",
                    m.name,
                    m.genome_position
                );
                unmapped += 1;
            }
        }
    }
    log::info!(
        "mapped {} known mutations ({} unmapped)",
        mapped.len(),
        unmapped
    );
    Ok(Mapping { mapped, unmapped })
}

/// Annotations are half-open; an empty one (`start == end`) covers one base.
pub fn map_annotations(
    index: &PositionIndex,
    records: &[GeneAnnotation],
) -> Result<Mapping<MappedAnnotation>> {
    check_count(records.len())?;
    let mut mapped = Vec::with_capacity(records.len());
    let mut unmapped = 0usize;
    for a in records {
        let segments = if a.end < a.start {
            Vec::new()
        } else {
            index.segments_overlapping(a.start, a.end.max(a.start.saturating_add(1)))
        };
        if segments.is_empty() {
            log::warn!(
                "annotation '{}' [{}, {}) matches no segment",
                a.name,
                a.start,
                a.end
            );
            unmapped += 1;
            continue;
        }
        mapped.push(MappedAnnotation {
            segments,
            annotation: a.clone(),
        });
    }
    log::info!("mapped {} annotations ({} unmapped)", mapped.len(), unmapped);
    Ok(Mapping { mapped, unmapped })
}
