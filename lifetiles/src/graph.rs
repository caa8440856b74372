use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::limits;
use crate::model::{Edge, EdgeId, Mutation, SegmentId, SequenceId, SequenceSegment};

/// Total order over segments: unified start, then identity.
pub type OrderKey = (u64, SegmentId);

/// Directed acyclic sequence graph.
///
/// Segments are never removed, so a `SegmentId` stays valid for the lifetime of
/// the graph. Edges are tombstoned when split. Acyclicity is a caller
/// precondition: edges must be inserted in topological order.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub(crate) segments: Vec<SequenceSegment>, // id is index
    pub(crate) edges: Vec<Option<Edge>>,       // id is index
    pub(crate) incoming: Vec<Vec<EdgeId>>,
    pub(crate) outgoing: Vec<Vec<EdgeId>>,
    pub(crate) sources: BTreeSet<OrderKey>,
    pub(crate) sinks: BTreeSet<OrderKey>,
    pub(crate) sequences: Vec<String>, // id is index
    pub(crate) sequence_ids: HashMap<String, SequenceId>,
    pub(crate) struct_ver: u64,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            struct_ver: 1,
            ..Default::default()
        }
    }

    /// Monotonic structure version; increments on every successful edit.
    pub fn struct_version(&self) -> u64 {
        self.struct_ver
    }

    fn bump(&mut self) {
        self.struct_ver = self.struct_ver.wrapping_add(1);
    }

    // Sequences
    pub fn intern_sequence(&mut self, name: &str) -> Result<SequenceId> {
        if let Some(id) = self.sequence_ids.get(name) {
            return Ok(*id);
        }
        if self.sequences.len() >= limits::MAX_SEQUENCES {
            return Err(Error::CapsExceeded {
                what: "sequences",
                limit: limits::MAX_SEQUENCES,
            });
        }
        let id = self.sequences.len() as SequenceId;
        self.sequences.push(name.to_string());
        self.sequence_ids.insert(name.to_string(), id);
        Ok(id)
    }
    pub fn sequence_id(&self, name: &str) -> Option<SequenceId> {
        self.sequence_ids.get(name).copied()
    }
    pub fn sequence_name(&self, id: SequenceId) -> Option<&str> {
        self.sequences.get(id as usize).map(String::as_str)
    }
    pub fn sequences(&self) -> &[String] {
        &self.sequences
    }
    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    // Ordering
    pub fn order_key(&self, id: SegmentId) -> Option<OrderKey> {
        self.segments
            .get(id as usize)
            .map(|s| (s.unified_start, id))
    }

    fn key_of(&self, id: SegmentId) -> OrderKey {
        (self.segments[id as usize].unified_start, id)
    }

    /// Incident-edge order: destination first, then source, then identity.
    fn edge_order(&self, a: EdgeId, b: EdgeId) -> Ordering {
        match (self.edge(a), self.edge(b)) {
            (Some(ea), Some(eb)) => self
                .key_of(ea.destination)
                .cmp(&self.key_of(eb.destination))
                .then_with(|| self.key_of(ea.source).cmp(&self.key_of(eb.source)))
                .then_with(|| a.cmp(&b)),
            _ => a.cmp(&b),
        }
    }

    fn sorted_edges(&self, mut ids: Vec<EdgeId>) -> Vec<EdgeId> {
        ids.sort_by(|a, b| self.edge_order(*a, *b));
        ids
    }

    // Segments
    pub(crate) fn validate_segment(&self, seg: &SequenceSegment) -> Result<()> {
        if seg.unified_end <= seg.unified_start || seg.sources.is_empty() || seg.end < seg.start {
            return Err(Error::MalformedInterval {
                start: seg.unified_start,
                end: seg.unified_end,
                height: seg.height(),
            });
        }
        if !limits::in_coord_bounds(seg.unified_end) || !limits::in_coord_bounds(seg.end) {
            return Err(Error::OutOfBounds("segment coordinate"));
        }
        // Empty content means the bases were not supplied.
        let (len, span) = (seg.content.len(), seg.end - seg.start);
        if len != 0 && len != span {
            return Err(Error::ContentLength { len, span });
        }
        if let Some(bad) = seg
            .sources
            .iter()
            .find(|s| (**s as usize) >= self.sequences.len())
        {
            return Err(Error::InvalidReference {
                kind: "sequence",
                id: *bad,
            });
        }
        Ok(())
    }

    /// Inserts a segment. It starts out as both a source and a sink.
    pub fn add_vertex(&mut self, seg: SequenceSegment) -> Result<SegmentId> {
        self.validate_segment(&seg)?;
        if self.segments.len() >= limits::MAX_SEGMENTS {
            return Err(Error::CapsExceeded {
                what: "segments",
                limit: limits::MAX_SEGMENTS,
            });
        }
        let id = self.segments.len() as SegmentId;
        let key = (seg.unified_start, id);
        self.segments.push(seg);
        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        self.sources.insert(key);
        self.sinks.insert(key);
        self.bump();
        Ok(id)
    }
    pub fn segment(&self, id: SegmentId) -> Option<&SequenceSegment> {
        self.segments.get(id as usize)
    }
    pub fn contains(&self, id: SegmentId) -> bool {
        (id as usize) < self.segments.len()
    }
    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    /// Sets the mutation classification supplied by the reference diff.
    pub fn set_mutation(&mut self, id: SegmentId, mutation: Option<Mutation>) -> Result<()> {
        let seg = self
            .segments
            .get_mut(id as usize)
            .ok_or(Error::segment(id))?;
        seg.mutation = mutation;
        self.bump();
        Ok(())
    }

    /// Collapses the content of every segment traversed by all sequences.
    pub fn collapse_shared(&mut self) -> usize {
        let total = self.sequences.len();
        if total == 0 {
            return 0;
        }
        let mut collapsed = 0;
        for seg in self.segments.iter_mut() {
            if seg.sources.len() == total && !seg.content.is_collapsed() {
                seg.content = seg.content.collapse();
                collapsed += 1;
            }
        }
        if collapsed > 0 {
            self.bump();
        }
        collapsed
    }

    // Edges
    /// Adds `source -> destination`.
    ///
    /// Precondition: the edge must not close a cycle. Parsers insert edges in
    /// topological order and this is not re-checked here; see [`Graph::is_acyclic`].
    /// Adding an edge that already exists returns the existing id unchanged.
    pub fn add_edge(&mut self, source: SegmentId, destination: SegmentId) -> Result<EdgeId> {
        if !self.contains(source) {
            return Err(Error::segment(source));
        }
        if !self.contains(destination) {
            return Err(Error::segment(destination));
        }
        if source == destination {
            return Err(Error::SelfLoop(source));
        }
        if let Some(existing) = self.outgoing[source as usize]
            .iter()
            .copied()
            .find(|eid| self.edge(*eid).map(|e| e.destination) == Some(destination))
        {
            return Ok(existing);
        }
        if self.edges.len() >= limits::MAX_EDGES {
            return Err(Error::CapsExceeded {
                what: "edges",
                limit: limits::MAX_EDGES,
            });
        }
        Ok(self.insert_edge(source, destination))
    }

    fn insert_edge(&mut self, source: SegmentId, destination: SegmentId) -> EdgeId {
        let id = self.edges.len() as EdgeId;
        self.edges.push(Some(Edge {
            source,
            destination,
        }));
        self.outgoing[source as usize].push(id);
        self.incoming[destination as usize].push(id);
        let src_key = self.key_of(source);
        let dst_key = self.key_of(destination);
        self.sources.remove(&dst_key);
        self.sinks.remove(&src_key);
        self.bump();
        id
    }

    fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.get_mut(id as usize)?.take()?;
        self.outgoing[edge.source as usize].retain(|e| *e != id);
        self.incoming[edge.destination as usize].retain(|e| *e != id);
        if self.outgoing[edge.source as usize].is_empty() {
            let key = self.key_of(edge.source);
            self.sinks.insert(key);
        }
        if self.incoming[edge.destination as usize].is_empty() {
            let key = self.key_of(edge.destination);
            self.sources.insert(key);
        }
        self.bump();
        Some(edge)
    }

    /// Replaces `edge` with `source -> seg -> destination`.
    ///
    /// Returns the new segment id and the two new edge ids. Nothing changes
    /// when the edge is unknown or the segment is malformed.
    pub fn split_edge(
        &mut self,
        edge: EdgeId,
        seg: SequenceSegment,
    ) -> Result<(SegmentId, [EdgeId; 2])> {
        let old = self.edge(edge).ok_or(Error::edge(edge))?;
        self.validate_segment(&seg)?;
        if self.segments.len() >= limits::MAX_SEGMENTS {
            return Err(Error::CapsExceeded {
                what: "segments",
                limit: limits::MAX_SEGMENTS,
            });
        }
        self.remove_edge(edge);
        let mid = self.add_vertex(seg)?;
        let first = self.insert_edge(old.source, mid);
        let second = self.insert_edge(mid, old.destination);
        Ok((mid, [first, second]))
    }

    pub fn edge(&self, id: EdgeId) -> Option<Edge> {
        self.edges.get(id as usize).and_then(|e| *e)
    }
    pub fn edge_count(&self) -> u32 {
        self.edges.iter().filter(|e| e.is_some()).count() as u32
    }
    pub fn get_source(&self, edge: EdgeId) -> Result<SegmentId> {
        self.edge(edge).map(|e| e.source).ok_or(Error::edge(edge))
    }
    pub fn get_destination(&self, edge: EdgeId) -> Result<SegmentId> {
        self.edge(edge).map(|e| e.destination).ok_or(Error::edge(edge))
    }

    // Snapshots
    pub fn all_vertices(&self) -> Vec<SegmentId> {
        let mut keys: Vec<OrderKey> = (0..self.segments.len() as SegmentId)
            .map(|id| self.key_of(id))
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, id)| id).collect()
    }
    pub fn all_edges(&self) -> Vec<EdgeId> {
        let ids = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(i, _)| i as EdgeId)
            .collect();
        self.sorted_edges(ids)
    }
    pub fn incoming(&self, id: SegmentId) -> Result<Vec<EdgeId>> {
        let list = self.incoming.get(id as usize).ok_or(Error::segment(id))?;
        Ok(self.sorted_edges(list.clone()))
    }
    pub fn outgoing(&self, id: SegmentId) -> Result<Vec<EdgeId>> {
        let list = self.outgoing.get(id as usize).ok_or(Error::segment(id))?;
        Ok(self.sorted_edges(list.clone()))
    }
    pub fn sources(&self) -> Vec<SegmentId> {
        self.sources.iter().map(|(_, id)| *id).collect()
    }
    pub fn sinks(&self) -> Vec<SegmentId> {
        self.sinks.iter().map(|(_, id)| *id).collect()
    }

    /// Highest unified end over the sinks; the horizontal extent of the graph.
    pub fn max_unified_end(&self) -> u64 {
        self.sinks
            .iter()
            .map(|(_, id)| self.segments[*id as usize].unified_end)
            .max()
            .unwrap_or(0)
    }

    /// Kahn's algorithm over the live edges.
    pub fn is_acyclic(&self) -> bool {
        let mut indeg: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = indeg
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut seen = 0usize;
        while let Some(v) = queue.pop_front() {
            seen += 1;
            for eid in &self.outgoing[v] {
                if let Some(e) = self.edge(*eid) {
                    let d = &mut indeg[e.destination as usize];
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(e.destination as usize);
                    }
                }
            }
        }
        seen == self.segments.len()
    }

    /// True when `to` is reachable from `from` over live edges.
    pub fn reaches(&self, from: SegmentId, to: SegmentId) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        let mut seen = vec![false; self.segments.len()];
        let mut stack = vec![from];
        while let Some(v) = stack.pop() {
            if v == to {
                return true;
            }
            if std::mem::replace(&mut seen[v as usize], true) {
                continue;
            }
            for eid in &self.outgoing[v as usize] {
                if let Some(e) = self.edge(*eid) {
                    stack.push(e.destination);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SegmentContent;

    fn seg(g: &mut Graph, lo: u64, hi: u64, seqs: &[&str]) -> SequenceSegment {
        let sources = seqs.iter().map(|s| g.intern_sequence(s).unwrap()).collect();
        SequenceSegment {
            start: lo,
            end: hi,
            unified_start: lo,
            unified_end: hi,
            content: SegmentContent::Sequence("A".repeat((hi - lo) as usize)),
            sources,
            mutation: None,
        }
    }

    #[test]
    fn new_vertex_is_source_and_sink() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        let v = g.add_vertex(s).unwrap();
        assert_eq!(g.sources(), vec![v]);
        assert_eq!(g.sinks(), vec![v]);
    }

    #[test]
    fn add_edge_updates_sources_and_sinks() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        let a = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 4, 8, &["a"]);
        let b = g.add_vertex(s).unwrap();
        g.add_edge(a, b).unwrap();
        assert_eq!(g.sources(), vec![a]);
        assert_eq!(g.sinks(), vec![b]);
    }

    #[test]
    fn self_loop_and_missing_endpoint_leave_graph_unchanged() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        let a = g.add_vertex(s).unwrap();
        let ver = g.struct_version();
        assert!(matches!(g.add_edge(a, a), Err(Error::SelfLoop(_))));
        assert!(matches!(
            g.add_edge(a, 99),
            Err(Error::InvalidReference { kind: "segment", id: 99 })
        ));
        assert_eq!(g.struct_version(), ver);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn duplicate_edge_returns_existing_id() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        let a = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 4, 8, &["a"]);
        let b = g.add_vertex(s).unwrap();
        let e1 = g.add_edge(a, b).unwrap();
        let e2 = g.add_edge(a, b).unwrap();
        assert_eq!(e1, e2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn malformed_segments_are_rejected() {
        let mut g = Graph::new();
        let mut s = seg(&mut g, 5, 6, &["a"]);
        s.unified_end = 5;
        assert!(matches!(g.add_vertex(s), Err(Error::MalformedInterval { .. })));
        let mut s = seg(&mut g, 5, 6, &["a"]);
        s.sources.clear();
        assert!(matches!(g.add_vertex(s), Err(Error::MalformedInterval { height: 0, .. })));
        assert_eq!(g.segment_count(), 0);
    }

    #[test]
    fn split_edge_grafts_vertex() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        let a = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 8, 12, &["a"]);
        let b = g.add_vertex(s).unwrap();
        let e = g.add_edge(a, b).unwrap();
        let mid = seg(&mut g, 4, 8, &["a"]);
        let (m, [e1, e2]) = g.split_edge(e, mid).unwrap();
        assert!(g.edge(e).is_none());
        assert_eq!(g.edge(e1), Some(Edge { source: a, destination: m }));
        assert_eq!(g.edge(e2), Some(Edge { source: m, destination: b }));
        assert_eq!(g.sources(), vec![a]);
        assert_eq!(g.sinks(), vec![b]);
        assert!(g.reaches(a, b));
    }

    #[test]
    fn content_must_match_the_sequence_span() {
        let mut g = Graph::new();
        let mut s = seg(&mut g, 0, 4, &["a"]);
        s.content = SegmentContent::Sequence("ACGTAC".into());
        assert!(matches!(
            g.add_vertex(s),
            Err(Error::ContentLength { len: 6, span: 4 })
        ));
        let mut s = seg(&mut g, 0, 4, &["a"]);
        s.content = SegmentContent::Sequence(String::new());
        assert!(g.add_vertex(s).is_ok());
        // Unified span may differ from the sequence span.
        let mut s = seg(&mut g, 4, 6, &["a"]);
        s.unified_end = 9;
        assert!(g.add_vertex(s).is_ok());
    }

    #[test]
    fn split_edge_with_malformed_segment_keeps_edge() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        let a = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 8, 12, &["a"]);
        let b = g.add_vertex(s).unwrap();
        let e = g.add_edge(a, b).unwrap();
        let ver = g.struct_version();
        let mut bad = seg(&mut g, 4, 8, &["a"]);
        bad.unified_end = bad.unified_start;
        assert!(matches!(g.split_edge(e, bad), Err(Error::MalformedInterval { .. })));
        let mut bad = seg(&mut g, 4, 8, &["a"]);
        bad.content = SegmentContent::Sequence("A".into());
        assert_eq!(g.split_edge(e, bad).unwrap_err().code(), "content_length");
        assert_eq!(g.edge(e), Some(Edge { source: a, destination: b }));
        assert_eq!(g.segment_count(), 2);
        assert_eq!(g.struct_version(), ver);
        assert_eq!(g.sources(), vec![a]);
        assert_eq!(g.sinks(), vec![b]);
    }

    #[test]
    fn split_edge_on_missing_edge_is_noop() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        g.add_vertex(s).unwrap();
        let ver = g.struct_version();
        let s = seg(&mut g, 4, 8, &["a"]);
        assert!(matches!(
            g.split_edge(7, s),
            Err(Error::InvalidReference { kind: "edge", id: 7 })
        ));
        assert_eq!(g.segment_count(), 1);
        assert_eq!(g.struct_version(), ver);
    }

    #[test]
    fn incident_edges_order_by_destination_then_source() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 2, &["a"]);
        let a = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 10, 12, &["a"]);
        let far = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 2, 4, &["a"]);
        let near = g.add_vertex(s).unwrap();
        let e_far = g.add_edge(a, far).unwrap();
        let e_near = g.add_edge(a, near).unwrap();
        assert_eq!(g.outgoing(a).unwrap(), vec![e_near, e_far]);
        assert_eq!(g.all_vertices(), vec![a, near, far]);
    }

    #[test]
    fn collapse_shared_only_touches_full_segments() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a", "b"]);
        let shared = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 4, 8, &["a"]);
        let own = g.add_vertex(s).unwrap();
        assert_eq!(g.collapse_shared(), 1);
        assert!(g.segment(shared).unwrap().content.is_collapsed());
        assert!(!g.segment(own).unwrap().content.is_collapsed());
        assert_eq!(g.segment(shared).unwrap().content.len(), 4);
    }

    #[test]
    fn cycle_detection_is_available_but_not_enforced() {
        let mut g = Graph::new();
        let s = seg(&mut g, 0, 4, &["a"]);
        let a = g.add_vertex(s).unwrap();
        let s = seg(&mut g, 4, 8, &["a"]);
        let b = g.add_vertex(s).unwrap();
        g.add_edge(a, b).unwrap();
        assert!(g.is_acyclic());
        g.add_edge(b, a).unwrap();
        assert!(!g.is_acyclic());
    }
}
