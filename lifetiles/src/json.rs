use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::limits;
use crate::model::{Mutation, SegmentContent, SegmentId, SequenceSegment};

/// A vertex as handed over by the graph-file parser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: u32,
    pub start: u64,
    pub end: u64,
    pub unified_start: u64,
    pub unified_end: u64,
    #[serde(default)]
    pub content: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub mutation: Option<Mutation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: u32,
    pub destination: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecords {
    /// Declared sequence names. When empty, names are taken from the vertex
    /// records in first-seen order.
    #[serde(default)]
    pub sequences: Vec<String>,
    pub vertices: Vec<VertexRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl Graph {
    /// Resolves a record against the graph's existing sequences.
    pub fn segment_from_record(&self, r: &VertexRecord) -> Result<SequenceSegment> {
        let mut sources = BTreeSet::new();
        for name in &r.sources {
            let id = self
                .sequence_id(name)
                .ok_or_else(|| Error::UnknownSequence(name.clone()))?;
            sources.insert(id);
        }
        Ok(SequenceSegment {
            start: r.start,
            end: r.end,
            unified_start: r.unified_start,
            unified_end: r.unified_end,
            content: SegmentContent::Sequence(r.content.clone()),
            sources,
            mutation: r.mutation,
        })
    }

    /// Builds a graph from parsed records. Either every record is accepted or
    /// an error is returned and nothing is built.
    pub fn from_records(records: GraphRecords) -> Result<Graph> {
        from_records_impl(records)
    }

    pub fn from_json_value(v: Value) -> Result<Graph> {
        let records: GraphRecords = serde_json::from_value(v)?;
        from_records_impl(records)
    }
}

fn from_records_impl(records: GraphRecords) -> Result<Graph> {
    if records.vertices.len() > limits::MAX_SEGMENTS {
        return Err(Error::CapsExceeded {
            what: "segments",
            limit: limits::MAX_SEGMENTS,
        });
    }
    if records.edges.len() > limits::MAX_EDGES {
        return Err(Error::CapsExceeded {
            what: "edges",
            limit: limits::MAX_EDGES,
        });
    }
    for v in &records.vertices {
        if !limits::in_coord_bounds(v.unified_end) || !limits::in_coord_bounds(v.end) {
            return Err(Error::OutOfBounds("vertex coordinate"));
        }
    }

    let mut g = Graph::new();
    let declared = !records.sequences.is_empty();
    for name in &records.sequences {
        g.intern_sequence(name)?;
    }
    if !declared {
        for v in &records.vertices {
            for name in &v.sources {
                g.intern_sequence(name)?;
            }
        }
    }

    let mut ids: HashMap<u32, SegmentId> = HashMap::with_capacity(records.vertices.len());
    for v in &records.vertices {
        if ids.contains_key(&v.id) {
            return Err(Error::InvalidReference {
                kind: "duplicate vertex record",
                id: v.id,
            });
        }
        let seg = g.segment_from_record(v)?;
        let sid = g.add_vertex(seg)?;
        ids.insert(v.id, sid);
    }
    for e in &records.edges {
        let a = *ids.get(&e.source).ok_or(Error::InvalidReference {
            kind: "vertex record",
            id: e.source,
        })?;
        let b = *ids.get(&e.destination).ok_or(Error::InvalidReference {
            kind: "vertex record",
            id: e.destination,
        })?;
        g.add_edge(a, b)?;
    }
    let collapsed = g.collapse_shared();
    log::info!(
        "loaded graph: {} segments, {} edges, {} sequences ({} collapsed)",
        g.segment_count(),
        g.edge_count(),
        g.sequence_count(),
        collapsed
    );
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_load_and_collapse() {
        let v = json!({
            "sequences": ["a", "b"],
            "vertices": [
                {"id": 10, "start": 0, "end": 3, "unified_start": 0, "unified_end": 3, "content": "ACG", "sources": ["a", "b"]},
                {"id": 11, "start": 3, "end": 4, "unified_start": 3, "unified_end": 4, "content": "T", "sources": ["a"], "mutation": "polymorphism"},
                {"id": 12, "start": 3, "end": 4, "unified_start": 3, "unified_end": 4, "content": "C", "sources": ["b"]}
            ],
            "edges": [{"source": 10, "destination": 11}, {"source": 10, "destination": 12}]
        });
        let g = Graph::from_json_value(v).unwrap();
        assert_eq!(g.segment_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.sources(), vec![0]);
        assert_eq!(g.sinks(), vec![1, 2]);
        assert!(g.segment(0).unwrap().content.is_collapsed());
        assert_eq!(g.segment(1).unwrap().mutation, Some(Mutation::Polymorphism));
        assert_eq!(g.max_unified_end(), 4);
    }

    #[test]
    fn content_longer_than_its_segment_fails_the_load() {
        let v = json!({
            "vertices": [
                {"id": 0, "start": 0, "end": 2, "unified_start": 0, "unified_end": 2, "content": "ACGT", "sources": ["a"]}
            ],
            "edges": []
        });
        let err = Graph::from_json_value(v).unwrap_err();
        assert_eq!(err.code(), "content_length");
    }

    #[test]
    fn undeclared_sequence_is_rejected_when_list_given() {
        let v = json!({
            "sequences": ["a"],
            "vertices": [
                {"id": 0, "start": 0, "end": 1, "unified_start": 0, "unified_end": 1, "sources": ["zz"]}
            ],
            "edges": []
        });
        let err = Graph::from_json_value(v).unwrap_err();
        assert_eq!(err.code(), "unknown_sequence");
    }

    #[test]
    fn edge_to_missing_record_fails() {
        let v = json!({
            "vertices": [
                {"id": 0, "start": 0, "end": 1, "unified_start": 0, "unified_end": 1, "sources": ["a"]}
            ],
            "edges": [{"source": 0, "destination": 42}]
        });
        let err = Graph::from_json_value(v).unwrap_err();
        assert!(matches!(err, Error::InvalidReference { id: 42, .. }));
    }

    #[test]
    fn bad_json_maps_to_parse_error() {
        let err = Graph::from_json_value(json!({"vertices": 3})).unwrap_err();
        assert_eq!(err.code(), "json_parse");
    }
}
