use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::algorithms::mapping::{self, Bookmark, PositionIndex};
use crate::algorithms::rebuild::{IndexSnapshot, RebuildRequest, Rebuilder};
use crate::config::ViewConfig;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::json::VertexRecord;
use crate::model::{EdgeId, GeneAnnotation, KnownMutation, Mutation, SegmentId, SequenceId};
use crate::viewport::{FrameKey, StackedTile, Tile, Viewport};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Loaded {
        segments: u32,
        edges: u32,
        sequences: usize,
    },
    /// A segment was clicked; the view is now filtered to its sources.
    Filtered {
        segment: SegmentId,
        sources: Vec<String>,
    },
    /// `sources` is empty when nothing is hovered.
    Hovered {
        segment: Option<SegmentId>,
        sources: Vec<String>,
    },
    MutationsMapped { mapped: usize, unmapped: usize },
    AnnotationsMapped { mapped: usize, unmapped: usize },
    IndexPublished { generation: u64, buckets: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TileFrame {
    pub start_bucket: usize,
    pub end_bucket: usize,
    pub lane_count: u32,
    pub tiles: Vec<Tile>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StackedFrame {
    pub start_bucket: usize,
    pub end_bucket: usize,
    pub depth: u32,
    pub lane_count: u32,
    pub tiles: Vec<StackedTile>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Nothing moved since the last frame.
    Unchanged,
    Tiles(TileFrame),
    Stacked(StackedFrame),
}

/// One viewer: the loaded graph, its published index and the view state.
pub struct Session {
    graph: Option<Arc<Graph>>,
    visible: Option<BTreeSet<SequenceId>>,
    reference: Option<SequenceId>,
    viewport: Viewport,
    rebuilder: Rebuilder,
    snapshot: Option<Arc<IndexSnapshot>>,
    known: Vec<KnownMutation>,
    genes: Vec<GeneAnnotation>,
    bookmarks: HashMap<SegmentId, Vec<Bookmark>>,
    annotations: HashMap<SegmentId, Vec<String>>,
    hovered: Option<SegmentId>,
    events: Vec<Event>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ViewConfig::default())
    }
}

impl Session {
    pub fn new(config: ViewConfig) -> Self {
        Session {
            graph: None,
            visible: None,
            reference: None,
            viewport: Viewport::new(config),
            rebuilder: Rebuilder::new(),
            snapshot: None,
            known: Vec::new(),
            genes: Vec::new(),
            bookmarks: HashMap::new(),
            annotations: HashMap::new(),
            hovered: None,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        self.viewport.config()
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_deref()
    }

    fn loaded(&self) -> Result<&Arc<Graph>> {
        self.graph.as_ref().ok_or(Error::NotLoaded)
    }

    pub fn snapshot(&self) -> Option<&Arc<IndexSnapshot>> {
        self.snapshot.as_ref()
    }

    /// Replaces the graph. Filter, reference and mapped records are reset.
    /// The current snapshot keeps serving until the new index is published.
    pub fn load(&mut self, graph: Graph) {
        self.events.push(Event::Loaded {
            segments: graph.segment_count(),
            edges: graph.edge_count(),
            sequences: graph.sequence_count(),
        });
        self.graph = Some(Arc::new(graph));
        self.visible = None;
        self.reference = None;
        self.known.clear();
        self.genes.clear();
        self.bookmarks.clear();
        self.annotations.clear();
        self.hovered = None;
        self.request_rebuild();
    }

    pub fn load_json(&mut self, v: serde_json::Value) -> Result<()> {
        let g = Graph::from_json_value(v)?;
        self.load(g);
        Ok(())
    }

    fn source_names(g: &Graph, segment: SegmentId) -> Option<Vec<String>> {
        let seg = g.segment(segment)?;
        Some(
            seg.sources
                .iter()
                .filter_map(|id| g.sequence_name(*id).map(str::to_string))
                .collect(),
        )
    }

    fn resolve(&self, g: &Graph, names: &[String]) -> Result<BTreeSet<SequenceId>> {
        names
            .iter()
            .map(|n| {
                g.sequence_id(n)
                    .ok_or_else(|| Error::UnknownSequence(n.clone()))
            })
            .collect()
    }

    /// Restricts the view to the named sequences; `None` shows all.
    pub fn set_visible(&mut self, names: Option<&[String]>) -> Result<()> {
        let g = self.loaded()?;
        let visible = names.map(|n| self.resolve(g, n)).transpose()?;
        if visible != self.visible {
            self.visible = visible;
            self.request_rebuild();
        }
        Ok(())
    }

    pub fn visible(&self) -> Option<Vec<String>> {
        let g = self.graph.as_ref()?;
        let v = self.visible.as_ref()?;
        Some(
            v.iter()
                .filter_map(|id| g.sequence_name(*id).map(str::to_string))
                .collect(),
        )
    }

    /// Sets the sequence whose coordinates known mutations and annotations
    /// are given in. Already mapped records are mapped again.
    pub fn set_reference(&mut self, name: Option<&str>) -> Result<()> {
        let g = self.loaded()?;
        let reference = name
            .map(|n| {
                g.sequence_id(n)
                    .ok_or_else(|| Error::UnknownSequence(n.to_string()))
            })
            .transpose()?;
        if reference != self.reference {
            self.reference = reference;
            self.remap()?;
        }
        Ok(())
    }

    pub fn reference(&self) -> Option<&str> {
        let g = self.graph.as_ref()?;
        g.sequence_name(self.reference?)
    }

    fn remap(&mut self) -> Result<()> {
        let known = std::mem::take(&mut self.known);
        let genes = std::mem::take(&mut self.genes);
        if !known.is_empty() {
            self.map_known_mutations(known)?;
        }
        if !genes.is_empty() {
            self.map_annotations(genes)?;
        }
        Ok(())
    }

    /// Pins known mutations to segments as tile bookmarks. Returns the
    /// number of records that matched no segment.
    pub fn map_known_mutations(&mut self, records: Vec<KnownMutation>) -> Result<usize> {
        let g = self.loaded()?;
        let index = PositionIndex::new(g, self.reference)?;
        let m = mapping::map_known_mutations(&index, &records)?;
        self.bookmarks.clear();
        for b in m.mapped.iter() {
            self.bookmarks.entry(b.segment).or_default().push(b.clone());
        }
        self.events.push(Event::MutationsMapped {
            mapped: m.mapped.len(),
            unmapped: m.unmapped,
        });
        self.known = records;
        self.viewport.request_repaint();
        Ok(m.unmapped)
    }

    pub fn map_annotations(&mut self, records: Vec<GeneAnnotation>) -> Result<usize> {
        let g = self.loaded()?;
        let index = PositionIndex::new(g, self.reference)?;
        let m = mapping::map_annotations(&index, &records)?;
        self.annotations.clear();
        for a in m.mapped.iter() {
            for s in &a.segments {
                self.annotations
                    .entry(*s)
                    .or_default()
                    .push(a.annotation.name.clone());
            }
        }
        self.events.push(Event::AnnotationsMapped {
            mapped: m.mapped.len(),
            unmapped: m.unmapped,
        });
        self.genes = records;
        self.viewport.request_repaint();
        Ok(m.unmapped)
    }

    pub fn bookmarks(&self, segment: SegmentId) -> &[Bookmark] {
        self.bookmarks.get(&segment).map_or(&[], Vec::as_slice)
    }

    pub fn set_mutation(&mut self, segment: SegmentId, mutation: Option<Mutation>) -> Result<()> {
        let g = self.graph.as_mut().ok_or(Error::NotLoaded)?;
        Arc::make_mut(g).set_mutation(segment, mutation)?;
        self.request_rebuild();
        Ok(())
    }

    /// Inserts a vertex in the middle of `edge`. The record's sources must
    /// name sequences already in the graph.
    pub fn graft_segment(&mut self, edge: EdgeId, record: &VertexRecord) -> Result<SegmentId> {
        let g = self.graph.as_mut().ok_or(Error::NotLoaded)?;
        let seg = g.segment_from_record(record)?;
        let (id, _) = Arc::make_mut(g).split_edge(edge, seg)?;
        self.request_rebuild();
        Ok(id)
    }

    // Zoom
    pub fn zoom_level(&self) -> u32 {
        self.viewport.level()
    }
    pub fn set_zoom_level(&mut self, level: u32) -> u32 {
        self.viewport.set_level(level)
    }
    pub fn zoom_in(&mut self) -> u32 {
        self.viewport.zoom_in()
    }
    pub fn zoom_out(&mut self) -> u32 {
        self.viewport.zoom_out()
    }
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn max_unified_end(&self) -> u64 {
        self.graph.as_ref().map_or(0, |g| g.max_unified_end())
    }

    pub fn goto(&self, position: u64) -> f64 {
        self.viewport.goto(position, self.max_unified_end())
    }

    // Rebuilds
    fn request_rebuild(&mut self) {
        let Some(graph) = self.graph.clone() else {
            return;
        };
        let cfg = self.viewport.config();
        let req = RebuildRequest {
            graph,
            visible: self.visible.clone(),
            bucket_width: cfg.bucket_width,
            target_per_bucket: cfg.target_segments_per_bucket,
            max_stack_depth: cfg.max_stack_depth,
        };
        self.rebuilder.request(req);
    }

    fn publish(&mut self, res: Option<Result<Arc<IndexSnapshot>>>) -> Result<bool> {
        match res {
            Some(Ok(snap)) => {
                self.events.push(Event::IndexPublished {
                    generation: snap.generation,
                    buckets: snap.buckets.number_buckets(),
                });
                self.snapshot = Some(snap);
                self.viewport.request_repaint();
                Ok(true)
            }
            Some(Err(e)) => Err(e),
            None => Ok(false),
        }
    }

    /// Publishes a finished rebuild, if the latest one is done.
    pub fn poll_rebuild(&mut self) -> Result<bool> {
        let res = self.rebuilder.poll();
        self.publish(res)
    }

    /// Blocks until outstanding rebuilds finish.
    pub fn wait_rebuild(&mut self) -> Result<bool> {
        let res = self.rebuilder.wait();
        self.publish(res)
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuilder.pending() > 0
    }

    // Frames
    pub fn visible_segments(&self, start: usize, end: usize) -> Vec<SegmentId> {
        self.snapshot
            .as_ref()
            .map_or_else(Vec::new, |s| s.buckets.visible_segments(start, end))
    }

    /// Tiles for scroll value `h` with visible fraction `t`.
    pub fn frame(&mut self, h: f64, t: f64) -> Result<Frame> {
        self.poll_rebuild()?;
        let Some(snap) = self.snapshot.clone() else {
            return Ok(Frame::Unchanged);
        };
        let (start, end) = self.viewport.bucket_range(&snap.buckets, h, t, snap.extent)?;
        let depth = self.viewport.stack_depth();
        let key: FrameKey = (depth, start, end);
        if !self.viewport.gate(key) {
            return Ok(Frame::Unchanged);
        }
        log::trace!("layout for buckets [{}, {}] depth {:?}", start, end, depth);
        match depth {
            Some(depth) => Ok(self.stacked_frame(&snap, depth, start, end)),
            None => Ok(self.tile_frame(&snap, start, end)),
        }
    }

    fn tile_frame(&self, snap: &IndexSnapshot, start: usize, end: usize) -> Frame {
        let layout = snap.layout(start, end);
        let tiles = layout
            .slots
            .iter()
            .filter_map(|slot| {
                let seg = snap.graph.segment(slot.id)?;
                Some(self.viewport.tile(
                    seg,
                    slot,
                    self.bookmarks(slot.id).to_vec(),
                    self.annotations.get(&slot.id).cloned().unwrap_or_default(),
                ))
            })
            .collect();
        Frame::Tiles(TileFrame {
            start_bucket: start,
            end_bucket: end,
            lane_count: layout.lane_count,
            tiles,
        })
    }

    fn stacked_frame(&self, snap: &IndexSnapshot, depth: u32, start: usize, end: usize) -> Frame {
        let Some(level) = snap.stacked(depth) else {
            return Frame::Unchanged;
        };
        let tiles = level
            .groups_in(start, end)
            .filter_map(|gr| {
                let color = snap.graph.segment(gr.representative)?.color();
                Some(self.viewport.stacked_tile(gr, color))
            })
            .collect();
        Frame::Stacked(StackedFrame {
            start_bucket: start,
            end_bucket: end,
            depth: level.depth,
            lane_count: level.lane_count,
            tiles,
        })
    }

    // Interaction
    /// Filters the view to the clicked segment's sources.
    pub fn click(&mut self, segment: SegmentId) -> Result<Vec<String>> {
        let g = self.loaded()?;
        let sources = Self::source_names(g, segment).ok_or(Error::segment(segment))?;
        self.set_visible(Some(&sources))?;
        self.events.push(Event::Filtered {
            segment,
            sources: sources.clone(),
        });
        Ok(sources)
    }

    pub fn hover(&mut self, segment: Option<SegmentId>) {
        if segment == self.hovered {
            return;
        }
        self.hovered = segment;
        let sources = match (self.graph.as_deref(), segment) {
            (Some(g), Some(id)) => Self::source_names(g, id).unwrap_or_default(),
            _ => Vec::new(),
        };
        self.events.push(Event::Hovered { segment, sources });
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
