use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type SegmentId = u32;
pub type EdgeId = u32;
pub type SequenceId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }
}

/// Tile color for segments without a mutation classification.
pub const DEFAULT_SEGMENT_COLOR: Color = Color::rgb(0xa1, 0xd3, 0xff);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutation {
    Insertion,
    Deletion,
    Polymorphism,
}

impl Mutation {
    pub fn color(self) -> Color {
        match self {
            Mutation::Insertion => Color::rgb(0x8d, 0xd3, 0xc7),
            Mutation::Deletion => Color::rgb(0xfb, 0x80, 0x72),
            Mutation::Polymorphism => Color::rgb(0xfd, 0xb4, 0x62),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentContent {
    Sequence(String),
    /// Content shared by every input sequence; only the length is kept.
    Collapsed { length: u64 },
}

impl SegmentContent {
    pub fn len(&self) -> u64 {
        match self {
            SegmentContent::Sequence(s) => s.len() as u64,
            SegmentContent::Collapsed { length } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_collapsed(&self) -> bool {
        matches!(self, SegmentContent::Collapsed { .. })
    }

    pub fn collapse(&self) -> SegmentContent {
        SegmentContent::Collapsed { length: self.len() }
    }
}

impl fmt::Display for SegmentContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentContent::Sequence(s) => f.write_str(s),
            SegmentContent::Collapsed { length } => write!(f, "<{}>", length),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceSegment {
    pub start: u64,
    pub end: u64,
    pub unified_start: u64,
    pub unified_end: u64,
    pub content: SegmentContent,
    pub sources: BTreeSet<SequenceId>,
    pub mutation: Option<Mutation>,
}

impl SequenceSegment {
    /// Number of lanes the segment occupies when every source is visible.
    pub fn height(&self) -> u32 {
        self.sources.len() as u32
    }

    /// Number of lanes the segment occupies under a visibility filter.
    pub fn visible_height(&self, visible: Option<&BTreeSet<SequenceId>>) -> u32 {
        match visible {
            None => self.height(),
            Some(v) => self.sources.intersection(v).count() as u32,
        }
    }

    pub fn unified_len(&self) -> u64 {
        self.unified_end.saturating_sub(self.unified_start)
    }

    pub fn overlaps(&self, lo: u64, hi: u64) -> bool {
        self.unified_start < hi && lo < self.unified_end
    }

    pub fn color(&self) -> Color {
        self.mutation.map_or(DEFAULT_SEGMENT_COLOR, Mutation::color)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub source: SegmentId,
    pub destination: SegmentId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownMutation {
    pub genome_position: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: Option<Mutation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneAnnotation {
    pub name: String,
    pub start: u64,
    pub end: u64,
}
