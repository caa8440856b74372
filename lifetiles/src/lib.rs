pub mod model;
pub mod config;
pub mod error;
pub mod graph;
pub mod limits;
pub mod viewport;
pub mod session;
pub mod algorithms {
    pub mod buckets;
    pub mod lanes;
    pub mod mapping;
    pub mod rebuild;
    pub mod stacked;
}
mod json;

pub use config::ViewConfig;
pub use error::{Error, Result};
pub use graph::{Graph, OrderKey};
pub use json::{EdgeRecord, GraphRecords, VertexRecord};
pub use model::{
    Color, Edge, EdgeId, GeneAnnotation, KnownMutation, Mutation, SegmentContent, SegmentId,
    SequenceId, SequenceSegment,
};
pub use session::{Event, Frame, Session, StackedFrame, TileFrame};
