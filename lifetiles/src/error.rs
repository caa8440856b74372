use thiserror::Error;

use crate::model::SegmentId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {kind} reference {id}")]
    InvalidReference { kind: &'static str, id: u32 },

    #[error("edge from segment {0} to itself")]
    SelfLoop(SegmentId),

    #[error("malformed interval [{start}, {end}) with height {height}")]
    MalformedInterval { start: u64, end: u64, height: u32 },

    #[error("content of length {len} does not fit a segment spanning {span}")]
    ContentLength { len: u64, span: u64 },

    #[error("rebuild generation {0} superseded")]
    RebuildSuperseded(u64),

    #[error("unknown sequence '{0}'")]
    UnknownSequence(String),

    #[error("{what} exceeds cap of {limit}")]
    CapsExceeded { what: &'static str, limit: usize },

    #[error("{0} out of bounds")]
    OutOfBounds(&'static str),

    #[error("no graph loaded")]
    NotLoaded,

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable code, used by the wasm error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidReference { .. } => "invalid_reference",
            Error::SelfLoop(_) => "self_loop",
            Error::MalformedInterval { .. } => "malformed_interval",
            Error::ContentLength { .. } => "content_length",
            Error::RebuildSuperseded(_) => "rebuild_superseded",
            Error::UnknownSequence(_) => "unknown_sequence",
            Error::CapsExceeded { .. } => "caps_exceeded",
            Error::OutOfBounds(_) => "out_of_bounds",
            Error::NotLoaded => "not_loaded",
            Error::Json(_) => "json_parse",
        }
    }

    pub(crate) fn segment(id: SegmentId) -> Self {
        Error::InvalidReference { kind: "segment", id }
    }

    pub(crate) fn edge(id: u32) -> Self {
        Error::InvalidReference { kind: "edge", id }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
