// Centralized ingestion limits to harden against untrusted parser output

// Graph size caps
pub const MAX_SEGMENTS: usize = 2_000_000;
pub const MAX_EDGES: usize = 4_000_000;
pub const MAX_SEQUENCES: usize = 65_536;

// Mapped records per call
pub const MAX_ANNOTATIONS: usize = 1_000_000;

// Index sizing
pub const MAX_BUCKETS: usize = 1 << 20;

// Numeric bounds
pub const COORD_MAX: u64 = 1 << 48;

#[inline]
pub fn in_coord_bounds(x: u64) -> bool {
    x <= COORD_MAX
}
