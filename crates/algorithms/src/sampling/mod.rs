//! Control point sampling
//!
//! - **negative**: stratified, seeded draw of control points away from dams
//! - **candidates**: waterway densification and point deduplication
//! - **kdtree**: spatial index over projected coordinates

mod candidates;
pub mod kdtree;
mod negative;

pub use candidates::{candidates_along, deduplicate};
pub use kdtree::{KdTree, Neighbor};
pub use negative::{
    sample_negatives, Cell, ClusterShortfall, SampledNegative, SamplingConfig, SamplingOutcome,
};

/// Points closer than this are treated as the same site.
pub const DEDUP_RADIUS_M: f64 = 10.0;
