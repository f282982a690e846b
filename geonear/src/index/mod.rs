pub mod spatial_index;

pub use spatial_index::{IndexEntry, SpatialIndex};
