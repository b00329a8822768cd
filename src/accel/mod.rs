//! Acceleration structures over scene geometry (spec.md §4.5).

pub mod kdtree;

pub use kdtree::{KdPrimitive, KdTree, MAX_TREE_DEPTH};
