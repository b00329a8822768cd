//! The closed error taxonomy from spec.md §7.
//!
//! The teacher represents failures ad hoc (`Result<T, String>` in
//! `BVHNode::new`, `config::ConfigError` elsewhere); this crate pins that
//! down to one enum so every fallible entry point threads the same `Status`
//! back to its caller, as spec.md §7 requires. See SPEC_FULL.md §B.

/// A single closed taxonomy of failures. `NoIntersection` from spec.md §7 is
/// deliberately absent here: it is not a user-visible error, and is modeled
/// as `Option::None` throughout (matching the teacher's `Hittable::hit`).
#[derive(thiserror::Error, Debug)]
pub enum Status {
    #[error("invalid argument at slot {0}")]
    InvalidArgument(&'static str),

    #[error("invalid argument combination at slot {0}")]
    InvalidArgumentCombination(&'static str),

    #[error("allocation failed")]
    AllocationFailed,

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("join or callback failure: {0}")]
    InvalidResult(String),
}

pub type Result<T> = std::result::Result<T, Status>;
