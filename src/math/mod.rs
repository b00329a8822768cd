//! Numeric foundation: points/vectors/rays, affine matrices, bounding boxes
//! and the handful of safe-arithmetic helpers shared by every other module.
//!
//! Grounded on the teacher's `src/vec3/vec3_impl.rs`, `src/ray.rs` and
//! `objects/bounding_box/aabb.rs`; see DESIGN.md for what was kept vs added.

mod bounds;
mod matrix;
mod vector;

pub use bounds::{checked_mul, BoundingBox};
pub use matrix::Matrix4;
pub use vector::{sin_cos, Point3, Ray, RayDifferential, Vec3};
