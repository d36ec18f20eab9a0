//! `karma-geometry` – Frame Algebra.
//!
//! Homogeneous-transform primitives shared by the planner, the executor and
//! the exploration routine.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3],
//!   [`AxisAngle`][transform::AxisAngle] and the 4×4 rigid
//!   [`Transform`][transform::Transform] with composition, rigid inversion
//!   and axis-angle conversion.
//! - [`pose`] – [`Pose`][pose::Pose]: position plus axis-angle orientation,
//!   the form in which targets are handed to a Cartesian controller.

pub mod pose;
pub mod transform;

pub use pose::Pose;
pub use transform::{AxisAngle, Transform, Vec3, deg_to_rad};
