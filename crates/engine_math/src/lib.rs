//! # engine_math
//!
//! Math types for the ECS frame scheduler. Re-exports [`glam`] for linear
//! algebra and defines [`Pose`], the spatial state carried by every entity's
//! transform component.

pub mod pose;

// Re-export glam types for convenience.
pub use glam::{EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

pub use pose::Pose;
