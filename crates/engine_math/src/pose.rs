//! Spatial pose of an entity.
//!
//! [`Pose`] holds position, rotation, and scale in 3D space. Every entity
//! carries one through its transform component, which makes every entity
//! spatially addressable.

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, rotation, and per-axis scale of an entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Pose {
    /// The identity pose: origin, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a pose at the given position with default rotation/scale.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Create a pose with position and rotation.
    #[must_use]
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Compute the 4×4 model matrix: scale, then rotate, then translate.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Unit vector pointing along the pose's local X axis.
    #[must_use]
    pub fn right(&self) -> Vec3 {
        (self.rotation * Vec3::X).normalize()
    }

    /// Unit vector pointing along the pose's local Y axis.
    #[must_use]
    pub fn up(&self) -> Vec3 {
        (self.rotation * Vec3::Y).normalize()
    }

    /// Unit vector pointing along the pose's local Z axis.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (self.rotation * Vec3::Z).normalize()
    }

    /// Packed per-instance data: position, XYZ euler angles (radians), scale.
    #[must_use]
    pub fn instance_data(&self) -> [f32; 9] {
        let (ex, ey, ez) = self.rotation.to_euler(EulerRot::XYZ);
        let p = self.position;
        let s = self.scale;
        [p.x, p.y, p.z, ex, ey, ez, s.x, s.y, s.z]
    }

    /// Translate the pose by the given offset.
    #[must_use]
    pub fn translated(mut self, offset: Vec3) -> Self {
        self.position += offset;
        self
    }

    /// Rotate the pose by the given quaternion (applied after the current
    /// rotation).
    #[must_use]
    pub fn rotated(mut self, rotation: Quat) -> Self {
        self.rotation = (rotation * self.rotation).normalize();
        self
    }

    /// Apply a uniform scale factor.
    #[must_use]
    pub fn scaled(mut self, factor: f32) -> Self {
        self.scale *= factor;
        self
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}
