//! Built-in transform component.
//!
//! Every [`Entity`](crate::Entity) is created with a [`Transform`], so every
//! entity is spatially addressable.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use engine_math::{Mat4, Pose, Quat, Vec3};

use crate::component::Component;
use crate::sync::{read, write};

/// Position, rotation, and scale of an entity.
#[derive(Debug, Default)]
pub struct Transform {
    pose: RwLock<Pose>,
    is_static: AtomicBool,
}

impl Transform {
    /// Create a transform with the given pose.
    #[must_use]
    pub fn from_pose(pose: Pose) -> Self {
        Self {
            pose: RwLock::new(pose),
            is_static: AtomicBool::new(false),
        }
    }

    /// A copy of the current pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        *read(&self.pose)
    }

    /// Replace the whole pose.
    pub fn set_pose(&self, pose: Pose) {
        *write(&self.pose) = pose;
    }

    /// Apply `f` to the pose under a single write lock.
    pub fn modify(&self, f: impl FnOnce(&mut Pose)) {
        f(&mut *write(&self.pose));
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        read(&self.pose).position
    }

    pub fn set_position(&self, position: Vec3) {
        write(&self.pose).position = position;
    }

    #[must_use]
    pub fn rotation(&self) -> Quat {
        read(&self.pose).rotation
    }

    pub fn set_rotation(&self, rotation: Quat) {
        write(&self.pose).rotation = rotation;
    }

    #[must_use]
    pub fn scale(&self) -> Vec3 {
        read(&self.pose).scale
    }

    pub fn set_scale(&self, scale: Vec3) {
        write(&self.pose).scale = scale;
    }

    /// Model matrix of the current pose.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        read(&self.pose).matrix()
    }

    #[must_use]
    pub fn right(&self) -> Vec3 {
        read(&self.pose).right()
    }

    #[must_use]
    pub fn up(&self) -> Vec3 {
        read(&self.pose).up()
    }

    #[must_use]
    pub fn forward(&self) -> Vec3 {
        read(&self.pose).forward()
    }

    /// Packed position, euler angles, and scale for instanced drawing.
    #[must_use]
    pub fn instance_data(&self) -> [f32; 9] {
        read(&self.pose).instance_data()
    }

    /// Whether the entity is flagged as never moving.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static.load(Ordering::Relaxed)
    }

    pub fn set_static(&self, is_static: bool) {
        self.is_static.store(is_static, Ordering::Relaxed);
    }
}

impl Component for Transform {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.pose(), Pose::IDENTITY);
        assert_eq!(t.matrix(), Mat4::IDENTITY);
        assert!(!t.is_static());
    }

    #[test]
    fn test_setters_update_pose() {
        let t = Transform::default();
        t.set_position(Vec3::new(1.0, 2.0, 3.0));
        t.set_scale(Vec3::splat(2.0));
        t.set_static(true);
        assert_eq!(t.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(t.scale(), Vec3::splat(2.0));
        assert!(t.is_static());
        assert_eq!(&t.instance_data()[0..3], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_modify_applies_in_place() {
        let t = Transform::from_pose(Pose::from_position(Vec3::X));
        t.modify(|pose| pose.position += Vec3::Y);
        assert_eq!(t.position(), Vec3::new(1.0, 1.0, 0.0));
    }
}
