//! Demo content: a handful of spinning entities, some of which expire.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use engine_core::{
    Component, ComponentContext, Entity, FrameTime, Module, Scene, System, SystemContext,
    Transform,
};
use engine_math::{Quat, Vec3};
use tracing::{debug, info};

/// Rotates the owning entity's transform about the Y axis.
#[derive(Debug)]
pub struct Spin {
    /// Radians per second.
    pub speed: f32,
}

#[async_trait]
impl Component for Spin {
    async fn update(&self, cx: &ComponentContext) -> anyhow::Result<()> {
        if let Some(transform) = cx.entity().get_component::<Transform>() {
            let step = Quat::from_rotation_y(self.speed * cx.delta_time());
            transform.modify(|pose| *pose = pose.rotated(step));
        }
        Ok(())
    }
}

/// Removes [`Spin`] and itself from the owning entity after a number of
/// frames.
#[derive(Debug)]
pub struct Lifetime {
    remaining: AtomicU32,
}

impl Lifetime {
    #[must_use]
    pub fn frames(frames: u32) -> Self {
        Self {
            remaining: AtomicU32::new(frames),
        }
    }
}

#[async_trait]
impl Component for Lifetime {
    async fn late_update(&self, cx: &ComponentContext) -> anyhow::Result<()> {
        let before = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if before == 1 {
            let entity = cx.entity();
            entity.remove_component::<Spin>();
            entity.remove_component::<Lifetime>();
        }
        Ok(())
    }

    async fn on_disable(&self, cx: &ComponentContext) -> anyhow::Result<()> {
        info!(entity = %cx.entity().name(), frame = cx.time().frame, "lifetime expired");
        Ok(())
    }
}

/// Logs how many entities are still spinning.
#[derive(Debug, Default)]
pub struct Census {
    last: AtomicU64,
}

#[async_trait]
impl System for Census {
    async fn late_update(&self, cx: &SystemContext) -> anyhow::Result<()> {
        let spinning = cx.scene().get_components::<Spin>().len() as u64;
        if self.last.swap(spinning, Ordering::Relaxed) != spinning {
            info!(frame = cx.time().frame, spinning, "census changed");
        }
        Ok(())
    }
}

/// Counts frames engine-wide.
#[derive(Debug, Default)]
pub struct FrameCounter {
    frames: AtomicU64,
}

impl FrameCounter {
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Module for FrameCounter {
    fn init(&self) -> anyhow::Result<()> {
        debug!("frame counter ready");
        Ok(())
    }

    fn update(&self, _time: FrameTime) -> anyhow::Result<()> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn destroy(&self) -> anyhow::Result<()> {
        info!(frames = self.frames(), "frame counter destroyed");
        Ok(())
    }
}

/// Build the demo scene: `count` spinning entities laid out on the X axis.
/// Every other entity expires after a number of frames proportional to its
/// index.
pub async fn build_scene(count: usize) -> anyhow::Result<Arc<Scene>> {
    let scene = Scene::new("demo");
    scene.add_system::<Census>();

    for i in 0..count {
        let entity = Entity::new(format!("spinner-{i}"));
        if let Some(transform) = entity.get_component::<Transform>() {
            transform.set_position(Vec3::new(i as f32 * 2.0, 0.0, 0.0));
        }
        scene.add_entity(&entity);
        entity
            .attach(Spin {
                speed: 0.5 + i as f32 * 0.25,
            })
            .await?;
        if i % 2 == 1 {
            let frames = u32::try_from(i * 10).unwrap_or(u32::MAX);
            entity.attach(Lifetime::frames(frames)).await?;
        }
    }
    Ok(scene)
}
