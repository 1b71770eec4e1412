//! The [`System`] lifecycle contract.
//!
//! A system is attached to a [`Scene`] rather than to an entity. It exposes
//! the same hooks as a [`Component`](crate::Component) and typically works
//! over the scene's component queries:
//!
//! ```rust
//! use async_trait::async_trait;
//! use engine_core::{System, SystemContext, Transform};
//!
//! #[derive(Debug, Default)]
//! struct Gravity;
//!
//! #[async_trait]
//! impl System for Gravity {
//!     async fn update(&self, cx: &SystemContext) -> anyhow::Result<()> {
//!         let fall = 9.81 * cx.delta_time();
//!         for transform in cx.scene().get_components::<Transform>() {
//!             let mut position = transform.position();
//!             position.y -= fall;
//!             transform.set_position(position);
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::scene::Scene;
use crate::time::FrameTime;

/// Lifecycle hooks of a system.
#[async_trait]
pub trait System: Send + Sync + 'static {
    /// Runs when a scene containing this system is loaded.
    async fn on_enable(&self, _cx: &SystemContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs when a scene containing this system is unloaded or replaced.
    async fn on_disable(&self, _cx: &SystemContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame, before [`System::on_gui`].
    async fn early_update(&self, _cx: &SystemContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame; all GUI work belongs here.
    async fn on_gui(&self, _cx: &SystemContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame.
    async fn update(&self, _cx: &SystemContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame, after [`System::update`].
    async fn late_update(&self, _cx: &SystemContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Context handed to every system hook.
#[derive(Debug, Clone)]
pub struct SystemContext {
    scene: Arc<Scene>,
    time: FrameTime,
}

impl SystemContext {
    /// Create a context for a hook of a system owned by `scene`.
    #[must_use]
    pub fn new(scene: Arc<Scene>, time: FrameTime) -> Self {
        Self { scene, time }
    }

    /// The scene owning the system.
    #[must_use]
    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// Timing of the current frame.
    #[must_use]
    pub fn time(&self) -> FrameTime {
        self.time
    }

    /// Seconds elapsed since the previous frame started.
    #[must_use]
    pub fn delta_time(&self) -> f32 {
        self.time.delta_time
    }
}
