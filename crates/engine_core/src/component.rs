//! The [`Component`] lifecycle contract.
//!
//! A component is a unit of behaviour and data attached to exactly one
//! [`Entity`]. It takes part in the per-frame phases through six async hooks,
//! all of which default to doing nothing, so an implementation overrides
//! only what it needs.
//!
//! Hooks take `&self`: the scheduler runs hooks of different components in
//! parallel, and a component that mutates its own state uses interior
//! mutability (atomics, locks) to do so.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use async_trait::async_trait;
//! use engine_core::{Component, ComponentContext};
//!
//! #[derive(Debug, Default)]
//! struct Ticks(AtomicU64);
//!
//! #[async_trait]
//! impl Component for Ticks {
//!     async fn update(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::scene::Scene;
use crate::time::FrameTime;

/// Lifecycle hooks of a component.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Runs once when the component is attached to an entity. Attaching does
    /// not complete until this hook resolves.
    async fn on_enable(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once when the component is removed from its entity.
    async fn on_disable(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame, before [`Component::on_gui`].
    async fn early_update(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame; all GUI work belongs here.
    async fn on_gui(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame.
    async fn update(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs every frame, after [`Component::update`].
    async fn late_update(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Context handed to every component hook.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    entity: Arc<Entity>,
    time: FrameTime,
}

impl ComponentContext {
    /// Create a context for a hook of a component owned by `entity`.
    #[must_use]
    pub fn new(entity: Arc<Entity>, time: FrameTime) -> Self {
        Self { entity, time }
    }

    /// The entity owning the component.
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// The scene the owning entity currently belongs to.
    #[must_use]
    pub fn scene(&self) -> Option<Arc<Scene>> {
        self.entity.scene()
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
