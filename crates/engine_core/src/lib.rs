//! # engine_core
//!
//! Entities, components, systems, and scenes, driven by a phased frame
//! scheduler.
//!
//! This crate provides:
//!
//! - [`Component`] and [`System`] traits: six async lifecycle hooks each.
//! - [`Entity`]: a type-keyed set of components with deferred removal.
//! - [`Scene`]: entities, systems, and a per-type component cache.
//! - [`Module`]: engine-wide services updated once per frame.
//! - [`Engine`]: the frame loop running modules, four barrier-separated hook
//!   phases, the removal sweep, and an optional frame-rate cap.
//! - [`Transform`]: the spatial component every entity starts with.

pub mod component;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod handle;
pub mod module;
pub mod scene;
pub mod scheduler;
mod sync;
pub mod system;
pub mod time;
pub mod transform;
pub mod type_key;

pub use component::{Component, ComponentContext};
pub use config::EngineConfig;
pub use engine::{Engine, FrameReport, StopHandle};
pub use entity::{Entity, EntityId};
pub use error::EngineError;
pub use handle::{Attached, ComponentHandle, ComponentRef, Handle, SystemHandle, SystemRef};
pub use module::{Module, ModuleRegistry};
pub use scene::Scene;
pub use scheduler::{Phase, PhaseReport, TaskFailure, TaskTarget};
pub use system::{System, SystemContext};
pub use time::{FrameClock, FrameTime};
pub use transform::Transform;
pub use type_key::TypeKey;
