//! Phase fan-out and the end-of-frame removal sweep.
//!
//! A phase spawns one task per system and one per component of every entity
//! onto the runtime, then waits for all of them before returning. That wait
//! is the barrier between phases: nothing of the next phase starts until
//! every hook of the current one has resolved. No ordering is guaranteed
//! between tasks of the same phase.
//!
//! A hook that returns an error or panics fails only its own task. The
//! failure is logged, recorded in the [`PhaseReport`], and the barrier still
//! completes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::{Id, JoinSet};
use tracing::{trace, warn};

use crate::component::ComponentContext;
use crate::entity::EntityId;
use crate::handle::{ComponentHandle, SystemHandle};
use crate::scene::Scene;
use crate::system::SystemContext;
use crate::time::FrameTime;

/// Per-frame hook phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Runs first, before any GUI or simulation work.
    EarlyUpdate,
    /// Immediate-mode GUI work.
    OnGui,
    /// Main per-frame simulation.
    Update,
    /// Runs after every `update` of the frame has finished.
    LateUpdate,
}

impl Phase {
    /// Every phase, in the order a frame runs them.
    pub const ALL: [Phase; 4] = [
        Phase::EarlyUpdate,
        Phase::OnGui,
        Phase::Update,
        Phase::LateUpdate,
    ];

    /// Name of the hook this phase invokes.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Phase::EarlyUpdate => "early_update",
            Phase::OnGui => "on_gui",
            Phase::Update => "update",
            Phase::LateUpdate => "late_update",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Label of the report produced by [`sweep_removals`].
pub const SWEEP_LABEL: &str = "removal_sweep";

/// What a scheduled task was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTarget {
    /// A system hook of the scene.
    System { type_name: &'static str },
    /// A component hook on `entity`.
    Component { entity: EntityId, type_name: &'static str },
    /// Removal of the components `entity` marked during the frame.
    Sweep { entity: EntityId },
}

impl fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskTarget::System { type_name } => write!(f, "system `{type_name}`"),
            TaskTarget::Component { entity, type_name } => {
                write!(f, "component `{type_name}` on {entity}")
            }
            TaskTarget::Sweep { entity } => write!(f, "removal sweep of {entity}"),
        }
    }
}

/// A task that returned an error or panicked.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    /// The hook or sweep that failed.
    pub target: TaskTarget,
    /// Error text or panic payload.
    pub message: String,
    /// `true` if the task panicked rather than returning an error.
    pub panicked: bool,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.panicked { "panicked" } else { "failed" };
        write!(f, "{} {verb}: {}", self.target, self.message)
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    /// Phase name, or [`SWEEP_LABEL`].
    pub label: &'static str,
    /// Number of tasks spawned.
    pub tasks: usize,
    pub failures: Vec<TaskFailure>,
}

impl PhaseReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `phase` on every system and component of `scene` and wait for all of
/// them.
pub async fn run_phase(scene: &Arc<Scene>, phase: Phase, time: FrameTime) -> PhaseReport {
    let mut fan_out = FanOut::default();

    let systems = scene.systems();
    let system_count = systems.len();
    for system in systems {
        let target = TaskTarget::System {
            type_name: system.type_name(),
        };
        let cx = SystemContext::new(Arc::clone(scene), time);
        fan_out.spawn(target, call_system(system, phase, cx));
    }

    for entity in scene.entities() {
        for component in entity.components() {
            let target = TaskTarget::Component {
                entity: entity.id(),
                type_name: component.type_name(),
            };
            let cx = ComponentContext::new(Arc::clone(&entity), time);
            fan_out.spawn(target, call_component(component, phase, cx));
        }
    }

    trace!(
        phase = phase.name(),
        frame = time.frame,
        systems = system_count,
        components = fan_out.len() - system_count,
        "phase fan-out"
    );
    fan_out.join(phase.name()).await
}

/// Detach every component marked for removal, one task per entity, and wait
/// for all of them.
pub async fn sweep_removals(scene: &Arc<Scene>) -> PhaseReport {
    let mut fan_out = FanOut::default();
    for entity in scene.entities() {
        let target = TaskTarget::Sweep { entity: entity.id() };
        fan_out.spawn(target, async move {
            match entity.remove_all_marked_for_removal().await {
                Ok(0) => Ok(()),
                Ok(removed) => {
                    trace!(entity = %entity.id(), removed, "swept marked components");
                    Ok(())
                }
                // The engine error already renders its source.
                Err(err) => Err(anyhow::anyhow!("{err}")),
            }
        });
    }
    fan_out.join(SWEEP_LABEL).await
}

async fn call_system(
    system: SystemHandle,
    phase: Phase,
    cx: SystemContext,
) -> anyhow::Result<()> {
    let system = system.get();
    match phase {
        Phase::EarlyUpdate => system.early_update(&cx).await,
        Phase::OnGui => system.on_gui(&cx).await,
        Phase::Update => system.update(&cx).await,
        Phase::LateUpdate => system.late_update(&cx).await,
    }
}

async fn call_component(
    component: ComponentHandle,
    phase: Phase,
    cx: ComponentContext,
) -> anyhow::Result<()> {
    let component = component.get();
    match phase {
        Phase::EarlyUpdate => component.early_update(&cx).await,
        Phase::OnGui => component.on_gui(&cx).await,
        Phase::Update => component.update(&cx).await,
        Phase::LateUpdate => component.late_update(&cx).await,
    }
}

/// Outcome of a single task, as seen after the barrier.
enum Outcome {
    Done,
    Failed(String),
    Panicked(String),
}

#[derive(Default)]
struct FanOut {
    tasks: JoinSet<Outcome>,
    targets: HashMap<Id, TaskTarget>,
}

impl FanOut {
    fn len(&self) -> usize {
        self.targets.len()
    }

    fn spawn<F>(&mut self, target: TaskTarget, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = self.tasks.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => Outcome::Done,
                Ok(Err(err)) => Outcome::Failed(format!("{err:#}")),
                Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
            }
        });
        self.targets.insert(handle.id(), target);
    }

    async fn join(mut self, label: &'static str) -> PhaseReport {
        let tasks = self.targets.len();
        let mut failures = Vec::new();
        while let Some(joined) = self.tasks.join_next_with_id().await {
            let (id, message, panicked) = match joined {
                Ok((_, Outcome::Done)) => continue,
                Ok((id, Outcome::Failed(message))) => (id, message, false),
                Ok((id, Outcome::Panicked(message))) => (id, message, true),
                Err(err) => (err.id(), err.to_string(), err.is_panic()),
            };
            let Some(target) = self.targets.remove(&id) else {
                continue;
            };
            let failure = TaskFailure {
                target,
                message,
                panicked,
            };
            warn!(phase = label, error = %failure, "task failed");
            failures.push(failure);
        }
        PhaseReport {
            label,
            tasks,
            failures,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::component::Component;
    use crate::entity::Entity;
    use crate::system::System;

    #[derive(Debug, Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl Component for Counter {
        async fn update(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct Erroring;

    #[async_trait]
    impl Component for Erroring {
        async fn update(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
            anyhow::bail!("out of ammo")
        }
    }

    #[derive(Debug, Default)]
    struct Panicking;

    #[async_trait]
    impl System for Panicking {
        async fn update(&self, _cx: &SystemContext) -> anyhow::Result<()> {
            panic!("division by zero");
        }
    }

    #[test]
    fn test_phase_order() {
        let names: Vec<_> = Phase::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["early_update", "on_gui", "update", "late_update"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_phase_reaches_every_component() {
        let scene = Scene::empty();
        let mut counters = Vec::new();
        for i in 0..8 {
            let entity = Entity::new(format!("e{i}"));
            scene.add_entity(&entity);
            counters.push(entity.add_component::<Counter>().await.unwrap().unwrap());
        }

        let report = run_phase(&scene, Phase::Update, FrameTime::default()).await;
        assert!(report.is_clean());
        assert_eq!(report.label, "update");
        // Each entity also carries its transform.
        assert_eq!(report.tasks, 16);
        assert!(counters.iter().all(|c| c.0.load(Ordering::SeqCst) == 1));

        run_phase(&scene, Phase::LateUpdate, FrameTime::default()).await;
        assert!(counters.iter().all(|c| c.0.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failures_are_isolated_per_task() {
        let scene = Scene::empty();
        scene.add_system::<Panicking>();
        let entity = Entity::new("e");
        scene.add_entity(&entity);
        let counter = entity.add_component::<Counter>().await.unwrap().unwrap();
        entity.add_component::<Erroring>().await.unwrap();

        let report = run_phase(&scene, Phase::Update, FrameTime::default()).await;
        assert_eq!(report.tasks, 4);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let panicked = report.failures.iter().find(|f| f.panicked).unwrap();
        assert!(matches!(panicked.target, TaskTarget::System { .. }));
        assert_eq!(panicked.message, "division by zero");

        let failed = report.failures.iter().find(|f| !f.panicked).unwrap();
        assert_eq!(failed.message, "out of ammo");
        assert!(matches!(
            failed.target,
            TaskTarget::Component { entity: id, .. } if id == entity.id()
        ));
    }

    #[tokio::test]
    async fn test_sweep_removes_marked_components() {
        let scene = Scene::empty();
        let entity = Entity::new("e");
        scene.add_entity(&entity);
        entity.add_component::<Counter>().await.unwrap();
        entity.remove_component::<Counter>();

        let report = sweep_removals(&scene).await;
        assert_eq!(report.label, SWEEP_LABEL);
        assert_eq!(report.tasks, 1);
        assert!(report.is_clean());
        assert!(!entity.has_component::<Counter>());
        assert!(scene.get_components::<Counter>().is_empty());
    }

    #[tokio::test]
    async fn test_empty_scene_spawns_nothing() {
        let report = run_phase(&Scene::empty(), Phase::EarlyUpdate, FrameTime::default()).await;
        assert_eq!(report.tasks, 0);
        assert!(report.is_clean());
    }
}
