//! The engine: active scene, modules, and the frame loop.
//!
//! Each frame runs, in order:
//!
//! 1. the frame clock tick, publishing the frame's [`FrameTime`] on the scene;
//! 2. every module's `update`, sequentially in registration order;
//! 3. the four hook phases, each a fan-out followed by a barrier;
//! 4. the removal sweep of components marked during the frame.
//!
//! [`Engine::run`] repeats that until stopped and sleeps between frames when
//! a maximum loop frequency is configured.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::module::{Module, ModuleRegistry};
use crate::scene::Scene;
use crate::scheduler::{self, Phase, PhaseReport, TaskFailure};
use crate::system::SystemContext;
use crate::time::{FrameClock, FrameTime, limiter_delay};

/// Stops a running [`Engine::run`] loop from anywhere.
///
/// The loop finishes the frame in progress before it notices.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Ask the loop to stop after its current frame.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Timing of the frame.
    pub time: FrameTime,
    /// One report per hook phase, in execution order.
    pub phases: Vec<PhaseReport>,
    /// Report of the end-of-frame removal sweep.
    pub sweep: PhaseReport,
}

impl FrameReport {
    /// Every task failure of the frame.
    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.phases
            .iter()
            .chain(std::iter::once(&self.sweep))
            .flat_map(|report| report.failures.iter())
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }

    /// Number of tasks spawned across all phases and the sweep.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks).sum::<usize>() + self.sweep.tasks
    }
}

/// Which system hook a scene transition invokes.
#[derive(Clone, Copy)]
enum Transition {
    Enable,
    Disable,
}

impl Transition {
    const fn hook(self) -> &'static str {
        match self {
            Transition::Enable => "on_enable",
            Transition::Disable => "on_disable",
        }
    }
}

/// Owns the active scene and the modules, and drives frames.
pub struct Engine {
    config: EngineConfig,
    scene: Arc<Scene>,
    modules: ModuleRegistry,
    clock: FrameClock,
    running: Arc<AtomicBool>,
}

impl Engine {
    /// Create an engine with an empty scene and no modules.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` does not validate.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            scene: Scene::empty(),
            modules: ModuleRegistry::new(),
            clock: FrameClock::new(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The active scene.
    #[must_use]
    pub fn current_scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// Unload the active scene, then make `scene` active and run
    /// `on_enable` on each of its systems.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError::Hook`] raised by an `on_disable` or
    /// `on_enable` hook. The new scene is active regardless.
    pub async fn load_scene(&mut self, scene: Arc<Scene>) -> Result<(), EngineError> {
        let unloaded = self.unload_scene().await;
        self.scene = scene;
        info!(scene = %self.scene.name(), systems = self.scene.system_count(), "scene loaded");
        let enabled = toggle_systems(&self.scene, Transition::Enable).await;
        unloaded.and(enabled)
    }

    /// Run `on_disable` on every system of the active scene and replace it
    /// with an empty scene.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError::Hook`] raised by an `on_disable`
    /// hook. The scene is replaced regardless.
    pub async fn unload_scene(&mut self) -> Result<(), EngineError> {
        let disabled = toggle_systems(&self.scene, Transition::Disable).await;
        let previous = std::mem::replace(&mut self.scene, Scene::empty());
        debug!(scene = %previous.name(), "scene unloaded");
        disabled
    }

    /// Construct a `T` with [`Default`] and register it. See
    /// [`Engine::add_module_with`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Module`] if the module fails to initialise.
    pub fn add_module<T: Module + Default>(&mut self) -> Result<Option<Arc<T>>, EngineError> {
        if self.modules.contains::<T>() {
            debug!(module = std::any::type_name::<T>(), "module already registered");
            return Ok(None);
        }
        self.modules.add(T::default())
    }

    /// Initialise and register `module`. Returns `Ok(None)` if a module of
    /// the same type is already registered.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Module`] if the module fails to initialise.
    pub fn add_module_with<T: Module>(
        &mut self,
        module: T,
    ) -> Result<Option<Arc<T>>, EngineError> {
        self.modules.add(module)
    }

    /// Destroy and unregister the `T` module.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Module`] if the module fails to destroy.
    pub fn remove_module<T: Module>(&mut self) -> Result<bool, EngineError> {
        self.modules.remove::<T>()
    }

    #[must_use]
    pub fn get_module<T: Module>(&self) -> Option<Arc<T>> {
        self.modules.get::<T>()
    }

    #[must_use]
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// A handle that stops [`Engine::run`] after its current frame.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of frames started so far.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.clock.frames()
    }

    /// Run a single frame without rate limiting.
    ///
    /// Failures of individual hooks do not fail the frame; they are listed
    /// in the returned report.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Module`] if a module's `update` fails. The hook
    /// phases and the sweep are skipped for that frame.
    pub async fn run_frame(&mut self) -> Result<FrameReport, EngineError> {
        let time = self.clock.tick();
        let scene = Arc::clone(&self.scene);
        scene.set_frame_time(time);

        self.modules.update_all(time)?;

        let mut phases = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            phases.push(scheduler::run_phase(&scene, phase, time).await);
        }
        let sweep = scheduler::sweep_removals(&scene).await;

        let report = FrameReport {
            time,
            phases,
            sweep,
        };
        debug!(
            frame = time.frame,
            delta_time = time.delta_time,
            tasks = report.task_count(),
            failures = report.failure_count(),
            "frame complete"
        );
        Ok(report)
    }

    /// Run frames until stopped or until `max_frames` frames have run.
    /// Returns the number of frames run.
    ///
    /// A frame that fails is logged and the loop moves on to the next one.
    pub async fn run(&mut self) -> u64 {
        self.running.store(true, Ordering::Release);
        self.clock.restart();
        info!(
            scene = %self.scene.name(),
            modules = self.modules.len(),
            max_loops_per_second = self.config.max_loops_per_second,
            max_frames = self.config.max_frames,
            "starting frame loop"
        );

        let mut frames = 0u64;
        while self.is_running() {
            if let Err(err) = self.run_frame().await {
                error!(frame = self.clock.frames() - 1, error = %err, "frame failed");
            }
            frames += 1;
            if self.config.max_frames > 0 && frames >= self.config.max_frames {
                break;
            }
            self.limit().await;
        }

        self.running.store(false, Ordering::Release);
        info!(frames, "frame loop stopped");
        frames
    }

    /// Unload the active scene and destroy every module, newest first.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a system's `on_disable` or a
    /// module's `destroy`. Teardown completes regardless.
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        let unloaded = self.unload_scene().await;
        let destroyed = self.modules.destroy_all();
        info!("engine shut down");
        unloaded.and(destroyed)
    }

    async fn limit(&self) {
        let cap = self.config.max_loops_per_second;
        let elapsed = self.clock.frame_elapsed();
        match limiter_delay(cap, elapsed) {
            Some(wait) => tokio::time::sleep(wait).await,
            None if cap > 0.0 => warn!(
                frame = self.clock.frames() - 1,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = 1000.0 / f64::from(cap),
                "frame exceeded time budget"
            ),
            None => {}
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("scene", &self.scene.name())
            .field("modules", &self.modules)
            .field("frames", &self.clock.frames())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Invoke the transition hook on every system of `scene`, one after another.
/// Returns the first failure after all hooks have run.
async fn toggle_systems(scene: &Arc<Scene>, transition: Transition) -> Result<(), EngineError> {
    let cx = SystemContext::new(Arc::clone(scene), scene.frame_time());
    let mut first_error = None;
    for system in scene.systems() {
        let result = match transition {
            Transition::Enable => system.get().on_enable(&cx).await,
            Transition::Disable => system.get().on_disable(&cx).await,
        };
        if let Err(err) = result {
            let err = EngineError::hook(transition.hook(), system.type_name(), err);
            warn!(scene = %scene.name(), error = %err, "system transition failed");
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}
