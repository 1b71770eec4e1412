//! Engine-wide services.
//!
//! A [`Module`] lives outside any scene, at most one per concrete type. It is
//! initialised when registered, updated once per frame before the scene
//! phases run, and destroyed when removed or when the engine shuts down.
//! Module hooks are synchronous and expected to be cheap.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::scheduler::panic_message;
use crate::time::FrameTime;
use crate::type_key::TypeKey;

/// Lifecycle hooks of an engine-wide service.
pub trait Module: Send + Sync + 'static {
    /// Runs once, when the module is registered.
    fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once per frame, in registration order.
    fn update(&self, _time: FrameTime) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once, when the module is removed or the engine shuts down.
    fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Registered {
    key: TypeKey,
    type_name: &'static str,
    module: Arc<dyn Module>,
    any: Arc<dyn Any + Send + Sync>,
}

impl Registered {
    fn new<T: Module>(module: Arc<T>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            type_name: std::any::type_name::<T>(),
            any: Arc::clone(&module) as Arc<dyn Any + Send + Sync>,
            module,
        }
    }

    fn update(&self, time: FrameTime) -> Result<(), EngineError> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.module.update(time)))
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())))
            });
        result.map_err(|err| EngineError::module(self.type_name, "update", err))
    }

    fn destroy(&self) -> Result<(), EngineError> {
        self.module
            .destroy()
            .map_err(|err| EngineError::module(self.type_name, "destroy", err))
    }
}

/// Modules in registration order.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Registered>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise and register `module`.
    ///
    /// Returns `Ok(None)` without calling `init` if a module of the same type
    /// is already registered.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Module`] if `init` fails; the module is not
    /// registered in that case.
    pub fn add<T: Module>(&mut self, module: T) -> Result<Option<Arc<T>>, EngineError> {
        let key = TypeKey::of::<T>();
        let type_name = std::any::type_name::<T>();
        if self.contains_key(key) {
            debug!(module = type_name, "module already registered");
            return Ok(None);
        }

        module
            .init()
            .map_err(|err| EngineError::module(type_name, "init", err))?;
        let module = Arc::new(module);
        self.modules.push(Registered::new(Arc::clone(&module)));
        info!(module = type_name, "module registered");
        Ok(Some(module))
    }

    /// Destroy and unregister the `T` module. Returns `Ok(false)` if there
    /// was none.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Module`] if `destroy` fails. The module is
    /// unregistered regardless.
    pub fn remove<T: Module>(&mut self) -> Result<bool, EngineError> {
        let key = TypeKey::of::<T>();
        let Some(position) = self.modules.iter().position(|m| m.key == key) else {
            return Ok(false);
        };
        let removed = self.modules.remove(position);
        info!(module = removed.type_name, "module removed");
        removed.destroy()?;
        Ok(true)
    }

    #[must_use]
    pub fn get<T: Module>(&self) -> Option<Arc<T>> {
        let key = TypeKey::of::<T>();
        self.modules
            .iter()
            .find(|m| m.key == key)
            .and_then(|m| Arc::clone(&m.any).downcast::<T>().ok())
    }

    #[must_use]
    pub fn contains<T: Module>(&self) -> bool {
        self.contains_key(TypeKey::of::<T>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Type names of the registered modules, in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.iter().map(|m| m.type_name)
    }

    /// Update every module in registration order, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Module`] for the first `update` that fails or
    /// panics.
    pub fn update_all(&self, time: FrameTime) -> Result<(), EngineError> {
        for registered in &self.modules {
            registered.update(time)?;
        }
        Ok(())
    }

    /// Destroy and unregister every module, newest first.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError::Module`] raised by a `destroy` hook.
    /// Every module is destroyed regardless.
    pub fn destroy_all(&mut self) -> Result<(), EngineError> {
        let mut first_error = None;
        while let Some(registered) = self.modules.pop() {
            if let Err(err) = registered.destroy() {
                warn!(module = registered.type_name, error = %err, "module failed to destroy");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn contains_key(&self, key: TypeKey) -> bool {
        self.modules.iter().any(|m| m.key == key)
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}
