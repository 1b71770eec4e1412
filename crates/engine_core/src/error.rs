//! Engine error types.

/// Boxed error carried as the source of hook and module failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by entity, scene, module, and engine operations.
///
/// Duplicate registration is not an error: adding a component, system, or
/// module type that is already present returns `None` instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A lifecycle hook invoked outside the phase fan-out failed.
    #[error("`{hook}` hook of `{type_name}` failed: {source}")]
    Hook {
        /// The hook name (e.g. `"on_enable"`).
        hook: &'static str,
        /// The concrete component or system type.
        type_name: &'static str,
        /// The error returned by the hook.
        #[source]
        source: BoxError,
    },

    /// A module's `init`, `update`, or `destroy` failed.
    #[error("module `{type_name}` failed to {stage}: {source}")]
    Module {
        /// The concrete module type.
        type_name: &'static str,
        /// The lifecycle stage that failed (e.g. `"init"`).
        stage: &'static str,
        /// The error returned by the module.
        #[source]
        source: BoxError,
    },

    /// A configuration value is out of range or unparsable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A configuration document is not valid JSON.
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Wrap a hook failure.
    pub(crate) fn hook(hook: &'static str, type_name: &'static str, error: anyhow::Error) -> Self {
        Self::Hook {
            hook,
            type_name,
            source: error.into(),
        }
    }

    /// Wrap a module failure.
    pub(crate) fn module(
        type_name: &'static str,
        stage: &'static str,
        error: anyhow::Error,
    ) -> Self {
        Self::Module {
            type_name,
            stage,
            source: error.into(),
        }
    }
}
