//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Environment variable overriding [`EngineConfig::max_loops_per_second`].
pub const MAX_LOOPS_PER_SECOND_ENV: &str = "ENGINE_MAX_LOOPS_PER_SECOND";

/// Environment variable overriding [`EngineConfig::max_frames`].
pub const MAX_FRAMES_ENV: &str = "ENGINE_MAX_FRAMES";

/// Configuration of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on frames per second (0 = unlimited).
    pub max_loops_per_second: f32,
    /// Number of frames after which `run` returns (0 = unlimited).
    pub max_frames: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loops_per_second: 0.0,
            max_frames: 0,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_loops_per_second(mut self, max_loops_per_second: f32) -> Self {
        self.max_loops_per_second = max_loops_per_second;
        self
    }

    #[must_use]
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Check that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `max_loops_per_second` is negative
    /// or not finite.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.max_loops_per_second.is_finite() || self.max_loops_per_second < 0.0 {
            return Err(EngineError::Config(format!(
                "max_loops_per_second must be a finite non-negative number, got {}",
                self.max_loops_per_second
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Json`] for malformed documents and
    /// [`EngineError::Config`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if a variable is set to an
    /// unparsable or out-of-range value.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a configuration from `lookup`, which maps a variable name to
    /// its value. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let mut config = Self::default();
        if let Some(value) = lookup(MAX_LOOPS_PER_SECOND_ENV) {
            config.max_loops_per_second = parse_var(MAX_LOOPS_PER_SECOND_ENV, &value)?;
        }
        if let Some(value) = lookup(MAX_FRAMES_ENV) {
            config.max_frames = parse_var(MAX_FRAMES_ENV, &value)?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| EngineError::Config(format!("{name}={value:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_is_unlimited() {
        let config = EngineConfig::default();
        assert_eq!(config.max_loops_per_second, 0.0);
        assert_eq!(config.max_frames, 0);
        config.validate().unwrap();
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_max_loops_per_second(60.0)
            .with_max_frames(10);
        assert_eq!(config.max_loops_per_second, 60.0);
        assert_eq!(config.max_frames, 10);
    }

    #[test]
    fn test_validate_rejects_negative_and_nan() {
        for bad in [-1.0, f32::NAN, f32::INFINITY] {
            let err = EngineConfig::default()
                .with_max_loops_per_second(bad)
                .validate()
                .unwrap_err();
            assert!(matches!(err, EngineError::Config(_)));
        }
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "max_loops_per_second": 30 }"#).unwrap();
        assert_eq!(config.max_loops_per_second, 30.0);
        assert_eq!(config.max_frames, 0);
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(EngineError::Json(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{ "max_loops_per_second": -5 }"#),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_from_vars() {
        let config = EngineConfig::from_vars(vars(&[
            (MAX_LOOPS_PER_SECOND_ENV, "120"),
            (MAX_FRAMES_ENV, " 300 "),
        ]))
        .unwrap();
        assert_eq!(config.max_loops_per_second, 120.0);
        assert_eq!(config.max_frames, 300);

        assert_eq!(
            EngineConfig::from_vars(vars(&[])).unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let err = EngineConfig::from_vars(vars(&[(MAX_FRAMES_ENV, "many")])).unwrap_err();
        assert!(err.to_string().contains(MAX_FRAMES_ENV));

        let err = EngineConfig::from_vars(vars(&[(MAX_LOOPS_PER_SECOND_ENV, "-3")])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
