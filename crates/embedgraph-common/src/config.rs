//! Configuration types and utilities

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{GraphError, Result};

/// Environment variable overriding [`BuilderConfig::net_name`].
pub const ENV_NET_NAME: &str = "EMBEDGRAPH_NET_NAME";
/// Environment variable overriding [`BuilderConfig::request_only`].
pub const ENV_REQUEST_ONLY: &str = "EMBEDGRAPH_REQUEST_ONLY";
/// Environment variable overriding [`BuilderConfig::default_layer_name`].
pub const ENV_DEFAULT_LAYER_NAME: &str = "EMBEDGRAPH_DEFAULT_LAYER_NAME";
/// Environment variable overriding [`BuilderConfig::lookup_engine`].
pub const ENV_LOOKUP_ENGINE: &str = "EMBEDGRAPH_LOOKUP_ENGINE";

/// All environment variables read by [`BuilderConfig::from_env`].
pub const ENV_VARS: [&str; 4] =
    [ENV_NET_NAME, ENV_REQUEST_ONLY, ENV_DEFAULT_LAYER_NAME, ENV_LOOKUP_ENGINE];

/// Reduced-precision engine tag requested for lookup/reduction primitives.
pub const FP16_ENGINE: &str = "fp16";

/// Settings shared by every layer built into one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Name of the graph the layers emit into.
    pub net_name: String,
    /// Build for inference serving: outputs are tagged request-only.
    pub request_only: bool,
    /// Layer name used when the caller does not supply one.
    pub default_layer_name: String,
    /// Engine tag attached to the lookup/reduction operator.
    pub lookup_engine: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            net_name: "net".to_string(),
            request_only: false,
            default_layer_name: "sparse_lookup".to_string(),
            lookup_engine: FP16_ENGINE.to_string(),
        }
    }
}

impl BuilderConfig {
    /// Start a builder seeded with defaults.
    pub fn builder() -> BuilderConfigBuilder {
        BuilderConfigBuilder::default()
    }

    /// Load a configuration file; the format is picked from the extension
    /// (`.toml` or `.json`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::config(format!("failed to read {}: {e}", path.display()))
        })?;

        let config: BuilderConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| {
                GraphError::config(format!("invalid TOML in {}: {e}", path.display()))
            })?,
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                GraphError::config(format!("invalid JSON in {}: {e}", path.display()))
            })?,
            other => {
                return Err(GraphError::config(format!(
                    "unsupported config format {:?} for {}",
                    other,
                    path.display()
                )));
            }
        };

        tracing::debug!(path = %path.display(), "loaded builder config from file");
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overwrite fields for every `EMBEDGRAPH_*` variable that is set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(name) = env::var(ENV_NET_NAME) {
            self.net_name = name;
        }

        if let Ok(value) = env::var(ENV_REQUEST_ONLY) {
            self.request_only = parse_bool(ENV_REQUEST_ONLY, &value)?;
        }

        if let Ok(name) = env::var(ENV_DEFAULT_LAYER_NAME) {
            self.default_layer_name = name;
        }

        if let Ok(engine) = env::var(ENV_LOOKUP_ENGINE) {
            self.lookup_engine = engine;
        }

        Ok(())
    }

    /// Take every field of `other` that differs from the default.
    pub fn merge_with(&mut self, other: BuilderConfig) {
        let defaults = BuilderConfig::default();

        if other.net_name != defaults.net_name {
            self.net_name = other.net_name;
        }
        if other.request_only != defaults.request_only {
            self.request_only = other.request_only;
        }
        if other.default_layer_name != defaults.default_layer_name {
            self.default_layer_name = other.default_layer_name;
        }
        if other.lookup_engine != defaults.lookup_engine {
            self.lookup_engine = other.lookup_engine;
        }
    }

    /// Reject values no graph could be built with.
    pub fn validate(&self) -> Result<()> {
        if self.net_name.trim().is_empty() {
            return Err(GraphError::config("net_name must not be empty"));
        }
        if self.default_layer_name.trim().is_empty() {
            return Err(GraphError::config("default_layer_name must not be empty"));
        }
        if self.default_layer_name.contains('/') {
            return Err(GraphError::config(format!(
                "default_layer_name '{}' must not contain the scope separator",
                self.default_layer_name
            )));
        }
        if self.lookup_engine.chars().any(char::is_whitespace) {
            return Err(GraphError::config(format!(
                "lookup_engine '{}' must not contain whitespace",
                self.lookup_engine
            )));
        }
        Ok(())
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GraphError::config(format!("invalid boolean for {var}: '{other}'"))),
    }
}

/// Fluent construction of a [`BuilderConfig`].
#[derive(Debug, Default)]
pub struct BuilderConfigBuilder {
    config: BuilderConfig,
}

impl BuilderConfigBuilder {
    pub fn net_name(mut self, name: impl Into<String>) -> Self {
        self.config.net_name = name.into();
        self
    }

    pub fn request_only(mut self, request_only: bool) -> Self {
        self.config.request_only = request_only;
        self
    }

    pub fn default_layer_name(mut self, name: impl Into<String>) -> Self {
        self.config.default_layer_name = name.into();
        self
    }

    pub fn lookup_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.lookup_engine = engine.into();
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<BuilderConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Resolves a [`BuilderConfig`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the optional file, then environment overrides.
    pub fn load_with_precedence(path: Option<&Path>) -> Result<BuilderConfig> {
        let mut config = BuilderConfig::default();

        if let Some(path) = path {
            config.merge_with(BuilderConfig::from_file(path)?);
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}
