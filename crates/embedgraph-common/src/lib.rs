//! Common types shared across the embedgraph workspace
//!
//! This crate provides the error taxonomy, device placement descriptors and
//! the builder configuration used by the scope, graph and layer crates.

pub mod config;
pub mod device;
pub mod error;

pub use config::{BuilderConfig, BuilderConfigBuilder, ConfigLoader, FP16_ENGINE};
pub use device::{DeviceKind, DeviceSpec};
pub use error::{GraphError, Result, ScopeKind};

/// Separator joining the components of a hierarchical name scope.
pub const NAMESCOPE_SEPARATOR: char = '/';
