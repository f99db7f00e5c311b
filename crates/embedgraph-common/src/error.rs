//! Error types shared by every embedgraph crate.
//!
//! All failures raised while building a graph are caller programming errors,
//! never transient conditions, so there is a single flat taxonomy and no
//! retry metadata.

use thiserror::Error;

/// Which half of the scope state a violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Hierarchical name prefix.
    Name,
    /// Device placement.
    Device,
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKind::Name => write!(f, "name scope"),
            ScopeKind::Device => write!(f, "device scope"),
        }
    }
}

/// Errors produced while constructing graph layers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported reducer: {reducer} ({reason})")]
    UnsupportedReducer { reducer: String, reason: String },

    #[error("Unsupported input schema: {schema}")]
    UnsupportedInputSchema { schema: String },

    #[error("Features without metadata are not supported: field `{field}`")]
    MissingMetadata { field: String },

    #[error("Unbounded features are not supported: field `{field}` has no categorical limit")]
    UnboundedVocabulary { field: String },

    #[error("The {kind} was changed from outside its scoped block: expected `{expected}`, found `{found}`")]
    InvariantViolation { kind: ScopeKind, expected: String, found: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GraphError {
    /// Shorthand for [`GraphError::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        GraphError::InvalidArgument(msg.into())
    }

    /// Shorthand for [`GraphError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        GraphError::Config(msg.into())
    }

    /// Returns `true` for errors that signal tampering with scope state.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, GraphError::InvariantViolation { .. })
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, GraphError>;
