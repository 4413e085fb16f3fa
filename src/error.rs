use std::fmt;

use thiserror::Error;

/// Which of the two registry mappings a name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Rule,
    Handler,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeKind::Rule => write!(f, "rule"),
            TypeKind::Handler => write!(f, "handler"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorylineError {
    #[error("Invalid argument `{name}`: {reason}")]
    Argument { name: &'static str, reason: String },
    #[error("Unresolved {kind} type: {name:?}")]
    UnresolvedType { kind: TypeKind, name: String },
    #[error("Invalid definition at record {index}: {message}")]
    Definition { index: usize, message: String },
    #[error("Reconfiguration failed: {0}")]
    Reconfiguration(String),
    #[error("Handler construction failed: {0}")]
    HandlerConstruction(String),
    #[error("Ruleset provider has been disposed")]
    Disposed,
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorylineError {
    pub(crate) fn argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Argument { name, reason: reason.into() }
    }
    /// Errors that only cost a single record of a definition batch.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::UnresolvedType { .. } | Self::Definition { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorylineError>;

// Helper conversions
impl From<config::ConfigError> for StorylineError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
