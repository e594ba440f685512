//! Error taxonomy for the launch engine
//!
//! Configuration errors are detected while building the graph or resolving
//! substitutions and abort the whole run before any process starts. Runtime
//! process errors are scoped to a single action: siblings keep running but
//! the run finishes with a non-zero status.

use std::path::PathBuf;
use thiserror::Error;

/// Errors found while building or resolving a launch graph
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Argument '{0}' is declared more than once")]
    DuplicateArgument(String),

    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("{context} references undeclared argument '{name}'")]
    UndeclaredReference { name: String, context: String },

    #[error("Cyclic argument reference: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),

    #[error("Action '{0}' is defined more than once")]
    DuplicateAction(String),

    #[error("Invalid action '{action}': {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Undefined environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid substitution: {0}")]
    InvalidSubstitution(String),

    #[error("Invalid launch file: {0}")]
    InvalidLaunchFile(String),

    #[error("Failed to read launch file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse launch file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Errors that are fatal to a single action only
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeProcessError {
    #[error("Failed to spawn '{action}': {reason}")]
    ProcessSpawn { action: String, reason: String },

    #[error("Action '{action}': parameter file not found: {}", .path.display())]
    ConfigFileNotFound { action: String, path: PathBuf },
}

impl RuntimeProcessError {
    /// Name of the action this error belongs to
    pub fn action(&self) -> &str {
        match self {
            RuntimeProcessError::ProcessSpawn { action, .. } => action,
            RuntimeProcessError::ConfigFileNotFound { action, .. } => action,
        }
    }
}
