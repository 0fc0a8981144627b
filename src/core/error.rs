use thiserror::Error;

use crate::core::types::Path;
use crate::process::ProcessError;

/// Broad classes of failure, used by callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Composition or schema mistake; never retried
    Configuration,
    /// A topology path is absent from the tree
    Path,
    /// A process failed inside `next_update`
    ProcessExecution,
    /// A structural command could not be applied
    StructuralConflict,
    /// Filesystem or serialization failure
    Io,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("schema conflict at {path}: {field} declared as {existing} and {incoming}")]
    SchemaConflict {
        path: Path,
        field: &'static str,
        existing: String,
        incoming: String,
    },

    #[error("process '{process}' declares port '{port}' with no topology entry")]
    MissingTopology { process: String, port: String },

    #[error("process '{process}' returned an update for undeclared port '{port}'")]
    UnknownPort { process: String, port: String },

    #[error("unknown updater: {0}")]
    UnknownUpdater(String),

    #[error("unknown divider: {0}")]
    UnknownDivider(String),

    #[error("unknown process type: {0}")]
    UnknownProcess(String),

    #[error("unknown generator: {0}")]
    UnknownGenerator(String),

    #[error("duplicate process name: {0}")]
    DuplicateProcess(String),

    #[error("processes '{first}' and '{second}' both set {path} in the same tick")]
    SetConflict {
        path: Path,
        first: String,
        second: String,
    },

    #[error("leaf {path} cannot be divided")]
    NoDivide { path: Path },

    #[error("invalid value at {path}: {reason}")]
    InvalidValue { path: Path, reason: String },

    #[error("update does not match the tree shape at {path}: {reason}")]
    UpdateShape { path: Path, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("experiment already finalized")]
    Finalized,

    #[error("path not found: {path}")]
    PathNotFound { path: Path },

    #[error("path {path} climbs above the root")]
    PathEscapesRoot { path: Path },

    #[error("process '{process}' failed: {source}")]
    ProcessExecution {
        process: String,
        #[source]
        source: ProcessError,
    },

    #[error("structural conflict at {path}: {reason}")]
    StructuralConflict { path: Path, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::SchemaConflict { .. }
            | EngineError::MissingTopology { .. }
            | EngineError::UnknownPort { .. }
            | EngineError::UnknownUpdater(_)
            | EngineError::UnknownDivider(_)
            | EngineError::UnknownProcess(_)
            | EngineError::UnknownGenerator(_)
            | EngineError::DuplicateProcess(_)
            | EngineError::SetConflict { .. }
            | EngineError::NoDivide { .. }
            | EngineError::InvalidValue { .. }
            | EngineError::UpdateShape { .. }
            | EngineError::InvalidConfig(_)
            | EngineError::Finalized => ErrorKind::Configuration,
            EngineError::PathNotFound { .. } | EngineError::PathEscapesRoot { .. } => ErrorKind::Path,
            EngineError::ProcessExecution { .. } => ErrorKind::ProcessExecution,
            EngineError::StructuralConflict { .. } => ErrorKind::StructuralConflict,
            EngineError::IoError(_) | EngineError::SerdeError(_) | EngineError::TomlError(_) => {
                ErrorKind::Io
            }
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
