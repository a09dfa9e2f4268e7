//! Error type for the engine's public boundaries.
//!
//! Action failures are not errors: the executor records them on the action
//! itself. `EngineError` only covers inputs that violate a contract and I/O
//! around loading snapshots and settings.

use std::path::PathBuf;

use thiserror::Error;

use crate::actions::ActionStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("action {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: usize,
        from: ActionStatus,
        to: ActionStatus,
    },

    /// Returned by [`Scanner`](crate::Scanner) implementations that probe
    /// the machine directly and could not produce a snapshot.
    #[error("scanner failed: {0}")]
    Scan(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(what: impl Into<String>, source: serde_json::Error) -> Self {
        EngineError::Parse {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
