//! Error types for verification runs.

use std::path::PathBuf;

use linlog_core::{HistoryError, ParseError};
use thiserror::Error;

/// Failures of the checking engine itself (not verdicts).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn checker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("checker thread exited before reporting every partition")]
    WorkerLost,

    #[error("history rejected by checker: {0}")]
    Rejected(String),
}

/// Visualization rendering errors. Never affect a verdict.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write visualization {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize visualization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that stop a verification run before a verdict exists.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The log held no recognised operations; there is nothing to judge.
    #[error("no events found in log")]
    NoEvents,
}
