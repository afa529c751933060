//! Error types and exit classification for collaborator processes.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// How a collaborator process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitCode {
    Success,
    /// Non-zero exit status
    Failure(i32),
    /// Killed by a signal (no status code)
    Signaled,
}

impl ExitCode {
    /// Convert from the raw status code reported by the OS.
    pub fn from_raw(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitCode::Success,
            Some(code) => ExitCode::Failure(code),
            None => ExitCode::Signaled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

/// Errors that can occur while running a collaborator process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{name} is not installed. Put it in ~/.kcmc/bin or on PATH, or pass its path explicitly")]
    NotInstalled { name: String },

    #[error("{path} does not exist")]
    MissingBinary { path: PathBuf },

    #[error("failed to start {name}: {source}")]
    Start {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} failed with exit code {exit_code:?}: {message}")]
    Failed {
        name: String,
        exit_code: ExitCode,
        message: String,
    },

    #[error("{name} timed out after {seconds} seconds")]
    Timeout { name: String, seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProcessResult<T> = Result<T, ProcessError>;
