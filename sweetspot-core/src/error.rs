// ============================================================================
// sweetspot-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Core Error Types and Constructors
//
// Failures that a caller has to react to live here. Expected, data-shaped
// outcomes (a failed trial, an infeasible preset, a cancelled run) are NOT
// errors and are modelled as values in their own modules.

use std::process::ExitStatus;
use thiserror::Error;

/// Errors produced by the sweetspot core library.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start {0}: {1}")]
    CommandStart(String, #[source] std::io::Error),

    #[error("Failed waiting for {0}: {1}")]
    CommandWait(String, #[source] std::io::Error),

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Required dependency '{0}' not found")]
    DependencyNotFound(String),

    #[error("ffprobe output could not be parsed: {0}")]
    FfprobeParse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown codec '{0}'")]
    UnknownCodec(String),

    #[error("Invalid advanced option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("Invalid sample window: {0}")]
    InvalidWindow(String),

    #[error("Failed to initialize thread pool: {0}")]
    ThreadPool(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result alias used throughout the core library.
pub type CoreResult<T> = Result<T, CoreError>;

pub fn command_start_error(command: impl Into<String>, err: std::io::Error) -> CoreError {
    CoreError::CommandStart(command.into(), err)
}

pub fn command_wait_error(command: impl Into<String>, err: std::io::Error) -> CoreError {
    CoreError::CommandWait(command.into(), err)
}

pub fn command_failed_error(
    command: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed {
        command: command.into(),
        status,
        stderr: stderr.into(),
    }
}
