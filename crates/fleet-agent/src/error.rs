// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for fleet-agent.
//!
//! Each stage of request handling has its own error type so the dispatcher
//! can decide, by matching, whether a failure becomes an RPC error reply,
//! a failed provisional reply, or only a log line.

use std::path::PathBuf;

use thiserror::Error;

/// The action could not be executed as requested.
///
/// Raised by [`Module`](crate::module::Module) implementations. Always
/// answered with an RPC error reply and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestError {
    /// No module with this name is known to the agent.
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    /// The module does not implement the requested action.
    #[error("no such action '{action}' for module '{module}'")]
    UnknownAction {
        /// Module name.
        module: String,
        /// Requested action.
        action: String,
    },

    /// The request parameters were rejected by the module.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The module process exited with a non-zero code.
    #[error("exit code {exit_code}: {stderr}")]
    ExitCode {
        /// Exit code of the module process (-1 when killed by a signal).
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The module produced output that is not a valid result document.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// The module could not be invoked or failed while running.
    #[error("{0}")]
    Execution(String),
}

/// Infrastructure failure while preparing a non-blocking job.
///
/// Occurs before any provisional reply is promised, so it is answered with
/// an RPC error reply just like a [`RequestError`].
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The per-job results directory could not be created.
    #[error("failed to create directory '{}': {source}", path.display())]
    JobDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure reading or writing a job record artifact.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing an artifact failed.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading an artifact failed.
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The status document could not be (de)serialized.
    #[error("invalid status document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the request dispatcher's top-level handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Module execution failed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Job preparation failed.
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

/// Crate-level errors (startup and configuration).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unrecoverable startup failure.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Result type using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
