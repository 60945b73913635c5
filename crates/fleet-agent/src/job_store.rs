// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job record store.
//!
//! Every non-blocking job owns a directory `{spool_dir}/{job_id}/` holding:
//! - `status` - JSON document with module, action, status, duration, input
//! - `stdout` - module standard output (or the in-process result document)
//! - `stderr` - module standard error, or the execution failure message
//!
//! All three files exist from job start. Records are never deleted here;
//! retention is left to whoever manages the spool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, ProcessingError, RequestError, StorageError};
use crate::outcome::ActionOutcome;
use crate::request::ActionRequest;

/// Status document file name.
pub const STATUS_FILE: &str = "status";
/// Standard output artifact file name.
pub const STDOUT_FILE: &str = "stdout";
/// Standard error artifact file name.
pub const STDERR_FILE: &str = "stderr";

/// Duration recorded when a job starts.
pub const INITIAL_DURATION: &str = "0 s";

/// Input recorded for requests without parameters.
pub const NO_INPUT: &str = "none";

/// Job status as recorded on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The job's task has not finished yet.
    Running,
    /// The job's task finished (successfully or not).
    Completed,
}

/// Contents of the `status` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Module name
    pub module: String,
    /// Action name
    pub action: String,
    /// Running or completed
    pub status: JobState,
    /// Elapsed execution time, e.g. `"0.204 s"`
    pub duration: String,
    /// Serialized request parameters, or `"none"`
    pub input: String,
}

/// Format an elapsed time the way it is stored in the status document.
pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.3} s", elapsed.as_secs_f64())
}

/// Spool root under which job directories live.
#[derive(Debug, Clone)]
pub struct JobStore {
    spool_dir: PathBuf,
}

impl JobStore {
    /// Open the spool, creating the root directory if needed.
    ///
    /// Failing to create the root is fatal for the agent.
    pub async fn open(spool_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let spool_dir = spool_dir.into();

        if !tokio::fs::try_exists(&spool_dir).await.unwrap_or(false) {
            info!(spool_dir = %spool_dir.display(), "Creating spool directory");
            tokio::fs::create_dir_all(&spool_dir).await.map_err(|e| {
                Error::Fatal(format!(
                    "failed to create the results directory '{}': {}",
                    spool_dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self { spool_dir })
    }

    /// Spool root.
    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    /// Directory of a job.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.spool_dir.join(job_id)
    }

    /// Create the directory of a job if it does not exist yet.
    pub async fn create_job_dir(&self, job_id: &str) -> Result<PathBuf, ProcessingError> {
        let dir = self.job_dir(job_id);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            debug!(job_id = %job_id, dir = %dir.display(), "Creating job directory");
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| ProcessingError::JobDirectory {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(dir)
    }

    /// Write the initial record of a job: an empty `stdout` and `stderr` and
    /// a `status` document marked running.
    ///
    /// The job directory must already exist.
    pub async fn initialize(
        &self,
        job_id: &str,
        request: &ActionRequest,
    ) -> Result<JobRecord, StorageError> {
        let input = if request.params_txt().is_empty() {
            NO_INPUT.to_string()
        } else {
            request.params_txt().to_string()
        };

        let record = JobRecord {
            job_id: job_id.to_string(),
            dir: self.job_dir(job_id),
            status: JobStatus {
                module: request.module().to_string(),
                action: request.action().to_string(),
                status: JobState::Running,
                duration: INITIAL_DURATION.to_string(),
                input,
            },
        };

        write_atomic(&record.stdout_path(), "").await?;
        write_atomic(&record.stderr_path(), "").await?;
        record.write_status().await?;

        Ok(record)
    }

    /// Read back the status document of a job.
    pub async fn read_status(&self, job_id: &str) -> Result<JobStatus, StorageError> {
        let path = self.job_dir(job_id).join(STATUS_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| StorageError::Read { path, source })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// The on-disk record of one non-blocking job.
///
/// Owned by the job's task, which is the only writer.
#[derive(Debug)]
pub struct JobRecord {
    job_id: String,
    dir: PathBuf,
    status: JobStatus,
}

impl JobRecord {
    /// Job identifier.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Job directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current in-memory status document.
    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// Path of the `status` file.
    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    /// Path of the `stdout` file.
    pub fn stdout_path(&self) -> PathBuf {
        self.dir.join(STDOUT_FILE)
    }

    /// Path of the `stderr` file.
    pub fn stderr_path(&self) -> PathBuf {
        self.dir.join(STDERR_FILE)
    }

    /// Record the end of the job.
    ///
    /// The status document is always marked completed. On success the
    /// module's output goes to `stdout` (and `stderr` when non-empty); on
    /// failure `stdout` is left as is and the failure message goes to
    /// `stderr`. Consumes the record: a job is finalized at most once.
    pub async fn finalize(
        mut self,
        execution: &std::result::Result<ActionOutcome, RequestError>,
        elapsed: Duration,
    ) -> Result<(), StorageError> {
        self.status.status = JobState::Completed;
        self.status.duration = format_duration(elapsed);
        self.write_status().await?;

        match execution {
            Ok(ActionOutcome::External { stdout, stderr, .. }) => {
                write_atomic(&self.stdout_path(), &format!("{stdout}\n")).await?;
                if !stderr.is_empty() {
                    write_atomic(&self.stderr_path(), &format!("{stderr}\n")).await?;
                }
            }
            Ok(ActionOutcome::Internal { results }) => {
                write_atomic(&self.stdout_path(), &format!("{results}\n")).await?;
            }
            Err(error) => {
                let message = format!(
                    "Failed to execute '{} {}': {}\n",
                    self.status.module, self.status.action, error
                );
                write_atomic(&self.stderr_path(), &message).await?;
            }
        }

        debug!(
            job_id = %self.job_id,
            duration = %self.status.duration,
            failed = execution.is_err(),
            "Job record finalized"
        );
        Ok(())
    }

    async fn write_status(&self) -> Result<(), StorageError> {
        let mut content = serde_json::to_string(&self.status)?;
        content.push('\n');
        write_atomic(&self.status_path(), &content).await
    }
}

/// Replace `path` with `contents` through a temporary sibling and a rename,
/// so readers never observe a partially written file.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let to_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&tmp, contents).await.map_err(to_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(to_err)
}
