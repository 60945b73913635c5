// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! External modules.
//!
//! An external module is an executable invoked as `<program> [args..] <action>`.
//! The serialized request parameters are written to its standard input and
//! its standard output must be empty or a single JSON document.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::traits::{Module, Result};
use crate::error::RequestError;
use crate::outcome::ActionOutcome;
use crate::request::ActionRequest;

/// A module backed by an executable on disk.
#[derive(Debug, Clone)]
pub struct ExternalModule {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalModule {
    /// Module executed directly from `program`.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Module executed through an interpreter, e.g. `sh -c <script> <name>`.
    ///
    /// The action name is appended after `args`.
    pub fn with_command(
        name: impl Into<String>,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    /// Path of the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Module for ExternalModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionOutcome> {
        debug!(
            module = %self.name,
            action = %request.action(),
            program = %self.program.display(),
            "Executing external module"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(request.action())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RequestError::Execution(format!(
                    "failed to start '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A module that never reads its input closes the pipe early
            if let Err(e) = stdin.write_all(request.params_txt().as_bytes()).await {
                debug!(module = %self.name, error = %e, "Module did not consume its input");
            }
        }

        let output = child.wait_with_output().await.map_err(|e| {
            RequestError::Execution(format!("failed to wait for '{}': {}", self.name, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(
                module = %self.name,
                action = %request.action(),
                exit_code = exit_code,
                "External module failed"
            );
            return Err(RequestError::ExitCode { exit_code, stderr });
        }

        let results = if stdout.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&stdout).map_err(|e| {
                RequestError::InvalidOutput(format!(
                    "'{} {}' did not print a JSON document: {}",
                    self.name,
                    request.action(),
                    e
                ))
            })?
        };

        Ok(ActionOutcome::External {
            exit_code: 0,
            stdout,
            stderr,
            results,
        })
    }
}
