// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Non-blocking job task.
//!
//! A [`JobTask`] owns everything one non-blocking job needs: its copy of the
//! request, its job record, the module and a handle on the reply sender.
//! It runs exactly once and sets its completion flag on every exit path.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::job_store::JobRecord;
use crate::module::{Module, execute_isolated};
use crate::reply::ReplySender;
use crate::request::ActionRequest;
use crate::task_supervisor::CompletionFlag;

/// One non-blocking job, ready to run.
pub struct JobTask {
    module: Arc<dyn Module>,
    request: Arc<ActionRequest>,
    record: JobRecord,
    replies: Arc<ReplySender>,
    done: CompletionFlag,
    start_gate: Option<oneshot::Receiver<()>>,
}

impl JobTask {
    /// Bundle a job for execution.
    pub fn new(
        module: Arc<dyn Module>,
        request: ActionRequest,
        record: JobRecord,
        replies: Arc<ReplySender>,
        done: CompletionFlag,
    ) -> Self {
        Self {
            module,
            request: Arc::new(request),
            record,
            replies,
            done,
            start_gate: None,
        }
    }

    /// Hold execution until `gate` fires (or its sender is dropped).
    pub fn with_start_gate(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.start_gate = Some(gate);
        self
    }

    /// Job identifier.
    pub fn job_id(&self) -> &str {
        self.record.job_id()
    }

    /// Execute the job to completion.
    pub async fn run(self) {
        // Declared first so it drops last, after every other field is released
        let _completion = self.done.guard();
        let JobTask {
            module,
            request,
            record,
            replies,
            done: _,
            start_gate,
        } = self;
        let job_id = record.job_id().to_string();

        if let Some(gate) = start_gate {
            // A dropped sender still means "go"
            let _ = gate.await;
        }

        let started = Instant::now();
        let execution = execute_isolated(module, request.clone()).await;

        match &execution {
            Ok(outcome) => {
                debug!(
                    job_id = %job_id,
                    module = %request.module(),
                    action = %request.action(),
                    "Job action executed"
                );
                if request.notify_outcome() {
                    replies
                        .non_blocking_response(&request, outcome.results(), &job_id)
                        .await;
                }
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    module = %request.module(),
                    action = %request.action(),
                    error = %e,
                    "Job action failed"
                );
                replies.rpc_error(&request, &e.to_string()).await;
            }
        }

        let elapsed = started.elapsed();
        if let Err(e) = record.finalize(&execution, elapsed).await {
            error!(job_id = %job_id, error = %e, "Failed to store job results");
        }

        info!(
            job_id = %job_id,
            duration_ms = elapsed.as_millis() as u64,
            success = execution.is_ok(),
            "Job finished"
        );
    }
}
