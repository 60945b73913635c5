// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request dispatcher.
//!
//! [`RequestProcessor`] receives parsed requests and either executes them
//! inline (blocking) or turns them into spooled jobs run by the
//! [`TaskSupervisor`] (non-blocking).
//!
//! # Reply rules
//!
//! | Situation | Reply |
//! |-----------|-------|
//! | blocking, module succeeded | blocking response |
//! | blocking, module failed | RPC error |
//! | non-blocking, job directory not created | RPC error |
//! | non-blocking, record/task could not start | provisional response, `success: false` |
//! | non-blocking, job started | provisional response, `success: true` |
//! | job finished, `notify_outcome` set | non-blocking response |
//! | job failed | RPC error (no non-blocking response) |
//!
//! ```rust,ignore
//! let processor = RequestProcessor::builder()
//!     .connector(Arc::new(StdoutConnector::new()))
//!     .spool_dir("/var/spool/fleet-agent")
//!     .build()
//!     .await?;
//!
//! processor.process(module, &request).await;
//! processor.shutdown().await;
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{Config, DEFAULT_MESSAGE_TIMEOUT, DEFAULT_RECLAIM_INTERVAL, DEFAULT_SPOOL_DIR};
use crate::connector::Connector;
use crate::error::{DispatchError, Error, Result};
use crate::job_store::JobStore;
use crate::module::{Module, execute_isolated};
use crate::reply::ReplySender;
use crate::request::{ActionRequest, RequestType};
use crate::task_runner::JobTask;
use crate::task_supervisor::{CompletionFlag, TaskSupervisor};

/// Name of the supervisor running non-blocking jobs.
const SUPERVISOR_NAME: &str = "Action Executer";

/// Produces a fresh identifier for every non-blocking job.
pub type JobIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

fn uuid_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builder for creating a [`RequestProcessor`].
pub struct RequestProcessorBuilder {
    connector: Option<Arc<dyn Connector>>,
    spool_dir: PathBuf,
    message_timeout: Duration,
    reclaim_interval: Duration,
    job_ids: JobIdGenerator,
}

impl Default for RequestProcessorBuilder {
    fn default() -> Self {
        Self {
            connector: None,
            spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            reclaim_interval: DEFAULT_RECLAIM_INTERVAL,
            job_ids: Arc::new(uuid_job_id),
        }
    }
}

impl RequestProcessorBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take spool, timeout and sweep settings from a [`Config`].
    pub fn config(self, config: &Config) -> Self {
        self.spool_dir(config.spool_dir.clone())
            .message_timeout(config.message_timeout)
            .reclaim_interval(config.reclaim_interval)
    }

    /// Set the connector used for every reply (required).
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the spool root.
    ///
    /// Default: `.spool`
    pub fn spool_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.spool_dir = path.into();
        self
    }

    /// Set the timeout attached to replies.
    ///
    /// Default: 10 seconds
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    /// Set the background reclaim period.
    ///
    /// Default: 1 second
    pub fn reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Set how job identifiers are generated.
    ///
    /// Default: random UUID v4
    pub fn job_id_generator(mut self, job_ids: JobIdGenerator) -> Self {
        self.job_ids = job_ids;
        self
    }

    /// Create the spool root and start the background sweeper.
    ///
    /// Fails with [`Error::Fatal`] when the spool root cannot be created.
    pub async fn build(self) -> Result<RequestProcessor> {
        let connector = self
            .connector
            .ok_or_else(|| Error::Fatal("connector is required".to_string()))?;

        let store = JobStore::open(self.spool_dir).await?;
        let replies = Arc::new(ReplySender::new(connector, self.message_timeout));
        let supervisor = Arc::new(TaskSupervisor::new(SUPERVISOR_NAME));

        let sweeper = {
            let supervisor = supervisor.clone();
            let interval = self.reclaim_interval;
            tokio::spawn(async move { supervisor.run_sweeper(interval).await })
        };

        info!(
            spool_dir = %store.spool_dir().display(),
            message_timeout_secs = self.message_timeout.as_secs(),
            "Request processor started"
        );

        Ok(RequestProcessor {
            store,
            replies,
            supervisor,
            sweeper: Mutex::new(Some(sweeper)),
            job_ids: self.job_ids,
        })
    }
}

/// Dispatches action requests and replies to their senders.
pub struct RequestProcessor {
    store: JobStore,
    replies: Arc<ReplySender>,
    supervisor: Arc<TaskSupervisor>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    job_ids: JobIdGenerator,
}

impl RequestProcessor {
    /// Create a new builder for configuring the processor.
    pub fn builder() -> RequestProcessorBuilder {
        RequestProcessorBuilder::new()
    }

    /// Job record store.
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Reply sender, e.g. for core errors raised before dispatch.
    pub fn replies(&self) -> &Arc<ReplySender> {
        &self.replies
    }

    /// Number of non-blocking jobs not yet reclaimed.
    pub fn active_jobs(&self) -> usize {
        self.supervisor.active_count()
    }

    /// Handle one request.
    ///
    /// Every failure that occurs before a reply was promised is answered
    /// with exactly one RPC error; nothing is retried.
    pub async fn process(&self, module: Arc<dyn Module>, request: &ActionRequest) {
        let result = match request.request_type() {
            RequestType::Blocking => self.process_blocking(module, request).await,
            RequestType::NonBlocking => self.process_non_blocking(module, request).await,
        };

        if let Err(e) = result {
            error!(
                request_type = %request.request_type(),
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                module = %request.module(),
                action = %request.action(),
                error = %e,
                "Failed to process request"
            );
            self.replies.rpc_error(request, &e.to_string()).await;
        }
    }

    async fn process_blocking(
        &self,
        module: Arc<dyn Module>,
        request: &ActionRequest,
    ) -> std::result::Result<(), DispatchError> {
        let outcome = execute_isolated(module, Arc::new(request.clone())).await?;
        self.replies
            .blocking_response(request, outcome.results())
            .await;
        Ok(())
    }

    async fn process_non_blocking(
        &self,
        module: Arc<dyn Module>,
        request: &ActionRequest,
    ) -> std::result::Result<(), DispatchError> {
        let job_id = (self.job_ids)();

        debug!(
            job_id = %job_id,
            module = %request.module(),
            action = %request.action(),
            transaction_id = %request.transaction_id(),
            "Creating results directory"
        );
        self.store.create_job_dir(&job_id).await?;

        debug!(
            job_id = %job_id,
            request_id = %request.id(),
            sender = %request.sender(),
            transaction_id = %request.transaction_id(),
            "Starting '{} {}' job",
            request.module(),
            request.action()
        );

        // The job id is promised from here on: failures go in the provisional reply
        let (gate_tx, gate_rx) = oneshot::channel();
        let start_error = self.start_job(module, request, &job_id, gate_rx).await;

        self.replies
            .provisional_response(request, &job_id, start_error.as_deref())
            .await;

        // Receiver is gone when the job never started
        let _ = gate_tx.send(());
        Ok(())
    }

    /// Initialize the job record and hand the job to the supervisor.
    /// Returns the failure description when the job could not start.
    async fn start_job(
        &self,
        module: Arc<dyn Module>,
        request: &ActionRequest,
        job_id: &str,
        gate: oneshot::Receiver<()>,
    ) -> Option<String> {
        let record = match self.store.initialize(job_id, request).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    job_id = %job_id,
                    module = %request.module(),
                    action = %request.action(),
                    error = %e,
                    "Failed to initialize result files"
                );
                return Some(format!("failed to initialize result files: {e}"));
            }
        };

        let done = CompletionFlag::new();
        let task = JobTask::new(
            module,
            request.clone(),
            record,
            self.replies.clone(),
            done.clone(),
        )
        .with_start_gate(gate);

        match self.supervisor.spawn(job_id, done, task.run()) {
            Ok(()) => None,
            Err(e) => {
                error!(
                    job_id = %job_id,
                    module = %request.module(),
                    action = %request.action(),
                    error = %e,
                    "Failed to spawn action job"
                );
                Some(format!("failed to start action task: {e}"))
            }
        }
    }

    /// Stop accepting jobs and wait for every outstanding job to finish.
    ///
    /// Non-blocking requests processed afterwards are acknowledged with a
    /// failed provisional response.
    pub async fn shutdown(&self) {
        info!("Request processor shutting down...");

        self.supervisor.shutdown().await;

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                error!("Task sweeper panicked: {}", e);
            }
        }

        info!("Request processor shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default_values() {
        let builder = RequestProcessorBuilder::default();

        assert!(builder.connector.is_none());
        assert_eq!(builder.spool_dir, PathBuf::from(".spool"));
        assert_eq!(builder.message_timeout, Duration::from_secs(10));
        assert_eq!(builder.reclaim_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_builder_from_config() {
        let config = Config {
            spool_dir: PathBuf::from("/var/spool/agent"),
            modules_dir: None,
            message_timeout: Duration::from_secs(3),
            reclaim_interval: Duration::from_millis(100),
        };

        let builder = RequestProcessorBuilder::new().config(&config);

        assert_eq!(builder.spool_dir, PathBuf::from("/var/spool/agent"));
        assert_eq!(builder.message_timeout, Duration::from_secs(3));
        assert_eq!(builder.reclaim_interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_build_fails_without_connector() {
        let result = RequestProcessorBuilder::new().build().await;

        match result {
            Err(Error::Fatal(msg)) => assert!(msg.contains("connector is required")),
            _ => panic!("expected a fatal error"),
        }
    }
}
