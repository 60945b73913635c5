// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for fleet-agent integration tests.
//!
//! Provides TestAgent: a request processor over a temporary spool root,
//! replying through a MockConnector.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use fleet_agent::connector::{MessageType, MockConnector, SentMessage};
use fleet_agent::processor::{JobIdGenerator, RequestProcessor, RequestProcessorBuilder};
use fleet_agent::request::{ActionRequest, RequestType};

pub const SENDER: &str = "ctl";

/// Processor plus the mock transport and spool it writes to.
pub struct TestAgent {
    pub processor: RequestProcessor,
    pub connector: MockConnector,
    pub spool_dir: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestAgent {
    /// Agent with a connector that accepts everything.
    pub async fn new() -> Self {
        Self::with_connector(MockConnector::new()).await
    }

    /// Agent replying through `connector`.
    pub async fn with_connector(connector: MockConnector) -> Self {
        Self::build(connector, |builder| builder).await
    }

    /// Agent that hands out `job_id` to every non-blocking request.
    pub async fn with_fixed_job_id(job_id: &str) -> Self {
        let job_id = job_id.to_string();
        let job_ids: JobIdGenerator = Arc::new(move || job_id.clone());
        Self::build(MockConnector::new(), |builder| builder.job_id_generator(job_ids)).await
    }

    async fn build<F>(connector: MockConnector, customize: F) -> Self
    where
        F: FnOnce(RequestProcessorBuilder) -> RequestProcessorBuilder,
    {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let spool_dir = temp_dir.path().join("spool");

        let builder = RequestProcessor::builder()
            .connector(Arc::new(connector.clone()))
            .spool_dir(&spool_dir)
            .message_timeout(Duration::from_secs(5))
            .reclaim_interval(Duration::from_millis(20));
        let processor = customize(builder)
            .build()
            .await
            .expect("Failed to build processor");

        Self {
            processor,
            connector,
            spool_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Wait for every job and return what is left to inspect.
    pub async fn finish(self) -> FinishedAgent {
        self.processor.shutdown().await;
        FinishedAgent {
            connector: self.connector,
            spool_dir: self.spool_dir,
            _temp_dir: self._temp_dir,
        }
    }
}

/// State of an agent after shutdown.
pub struct FinishedAgent {
    pub connector: MockConnector,
    pub spool_dir: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl FinishedAgent {
    pub fn job_file(&self, job_id: &str, file: &str) -> String {
        read_job_file(&self.spool_dir, job_id, file)
    }
}

pub fn read_job_file(spool_dir: &Path, job_id: &str, file: &str) -> String {
    std::fs::read_to_string(spool_dir.join(job_id).join(file))
        .unwrap_or_else(|e| panic!("Failed to read {}/{}: {}", job_id, file, e))
}

/// Names of the entries under the spool root.
pub fn spool_entries(spool_dir: &Path) -> Vec<String> {
    std::fs::read_dir(spool_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

pub fn blocking(module: &str, action: &str) -> ActionRequest {
    ActionRequest::new(RequestType::Blocking, "m1", "t1", SENDER, module, action)
}

pub fn non_blocking(module: &str, action: &str) -> ActionRequest {
    ActionRequest::new(RequestType::NonBlocking, "m1", "t1", SENDER, module, action)
}

/// Job id promised by the single provisional response.
pub fn provisional_job_id(connector: &MockConnector) -> String {
    let provisional = connector.sent_of(MessageType::ProvisionalResponse);
    assert_eq!(provisional.len(), 1, "expected exactly one provisional response");
    provisional[0].data["job_id"]
        .as_str()
        .expect("job_id must be a string")
        .to_string()
}

pub fn message_types(sent: &[SentMessage]) -> Vec<MessageType> {
    sent.iter().map(|m| m.message_type).collect()
}

pub fn description(message: &SentMessage) -> &str {
    message.data["description"].as_str().unwrap_or_default()
}

pub fn results(message: &SentMessage) -> &Value {
    &message.data["results"]
}
