// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reply sender.
//!
//! Builds the outbound messages and hands them to the [`Connector`].
//! Transport failures are logged with full addressing context and dropped:
//! every reply gets at most one delivery attempt and no error ever reaches
//! the caller.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::connector::{Connector, MessageType};
use crate::request::ActionRequest;

/// Data of a bus-level error.
#[derive(Debug, Serialize)]
struct CoreErrorData<'a> {
    id: &'a str,
    description: &'a str,
}

/// Data of an RPC error.
#[derive(Debug, Serialize)]
struct RpcErrorData<'a> {
    transaction_id: &'a str,
    id: &'a str,
    description: &'a str,
}

/// Data of a blocking response.
#[derive(Debug, Serialize)]
struct BlockingResponseData<'a> {
    transaction_id: &'a str,
    results: &'a Value,
}

/// Data of a provisional response.
#[derive(Debug, Serialize)]
struct ProvisionalResponseData<'a> {
    transaction_id: &'a str,
    success: bool,
    job_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Data of a non-blocking response.
#[derive(Debug, Serialize)]
struct NonBlockingResponseData<'a> {
    transaction_id: &'a str,
    job_id: &'a str,
    results: &'a Value,
}

/// Parse the request's debug chunks, skipping malformed ones.
pub fn debug_payload(request: &ActionRequest) -> Vec<Value> {
    let mut invalid = 0usize;
    let debug: Vec<Value> = request
        .debug_chunks()
        .iter()
        .filter_map(|chunk| match serde_json::from_str(chunk) {
            Ok(value) => Some(value),
            Err(_) => {
                invalid += 1;
                None
            }
        })
        .collect();

    if invalid > 0 {
        warn!(
            request_id = %request.id(),
            "Message {} contained {} bad debug chunk{}",
            request.id(),
            invalid,
            if invalid == 1 { "" } else { "s" }
        );
    }
    debug
}

/// Sends the agent's replies through a connector.
pub struct ReplySender {
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl ReplySender {
    /// Create a reply sender using `timeout` for every message.
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    /// Timeout attached to every message.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Serialize `data` and make a single delivery attempt.
    async fn deliver<T: Serialize>(
        &self,
        targets: &[String],
        message_type: MessageType,
        data: &T,
        debug: Vec<Value>,
    ) -> Result<(), String> {
        let data = serde_json::to_value(data).map_err(|e| e.to_string())?;
        self.connector
            .send(targets, message_type, self.timeout, data, debug)
            .await
            .map_err(|e| e.to_string())
    }

    /// Report a request that could not even be parsed.
    pub async fn core_error(&self, request_id: &str, description: &str, endpoints: &[String]) {
        let data = CoreErrorData {
            id: request_id,
            description,
        };

        match self
            .deliver(endpoints, MessageType::CoreError, &data, Vec::new())
            .await
        {
            Ok(()) => info!(
                request_id = %request_id,
                "Replied to request with a core error message"
            ),
            Err(e) => error!(
                request_id = %request_id,
                endpoints = ?endpoints,
                error = %e,
                "Failed to send core error message"
            ),
        }
    }

    /// Report a request whose action could not be executed.
    pub async fn rpc_error(&self, request: &ActionRequest, description: &str) {
        let data = RpcErrorData {
            transaction_id: request.transaction_id(),
            id: request.id(),
            description,
        };
        let targets = [request.sender().to_string()];

        match self
            .deliver(&targets, MessageType::RpcError, &data, Vec::new())
            .await
        {
            Ok(()) => info!(
                request_type = %request.request_type(),
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                "Replied to request with an RPC error message"
            ),
            Err(e) => error!(
                request_type = %request.request_type(),
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                description = %description,
                error = %e,
                "Failed to send RPC error message (no further sending attempts)"
            ),
        }
    }

    /// Send the results of a blocking request.
    pub async fn blocking_response(&self, request: &ActionRequest, results: &Value) {
        let data = BlockingResponseData {
            transaction_id: request.transaction_id(),
            results,
        };
        let targets = [request.sender().to_string()];
        let debug = debug_payload(request);

        match self
            .deliver(&targets, MessageType::BlockingResponse, &data, debug)
            .await
        {
            Ok(()) => info!(
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                "Sent response for blocking request"
            ),
            Err(e) => error!(
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                error = %e,
                "Failed to reply to blocking request"
            ),
        }
    }

    /// Acknowledge a non-blocking request. `error` is `None` when the job
    /// was started.
    pub async fn provisional_response(
        &self,
        request: &ActionRequest,
        job_id: &str,
        error: Option<&str>,
    ) {
        let data = ProvisionalResponseData {
            transaction_id: request.transaction_id(),
            success: error.is_none(),
            job_id,
            error,
        };
        let targets = [request.sender().to_string()];
        let debug = debug_payload(request);

        match self
            .deliver(&targets, MessageType::ProvisionalResponse, &data, debug)
            .await
        {
            Ok(()) => info!(
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                job_id = %job_id,
                "Sent provisional response"
            ),
            Err(e) => error!(
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                job_id = %job_id,
                error = %e,
                "Failed to send provisional response (no further attempts)"
            ),
        }
    }

    /// Send the results of a completed non-blocking job.
    ///
    /// Debug chunks were already delivered with the provisional response.
    pub async fn non_blocking_response(&self, request: &ActionRequest, results: &Value, job_id: &str) {
        let data = NonBlockingResponseData {
            transaction_id: request.transaction_id(),
            job_id,
            results,
        };
        let targets = [request.sender().to_string()];

        match self
            .deliver(&targets, MessageType::NonBlockingResponse, &data, Vec::new())
            .await
        {
            Ok(()) => info!(
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                job_id = %job_id,
                "Sent response for non-blocking request"
            ),
            Err(e) => error!(
                request_id = %request.id(),
                sender = %request.sender(),
                transaction_id = %request.transaction_id(),
                job_id = %job_id,
                error = %e,
                "Failed to reply to non-blocking request (no further attempts)"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MockConnector;
    use crate::request::RequestType;
    use serde_json::json;

    fn sender(connector: &MockConnector) -> ReplySender {
        ReplySender::new(Arc::new(connector.clone()), Duration::from_secs(7))
    }

    fn request() -> ActionRequest {
        ActionRequest::new(RequestType::NonBlocking, "m1", "t1", "ctl://a", "facts", "get")
            .with_debug(vec![
                r#"{"hops":[1]}"#.to_string(),
                "garbage".to_string(),
                "{".to_string(),
            ])
    }

    #[test]
    fn test_debug_payload_skips_malformed() {
        let debug = debug_payload(&request());
        assert_eq!(debug, vec![json!({"hops": [1]})]);
    }

    #[tokio::test]
    async fn test_provisional_response_fields() {
        let connector = MockConnector::new();

        sender(&connector)
            .provisional_response(&request(), "job-1", None)
            .await;
        sender(&connector)
            .provisional_response(&request(), "job-2", Some("failed to start action task"))
            .await;

        let sent = connector.sent_of(MessageType::ProvisionalResponse);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].targets, vec!["ctl://a".to_string()]);
        assert_eq!(sent[0].timeout, Duration::from_secs(7));
        assert_eq!(
            sent[0].data,
            json!({"transaction_id": "t1", "success": true, "job_id": "job-1"})
        );
        assert_eq!(sent[0].debug, vec![json!({"hops": [1]})]);
        assert_eq!(
            sent[1].data,
            json!({
                "transaction_id": "t1",
                "success": false,
                "job_id": "job-2",
                "error": "failed to start action task"
            })
        );
    }

    #[tokio::test]
    async fn test_non_blocking_response_has_no_debug() {
        let connector = MockConnector::new();

        sender(&connector)
            .non_blocking_response(&request(), &json!({"os": "linux"}), "job-1")
            .await;

        let sent = connector.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_type, MessageType::NonBlockingResponse);
        assert!(sent[0].debug.is_empty());
        assert_eq!(
            sent[0].data,
            json!({"transaction_id": "t1", "job_id": "job-1", "results": {"os": "linux"}})
        );
    }

    #[tokio::test]
    async fn test_rpc_error_and_core_error_fields() {
        let connector = MockConnector::new();
        let replies = sender(&connector);

        replies.rpc_error(&request(), "no such action").await;
        replies
            .core_error("m9", "invalid request", &["ctl://b".to_string()])
            .await;

        let rpc = connector.sent_of(MessageType::RpcError);
        assert_eq!(
            rpc[0].data,
            json!({"transaction_id": "t1", "id": "m1", "description": "no such action"})
        );
        let core = connector.sent_of(MessageType::CoreError);
        assert_eq!(core[0].targets, vec!["ctl://b".to_string()]);
        assert_eq!(core[0].data, json!({"id": "m9", "description": "invalid request"}));
    }

    #[tokio::test]
    async fn test_transport_failure_is_swallowed() {
        let connector = MockConnector::failing();
        let replies = sender(&connector);

        replies.blocking_response(&request(), &json!({})).await;
        replies.rpc_error(&request(), "boom").await;

        // One attempt each, nothing retried
        assert_eq!(connector.attempts(), 2);
        assert!(connector.sent().is_empty());
    }
}
