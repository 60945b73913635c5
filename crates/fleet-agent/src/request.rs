// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action requests.
//!
//! An [`ActionRequest`] is built by the envelope parser before it reaches
//! the core and is never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How the caller wants to receive the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Caller waits for a single reply carrying the results.
    Blocking,
    /// Caller receives a job id now and (optionally) the results later.
    NonBlocking,
}

impl RequestType {
    /// Name used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Blocking => "blocking",
            RequestType::NonBlocking => "non-blocking",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed action invocation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    id: String,
    transaction_id: String,
    sender: String,
    module: String,
    action: String,
    params: Option<Value>,
    params_txt: String,
    request_type: RequestType,
    notify_outcome: bool,
    debug: Vec<String>,
}

impl ActionRequest {
    /// Create a request with no parameters, no debug chunks and
    /// `notify_outcome` unset.
    pub fn new(
        request_type: RequestType,
        id: impl Into<String>,
        transaction_id: impl Into<String>,
        sender: impl Into<String>,
        module: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            transaction_id: transaction_id.into(),
            sender: sender.into(),
            module: module.into(),
            action: action.into(),
            params: None,
            params_txt: String::new(),
            request_type,
            notify_outcome: false,
            debug: Vec::new(),
        }
    }

    /// Attach the action parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params_txt = params.to_string();
        self.params = Some(params);
        self
    }

    /// Ask for a non-blocking response once the job completes.
    pub fn with_notify_outcome(mut self, notify: bool) -> Self {
        self.notify_outcome = notify;
        self
    }

    /// Attach raw debug chunks as received on the wire.
    pub fn with_debug(mut self, chunks: Vec<String>) -> Self {
        self.debug = chunks;
        self
    }

    /// Parse the newline-delimited wire form used by the stdin driver.
    pub fn from_json(line: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(line).map_err(|e| ParseError {
            id: None,
            sender: None,
            reason: e.to_string(),
        })?;

        // Keep whatever addressing is present so the caller can still reply
        let id = value.get("id").and_then(Value::as_str).map(str::to_string);
        let sender = value
            .get("sender")
            .and_then(Value::as_str)
            .map(str::to_string);

        let wire: WireRequest = serde_json::from_value(value).map_err(|e| ParseError {
            id: id.clone(),
            sender: sender.clone(),
            reason: e.to_string(),
        })?;

        let mut request = ActionRequest::new(
            wire.request_type,
            wire.id,
            wire.transaction_id,
            wire.sender,
            wire.module,
            wire.action,
        )
        .with_notify_outcome(wire.notify_outcome)
        .with_debug(wire.debug);

        if let Some(params) = wire.params {
            request = request.with_params(params);
        }
        Ok(request)
    }

    /// Message id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Transaction id chosen by the caller.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Address replies are sent to.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Target module name.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Action name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Structured parameters, if any.
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    /// Serialized parameters; empty when the request carries none.
    pub fn params_txt(&self) -> &str {
        &self.params_txt
    }

    /// Blocking or non-blocking.
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Whether a non-blocking response is wanted on completion.
    pub fn notify_outcome(&self) -> bool {
        self.notify_outcome
    }

    /// Raw debug chunks, possibly malformed.
    pub fn debug_chunks(&self) -> &[String] {
        &self.debug
    }
}

/// Wire form of a request.
#[derive(Debug, Deserialize)]
struct WireRequest {
    id: String,
    transaction_id: String,
    sender: String,
    module: String,
    action: String,
    #[serde(rename = "type")]
    request_type: RequestType,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    notify_outcome: bool,
    #[serde(default)]
    debug: Vec<String>,
}

/// A request line that could not be turned into an [`ActionRequest`].
#[derive(Debug, Error)]
#[error("invalid request: {reason}")]
pub struct ParseError {
    /// Request id, when it could be recovered.
    pub id: Option<String>,
    /// Sender address, when it could be recovered.
    pub sender: Option<String>,
    /// What was wrong with the line.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_txt_tracks_params() {
        let request = ActionRequest::new(RequestType::Blocking, "1", "t1", "ctl", "facts", "get");
        assert!(request.params_txt().is_empty());
        assert!(request.params().is_none());

        let request = request.with_params(json!({"verbose": true}));
        assert_eq!(request.params_txt(), r#"{"verbose":true}"#);
    }

    #[test]
    fn test_parse_wire_request() {
        let line = r#"{"id":"m1","transaction_id":"t1","sender":"ctl://a","module":"facts",
            "action":"get","type":"non_blocking","notify_outcome":true,
            "params":{"a":1},"debug":["{\"hops\":[]}","not json"]}"#;
        let request = ActionRequest::from_json(line).unwrap();

        assert_eq!(request.request_type(), RequestType::NonBlocking);
        assert!(request.notify_outcome());
        assert_eq!(request.sender(), "ctl://a");
        assert_eq!(request.params(), Some(&json!({"a": 1})));
        assert_eq!(request.debug_chunks().len(), 2);
    }

    #[test]
    fn test_parse_error_keeps_addressing() {
        let line = r#"{"id":"m2","sender":"ctl://b","module":"facts"}"#;
        let err = ActionRequest::from_json(line).unwrap_err();

        assert_eq!(err.id.as_deref(), Some("m2"));
        assert_eq!(err.sender.as_deref(), Some("ctl://b"));
    }

    #[test]
    fn test_parse_error_on_garbage() {
        let err = ActionRequest::from_json("{{{").unwrap_err();
        assert!(err.id.is_none());
        assert!(err.to_string().starts_with("invalid request"));
    }

    #[test]
    fn test_request_type_names() {
        assert_eq!(RequestType::Blocking.to_string(), "blocking");
        assert_eq!(RequestType::NonBlocking.to_string(), "non-blocking");
    }
}
