// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connector trait definitions.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Transport failure while sending a message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The connection to the broker is not established.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// The message could not be written to the transport.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Kinds of message the agent sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Bus-level error for a request that could not be parsed.
    CoreError,
    /// RPC-level error for a request that could not be executed.
    RpcError,
    /// Immediate acknowledgment of a non-blocking request.
    ProvisionalResponse,
    /// Results of a blocking request.
    BlockingResponse,
    /// Results of a completed non-blocking job.
    NonBlockingResponse,
}

impl MessageType {
    /// Wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::CoreError => "core_error",
            MessageType::RpcError => "rpc_error",
            MessageType::ProvisionalResponse => "provisional_response",
            MessageType::BlockingResponse => "blocking_response",
            MessageType::NonBlockingResponse => "non_blocking_response",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message-bus connection used to deliver replies.
///
/// Framing, TLS and envelope validation belong to the implementation.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Send one message to every address in `targets`.
    async fn send(
        &self,
        targets: &[String],
        message_type: MessageType,
        timeout: Duration,
        data: Value,
        debug: Vec<Value>,
    ) -> Result<()>;
}
