// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock connector for testing.
//!
//! Records every message it is asked to send and can be told to fail,
//! either for every message or for a single message type.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::*;

/// A message captured by [`MockConnector`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Destination addresses.
    pub targets: Vec<String>,
    /// Message kind.
    pub message_type: MessageType,
    /// Timeout the sender asked for.
    pub timeout: Duration,
    /// Data payload.
    pub data: Value,
    /// Debug payload.
    pub debug: Vec<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<SentMessage>,
    attempts: usize,
}

/// Mock connector for testing.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    /// If true, every send fails
    pub fail_all: bool,
    /// If set, sends of this message type fail
    pub fail_on: Option<MessageType>,
}

impl MockConnector {
    /// Connector that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose every send fails.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Connector that fails only for `message_type`.
    pub fn failing_on(message_type: MessageType) -> Self {
        Self {
            fail_on: Some(message_type),
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Messages delivered so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Delivered messages of one type.
    pub fn sent_of(&self, message_type: MessageType) -> Vec<SentMessage> {
        self.state()
            .sent
            .iter()
            .filter(|m| m.message_type == message_type)
            .cloned()
            .collect()
    }

    /// Number of send attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state().attempts
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn send(
        &self,
        targets: &[String],
        message_type: MessageType,
        timeout: Duration,
        data: Value,
        debug: Vec<Value>,
    ) -> Result<()> {
        let mut state = self.state();
        state.attempts += 1;

        if self.fail_all || self.fail_on == Some(message_type) {
            return Err(ConnectionError::NotConnected(format!(
                "mock connector refused {}",
                message_type
            )));
        }

        state.sent.push(SentMessage {
            targets: targets.to_vec(),
            message_type,
            timeout,
            data,
            debug,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_records_messages() {
        let connector = MockConnector::new();

        connector
            .send(
                &["ctl".to_string()],
                MessageType::RpcError,
                Duration::from_secs(1),
                json!({"id": "1"}),
                Vec::new(),
            )
            .await
            .unwrap();

        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.sent_of(MessageType::RpcError).len(), 1);
        assert!(connector.sent_of(MessageType::CoreError).is_empty());
    }

    #[tokio::test]
    async fn test_mock_failing_on_one_type() {
        let connector = MockConnector::failing_on(MessageType::ProvisionalResponse);
        let targets = ["ctl".to_string()];

        let refused = connector
            .send(
                &targets,
                MessageType::ProvisionalResponse,
                Duration::from_secs(1),
                json!({}),
                Vec::new(),
            )
            .await;
        let accepted = connector
            .send(
                &targets,
                MessageType::NonBlockingResponse,
                Duration::from_secs(1),
                json!({}),
                Vec::new(),
            )
            .await;

        assert!(refused.is_err());
        assert!(accepted.is_ok());
        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.sent().len(), 1);
    }
}
