// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connector that writes one JSON envelope per line to standard output.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::traits::*;

/// Envelope written for every message.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: String,
    message_type: MessageType,
    targets: &'a [String],
    expires: String,
    data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    debug: Vec<Value>,
}

/// Line-oriented connector over any async writer (stdout by default).
pub struct StdoutConnector<W = tokio::io::Stdout> {
    writer: Mutex<W>,
}

impl StdoutConnector {
    /// Connector writing to the process's standard output.
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }
}

impl Default for StdoutConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> StdoutConnector<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Connector writing to `writer`.
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the connector and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

fn expiry(now: DateTime<Utc>, timeout: Duration) -> String {
    let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
    (now + timeout).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl<W> Connector for StdoutConnector<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(
        &self,
        targets: &[String],
        message_type: MessageType,
        timeout: Duration,
        data: Value,
        debug: Vec<Value>,
    ) -> Result<()> {
        if targets.is_empty() {
            return Err(ConnectionError::SendFailed("no targets".to_string()));
        }

        let envelope = Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            targets,
            expires: expiry(Utc::now(), timeout),
            data,
            debug,
        };
        let mut line = serde_json::to_vec(&envelope)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
