// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in in-process modules.

use async_trait::async_trait;
use serde_json::json;

use super::traits::{Module, Result};
use crate::error::RequestError;
use crate::outcome::ActionOutcome;
use crate::request::ActionRequest;

/// Connectivity check module.
///
/// `ping ping` echoes the request parameters back to the caller.
#[derive(Debug, Default)]
pub struct PingModule;

impl PingModule {
    /// Module name.
    pub const NAME: &'static str = "ping";
}

#[async_trait]
impl Module for PingModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionOutcome> {
        match request.action() {
            "ping" => Ok(ActionOutcome::internal(json!({
                "pong": true,
                "request_id": request.id(),
                "params": request.params().cloned().unwrap_or_else(|| json!({})),
            }))),
            other => Err(RequestError::UnknownAction {
                module: Self::NAME.to_string(),
                action: other.to_string(),
            }),
        }
    }
}
