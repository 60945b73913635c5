// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Module trait definition.

use async_trait::async_trait;

use crate::error::RequestError;
use crate::outcome::ActionOutcome;
use crate::request::ActionRequest;

/// Result type for module operations.
pub type Result<T> = std::result::Result<T, RequestError>;

/// A unit that knows how to execute named actions.
///
/// Modules are pure execution engines: they never touch the spool or send
/// replies. Job records and replies are handled by the caller.
#[async_trait]
pub trait Module: Send + Sync {
    /// Module name as addressed by requests.
    fn name(&self) -> &str;

    /// Execute the request's action and return its outcome.
    ///
    /// Any invocation problem (unknown action, bad parameters, non-zero
    /// exit) is reported as a [`RequestError`].
    async fn execute_action(&self, request: &ActionRequest) -> Result<ActionOutcome>;
}
