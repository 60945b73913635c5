// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock module for testing.
//!
//! Returns a scripted outcome (or error) after an optional delay and counts
//! how many times it was invoked.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Module, Result};
use crate::error::RequestError;
use crate::outcome::ActionOutcome;
use crate::request::ActionRequest;

#[derive(Debug, Clone)]
enum Behavior {
    Succeed(ActionOutcome),
    Fail(RequestError),
    Panic(String),
}

/// Mock module for testing.
#[derive(Debug, Clone)]
pub struct MockModule {
    name: String,
    behavior: Behavior,
    invocations: Arc<AtomicUsize>,
    /// Simulated execution time
    pub delay: Duration,
}

impl MockModule {
    /// Module that returns an in-process outcome with `results`.
    pub fn returning(name: impl Into<String>, results: Value) -> Self {
        Self::with_outcome(name, ActionOutcome::internal(results))
    }

    /// Module that returns the given outcome.
    pub fn with_outcome(name: impl Into<String>, outcome: ActionOutcome) -> Self {
        Self {
            name: name.into(),
            behavior: Behavior::Succeed(outcome),
            invocations: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Module that fails every invocation with `error`.
    pub fn failing(name: impl Into<String>, error: RequestError) -> Self {
        Self {
            name: name.into(),
            behavior: Behavior::Fail(error),
            invocations: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Module that panics while executing.
    pub fn panicking(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: Behavior::Panic(message.into()),
            invocations: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Set the simulated execution time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `execute_action` calls so far.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Module for MockModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_action(&self, _request: &ActionRequest) -> Result<ActionOutcome> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behavior {
            Behavior::Succeed(outcome) => Ok(outcome.clone()),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Panic(message) => panic!("{}", message),
        }
    }
}
