// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action outcome produced by a module invocation.

use serde_json::Value;

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The module ran as an external process.
    External {
        /// Exit code of the process
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
        /// Result document parsed from standard output
        results: Value,
    },
    /// The module ran in-process.
    Internal {
        /// Result document
        results: Value,
    },
}

impl ActionOutcome {
    /// Create an in-process outcome.
    pub fn internal(results: Value) -> Self {
        Self::Internal { results }
    }

    /// The result document sent back to the caller.
    pub fn results(&self) -> &Value {
        match self {
            ActionOutcome::External { results, .. } => results,
            ActionOutcome::Internal { results } => results,
        }
    }

    /// Whether the outcome came from an external process.
    pub fn is_external(&self) -> bool {
        matches!(self, ActionOutcome::External { .. })
    }
}
