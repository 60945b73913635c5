// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fleet Agent - Remote Action Request Core
//!
//! This crate receives action-invocation requests from a message bus,
//! executes the requested module action and replies to the sender, either
//! synchronously or through spooled asynchronous jobs.
//!
//! # Architecture
//!
//! ```text
//!   ActionRequest
//!        │
//!        ▼
//! ┌────────────────────┐  blocking   ┌──────────┐
//! │  RequestProcessor  │────────────►│  Module  │
//! │    (dispatcher)    │             └──────────┘
//! └────────────────────┘
//!        │ non-blocking
//!        ├──────────► JobStore: {spool}/{job_id}/{status,stdout,stderr}
//!        │
//!        ▼
//! ┌────────────────────┐  spawn   ┌──────────┐   execute   ┌──────────┐
//! │   TaskSupervisor   │─────────►│ JobTask  │────────────►│  Module  │
//! │ (reclaims on flag) │◄─────────│          │             └──────────┘
//! └────────────────────┘   done   └──────────┘
//!                                      │ finalize record
//!        ┌─────────────────────────────┘
//!        ▼
//! ┌────────────────────┐   send   ┌────────────┐
//! │    ReplySender     │─────────►│ Connector  │
//! └────────────────────┘          └────────────┘
//! ```
//!
//! # Replies
//!
//! | Message | Sent when | Data |
//! |---------|-----------|------|
//! | `blocking_response` | blocking action succeeded | `transaction_id`, `results` (+ debug) |
//! | `provisional_response` | every non-blocking request | `transaction_id`, `job_id`, `success`, `error?` (+ debug) |
//! | `non_blocking_response` | job succeeded and `notify_outcome` set | `transaction_id`, `job_id`, `results` |
//! | `rpc_error` | action or job preparation failed | `transaction_id`, `id`, `description` |
//! | `core_error` | request could not be parsed | `id`, `description` |
//!
//! # Job Status State Machine
//!
//! ```text
//!  ┌─────────┐  finalize  ┌───────────┐
//!  │ RUNNING │───────────►│ COMPLETED │
//!  └─────────┘            └───────────┘
//! ```
//!
//! Jobs are never cancelled or timed out once started.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `FLEET_AGENT_SPOOL_DIR` | No | `.spool` | Spool root for job records |
//! | `FLEET_AGENT_MODULES_DIR` | No | - | Directory of external module executables |
//! | `FLEET_AGENT_MESSAGE_TIMEOUT_SECS` | No | `10` | Reply timeout |
//! | `FLEET_AGENT_RECLAIM_INTERVAL_MS` | No | `1000` | Background reclaim period |

#![deny(missing_docs)]

/// Agent configuration loaded from environment variables.
pub mod config;

/// Message-bus connectors (stdout, mock).
pub mod connector;

/// Error types for every stage of request handling.
pub mod error;

/// On-disk job records.
pub mod job_store;

/// Action modules (external, built-in, mock) and their registry.
pub mod module;

/// Action outcomes.
pub mod outcome;

/// Request dispatch.
pub mod processor;

/// Outbound replies.
pub mod reply;

/// Action requests.
pub mod request;

/// Non-blocking job execution.
pub mod task_runner;

/// In-flight task tracking and reclamation.
pub mod task_supervisor;

pub use config::Config;
pub use error::Error;
pub use outcome::ActionOutcome;
pub use processor::RequestProcessor;
pub use request::{ActionRequest, RequestType};
