// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connector module - message-bus transports used to deliver replies.

pub mod mock;
mod stdout;
mod traits;

pub use mock::{MockConnector, SentMessage};
pub use stdout::StdoutConnector;
pub use traits::*;
