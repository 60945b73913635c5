// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for fleet-agent.

use std::path::PathBuf;
use std::time::Duration;

/// Default spool root when `FLEET_AGENT_SPOOL_DIR` is not set.
pub const DEFAULT_SPOOL_DIR: &str = ".spool";

/// Default timeout attached to every outbound reply.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default period of the background reclaim sweep.
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_millis(1000);

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory under which per-job result directories are created
    pub spool_dir: PathBuf,
    /// Directory holding external module executables (optional)
    pub modules_dir: Option<PathBuf>,
    /// Timeout passed to the connector for every reply
    pub message_timeout: Duration,
    /// How often finished job tasks are reclaimed in the background
    pub reclaim_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
            modules_dir: None,
            message_timeout: DEFAULT_MESSAGE_TIMEOUT,
            reclaim_interval: DEFAULT_RECLAIM_INTERVAL,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let spool_dir = get("FLEET_AGENT_SPOOL_DIR")
            .map(|v| normalize_dir(&v))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SPOOL_DIR));

        let modules_dir = get("FLEET_AGENT_MODULES_DIR").map(|v| normalize_dir(&v));

        let message_timeout = match get("FLEET_AGENT_MESSAGE_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number(
                "FLEET_AGENT_MESSAGE_TIMEOUT_SECS",
                &v,
            )?),
            None => DEFAULT_MESSAGE_TIMEOUT,
        };

        let reclaim_interval = match get("FLEET_AGENT_RECLAIM_INTERVAL_MS") {
            Some(v) => {
                let ms = parse_number("FLEET_AGENT_RECLAIM_INTERVAL_MS", &v)?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue {
                        var: "FLEET_AGENT_RECLAIM_INTERVAL_MS",
                        value: v,
                    });
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_RECLAIM_INTERVAL,
        };

        Ok(Self {
            spool_dir,
            modules_dir,
            message_timeout,
            reclaim_interval,
        })
    }
}

/// Strip trailing separators so job directories are built with `Path::join`.
fn normalize_dir(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let stripped = trimmed.trim_end_matches(std::path::MAIN_SEPARATOR);
    if stripped.is_empty() {
        // "/" stays the filesystem root
        PathBuf::from(trimmed)
    } else {
        PathBuf::from(stripped)
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be used.
    #[error("Invalid value '{value}' for {var}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}
