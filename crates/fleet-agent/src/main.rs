// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fleet Agent - stdin driver
//!
//! Reads newline-delimited JSON action requests from standard input,
//! dispatches them and writes reply envelopes to standard output.
//! Stops on end of input or Ctrl-C, waiting for outstanding jobs.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use fleet_agent::config::Config;
use fleet_agent::connector::StdoutConnector;
use fleet_agent::module::ModuleRegistry;
use fleet_agent::processor::RequestProcessor;
use fleet_agent::request::ActionRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries reply envelopes
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleet_agent=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        spool_dir = %config.spool_dir.display(),
        modules_dir = ?config.modules_dir,
        "Starting Fleet Agent"
    );

    let mut modules = ModuleRegistry::with_builtins();
    if let Some(dir) = &config.modules_dir {
        modules.load_external(dir).await?;
    }
    info!(modules = ?modules.names(), "Modules ready");

    let processor = RequestProcessor::builder()
        .config(&config)
        .connector(Arc::new(StdoutConnector::new()))
        .build()
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => handle_line(&processor, &modules, &line).await,
                    None => {
                        info!("End of input");
                        break;
                    }
                }
            }
        }
    }

    processor.shutdown().await;

    info!("Fleet Agent shut down");

    Ok(())
}

async fn handle_line(processor: &RequestProcessor, modules: &ModuleRegistry, line: &str) {
    let request = match ActionRequest::from_json(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Discarding invalid request");
            if let (Some(id), Some(sender)) = (&e.id, &e.sender) {
                processor
                    .replies()
                    .core_error(id, &e.to_string(), std::slice::from_ref(sender))
                    .await;
            }
            return;
        }
    };

    match modules.get(request.module()) {
        Ok(module) => processor.process(module, &request).await,
        Err(e) => {
            warn!(
                request_id = %request.id(),
                module = %request.module(),
                "Request for unknown module"
            );
            processor.replies().rpc_error(&request, &e.to_string()).await;
        }
    }
}
