//! fleetdns daemon entry point.
//!
//! Reads newline-delimited JSON lifecycle events from stdin and
//! reconciles each against the configured zone. Production deployments
//! swap the in-memory adapters for their platform's backends; the
//! event-routing layer that feeds stdin is out of scope here.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use fleetdns::{
    Config, LifecycleEvent, MemoryDirectory, MemoryLockStore, MemoryZone, NoopAcknowledger,
    Reconciler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting fleetdns with config: {:?}", cfg);

    let reconciler = Reconciler::new(
        cfg,
        Arc::new(MemoryDirectory::new()),
        Arc::new(MemoryZone::new()),
        Arc::new(MemoryLockStore::new()),
        Arc::new(NoopAcknowledger),
    );

    // Main loop: one JSON event per line until EOF.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: LifecycleEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                error!("Failed to parse lifecycle event: {}", e);
                continue;
            }
        };
        if let Err(e) = reconciler.handle(&event).await {
            if e.is_retryable() {
                warn!("Event failed but may succeed on redelivery: {}", e);
            } else {
                error!("Event failed terminally: {}", e);
            }
        }
    }

    info!("Event stream closed, shutting down.");
    Ok(())
}
