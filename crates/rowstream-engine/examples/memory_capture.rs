//! Capture scripted changes from the memory source and print them.
//!
//! Run with: `cargo run -p rowstream-engine --example memory_capture`

use std::time::Duration;

use serde_json::json;

use rowstream_connectors::{MemoryRow, MemorySourceConnector};
use rowstream_core::{Cursor, SourceConfig, SourceKind};
use rowstream_engine::{handler, TaskManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let manager = TaskManager::new();
    let mut config = SourceConfig::new(
        SourceKind::Memory,
        "mem://demo",
        "demo",
        vec!["orders".to_string()],
    );
    config.poll_interval_ms = 100;

    let (connector, handle) = MemorySourceConnector::from_config("orders-cdc", &config);
    manager
        .create_task_with_connector("orders-cdc", config, Box::new(connector))
        .await?;

    manager
        .register_handler(
            "orders-cdc",
            handler(|event| {
                tracing::info!(
                    kind = %event.event_kind,
                    table = %event.table,
                    cursor = %event.cursor,
                    "change captured"
                );
                Ok(())
            }),
        )
        .await?;

    manager.start_task("orders-cdc").await?;

    // Feed a few changes while the scheduler polls.
    for i in 1..=5 {
        handle.push_row(
            "orders",
            MemoryRow::insert(Cursor::Int(i), json!({ "id": i, "status": "new" })),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let metrics = manager.get_metrics("orders-cdc").await?;
    println!(
        "captured={} processed={} throughput={:.1}/s",
        metrics.events_captured, metrics.events_processed, metrics.throughput_eps
    );

    let events = manager.drain_buffered_events("orders-cdc", 100, true).await?;
    println!("drained {} buffered events", events.len());

    manager.shutdown().await;
    Ok(())
}
