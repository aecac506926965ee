//! Connections command implementation.

use super::{fmt_ts, open_store};
use std::path::Path;

/// Runs the connections command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let connections = store.list_connections();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&connections)?),
        _ => {
            if connections.is_empty() {
                println!("No sessions recorded.");
                return Ok(());
            }
            println!(
                "{:<44} {:<16} {:<16} {:<13} {:<12} {:<12} {}",
                "ID", "USER", "DEVICE", "STATUS", "CONNECTED", "LAST PING", "LATENCY"
            );
            for connection in &connections {
                let latency = connection
                    .latency_ms
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<44} {:<16} {:<16} {:<13} {:<12} {:<12} {}",
                    connection.id,
                    connection.user_id,
                    connection.device_id,
                    connection.status,
                    connection.connected_at,
                    fmt_ts(Some(connection.last_ping_at)),
                    latency,
                );
            }
        }
    }
    Ok(())
}
