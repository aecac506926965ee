//! Rules command implementation.

use super::open_store;
use std::path::Path;

/// Runs the rules command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let rules = store.list_priority_rules();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rules)?),
        _ => {
            println!("{:<6} {:<22} {:<10} {}", "ORDER", "COLLECTION", "PRIORITY", "DESCRIPTION");
            for rule in &rules {
                println!(
                    "{:<6} {:<22} {:<10} {}",
                    rule.order, rule.collection, rule.priority, rule.description
                );
            }
        }
    }
    Ok(())
}
