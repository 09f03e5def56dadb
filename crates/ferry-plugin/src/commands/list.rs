use anyhow::Result;
use std::sync::Arc;

use ferry_core::clock::SystemClock;
use ferry_core::config::FerryConfig;
use ferry_records::SqliteResourceStore;

use crate::registry::Registry;

pub fn run(config: &FerryConfig) -> Result<()> {
    // Listing never touches the record database.
    let records = SqliteResourceStore::open_in_memory()?;
    let registry = Registry::standard(config, Arc::new(records), Arc::new(SystemClock));

    println!("{:<40} {}", "NAME", "KIND");
    println!("{}", "-".repeat(60));
    for (name, plugin) in registry.iter() {
        println!("{:<40} {}", name, plugin.kind());
    }

    Ok(())
}
