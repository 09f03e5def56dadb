use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use ferry_core::clock::SystemClock;
use ferry_core::config::FerryConfig;
use ferry_records::SqliteResourceStore;

use crate::registry::Registry;
use crate::server::Server;

pub async fn run(config: &FerryConfig) -> Result<()> {
    let db_path = Path::new(&config.ferry.record_db_path);
    let records = SqliteResourceStore::open(db_path)
        .with_context(|| format!("opening record store {}", db_path.display()))?;

    let registry = Registry::standard(config, Arc::new(records), Arc::new(SystemClock));
    tracing::info!(
        records = %db_path.display(),
        object_store_root = %config.ferry.object_store_root,
        plugins = registry.iter().count(),
        "serving plugins on stdin/stdout"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Server::new(registry).serve(stdin, tokio::io::stdout()).await
}
