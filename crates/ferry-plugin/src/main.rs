mod commands;
mod protocol;
mod registry;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ferry_core::config::FerryConfig;

#[derive(Parser)]
#[command(name = "ferry-plugin")]
#[command(about = "Backup and restore item-action plugins")]
#[command(version)]
struct Cli {
    /// Path to the Ferry config directory (default: ~/.ferry)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Root directory of the file object store
    #[arg(long, global = true, env = "FERRY_FILE_OBJECT_STORE_ROOT")]
    object_store_root: Option<String>,

    /// SQLite database for side records
    #[arg(long, global = true)]
    record_db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve plugin calls as JSON lines on stdin/stdout
    Serve,

    /// List registered plugins
    List,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol responses
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("ferry=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.config_dir {
        Some(ref dir) => dir.clone(),
        None => FerryConfig::default_base_dir()?,
    };

    let mut config = FerryConfig::load_or_default(&base_dir)?;
    if let Some(root) = cli.object_store_root {
        config.ferry.object_store_root = root;
    }
    if let Some(db) = cli.record_db {
        config.ferry.record_db_path = db;
    }

    match cli.command {
        Commands::Serve => commands::serve::run(&config).await,
        Commands::List => commands::list::run(&config),
        Commands::Config => commands::config::run(&base_dir, &config),
    }
}
