use anyhow::Result;
use std::path::Path;

use ferry_core::config::{AsyncActionConfig, FerryConfig};

pub fn run(base_dir: &Path, config: &FerryConfig) -> Result<()> {
    let config_path = FerryConfig::default_path(base_dir);
    if config_path.exists() {
        println!("Config: {}", config_path.display());
    } else {
        println!("Config: {} (not found, using defaults)", config_path.display());
    }
    println!();
    println!("  Record DB:          {}", config.ferry.record_db_path);
    println!("  Object store root:  {}", config.ferry.object_store_root);
    println!();
    print_action("Backup action", &config.backup_action);
    println!();
    print_action("Restore action", &config.restore_action);

    Ok(())
}

fn print_action(title: &str, action: &AsyncActionConfig) {
    println!("  {title}:");
    println!("    duration:          {}", action.duration_annotation);
    println!("    additional update: {}", action.additional_update_annotation);
    println!("    progress:          {}", action.progress_annotation);
    println!("    record:            {}", action.record_annotation);
    println!("    record label:      {}", action.record_label);
}
