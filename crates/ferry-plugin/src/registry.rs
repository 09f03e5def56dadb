use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ferry_actions::{
    Applicable, AsyncItemAction, BackupPlugin, BackupPluginV2, DeleteItemAction, DeletePlugin,
    Executable, ItemBlockAction, ItemBlockActionPlugin, RestoreItemActionV2, RestorePlugin,
    RestorePluginV2,
};
use ferry_core::clock::Clock;
use ferry_core::config::FerryConfig;
use ferry_core::types::{Backup, Restore};
use ferry_records::ResourceStore;
use ferry_snapshot::noop::NoOpVolumeSnapshotter;
use ferry_snapshot::provider::VolumeSnapshotter;
use ferry_storage::local::FileObjectStore;
use ferry_storage::provider::ObjectStore;

pub const OBJECT_STORE_PLUGIN: &str = "example.io/object-store-plugin";
pub const VOLUME_SNAPSHOTTER_PLUGIN: &str = "example.io/volume-snapshotter-plugin";

/// A registered plugin, tagged by the protocol it speaks.
#[derive(Clone)]
pub enum Plugin {
    BackupAction(Arc<dyn Executable<Backup>>),
    BackupActionV2(Arc<dyn AsyncItemAction<Backup>>),
    RestoreAction(Arc<dyn Executable<Restore>>),
    RestoreActionV2(Arc<dyn RestoreItemActionV2>),
    DeleteAction(Arc<dyn DeleteItemAction>),
    ItemBlockAction(Arc<dyn ItemBlockAction>),
    ObjectStore(Arc<dyn ObjectStore>),
    VolumeSnapshotter(Arc<dyn VolumeSnapshotter>),
}

impl Plugin {
    pub fn kind(&self) -> &'static str {
        match self {
            Plugin::BackupAction(_) => "BackupItemAction",
            Plugin::BackupActionV2(_) => "BackupItemActionV2",
            Plugin::RestoreAction(_) => "RestoreItemAction",
            Plugin::RestoreActionV2(_) => "RestoreItemActionV2",
            Plugin::DeleteAction(_) => "DeleteItemAction",
            Plugin::ItemBlockAction(_) => "ItemBlockAction",
            Plugin::ObjectStore(_) => "ObjectStore",
            Plugin::VolumeSnapshotter(_) => "VolumeSnapshotter",
        }
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    plugins: BTreeMap<String, Plugin>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every plugin this binary ships, wired to `records` and `clock`.
    pub fn standard(
        config: &FerryConfig,
        records: Arc<dyn ResourceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut registry = Self::new();

        let backup = Arc::new(BackupPlugin::new());
        registry.register(backup.name(), Plugin::BackupAction(backup));

        let backup_v2 = Arc::new(BackupPluginV2::new(
            config.backup_action.clone(),
            records.clone(),
            clock.clone(),
        ));
        registry.register(backup_v2.name(), Plugin::BackupActionV2(backup_v2));

        let restore = Arc::new(RestorePlugin::new());
        registry.register(restore.name(), Plugin::RestoreAction(restore));

        let restore_v2 = Arc::new(RestorePluginV2::new(
            config.restore_action.clone(),
            records.clone(),
            clock,
        ));
        registry.register(restore_v2.name(), Plugin::RestoreActionV2(restore_v2));

        let delete = Arc::new(DeletePlugin::new());
        registry.register(delete.name(), Plugin::DeleteAction(delete));

        let item_block = Arc::new(ItemBlockActionPlugin::new(records));
        registry.register(item_block.name(), Plugin::ItemBlockAction(item_block));

        registry.register(
            OBJECT_STORE_PLUGIN,
            Plugin::ObjectStore(Arc::new(FileObjectStore::new(Path::new(
                &config.ferry.object_store_root,
            )))),
        );
        registry.register(
            VOLUME_SNAPSHOTTER_PLUGIN,
            Plugin::VolumeSnapshotter(Arc::new(NoOpVolumeSnapshotter::new())),
        );

        registry
    }

    pub fn register(&mut self, name: &str, plugin: Plugin) {
        tracing::debug!(name, kind = plugin.kind(), "registering plugin");
        self.plugins.insert(name.to_string(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Plugin)> {
        self.plugins.iter().map(|(name, plugin)| (name.as_str(), plugin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ferry_core::clock::ManualClock;
    use ferry_records::SqliteResourceStore;

    #[test]
    fn standard_registers_everything() {
        let registry = Registry::standard(
            &FerryConfig::default(),
            Arc::new(SqliteResourceStore::open_in_memory().unwrap()),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let names: Vec<(&str, &str)> = registry.iter().map(|(n, p)| (n, p.kind())).collect();
        assert_eq!(
            names,
            vec![
                ("example.io/backup-plugin", "BackupItemAction"),
                ("example.io/backup-pluginv2", "BackupItemActionV2"),
                ("example.io/delete-plugin", "DeleteItemAction"),
                ("example.io/item-block-action-plugin", "ItemBlockAction"),
                ("example.io/object-store-plugin", "ObjectStore"),
                ("example.io/restore-plugin", "RestoreItemAction"),
                ("example.io/restore-pluginv2", "RestoreItemActionV2"),
                ("example.io/volume-snapshotter-plugin", "VolumeSnapshotter"),
            ]
        );
    }
}
