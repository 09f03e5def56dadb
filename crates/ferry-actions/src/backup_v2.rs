use std::sync::Arc;

use async_trait::async_trait;

use ferry_core::clock::Clock;
use ferry_core::config::AsyncActionConfig;
use ferry_core::error::Result;
use ferry_core::types::{Backup, Item, OperationProgress, ResourceSelector};
use ferry_records::ResourceStore;

use crate::action::{Applicable, Cancellable, Executable, ExecuteError, ExecuteOutput, Pollable};
use crate::async_op::AsyncOperations;

pub const NAME: &str = "example.io/backup-pluginv2";
pub const MARKER_ANNOTATION: &str = "example.io/my-backup-pluginv2";

/// Backup hook that can start long-running operations driven by item annotations.
pub struct BackupPluginV2 {
    ops: AsyncOperations,
}

impl BackupPluginV2 {
    pub fn new(
        config: AsyncActionConfig,
        records: Arc<dyn ResourceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ops: AsyncOperations::new(MARKER_ANNOTATION, config, records, clock),
        }
    }
}

impl Applicable for BackupPluginV2 {
    fn name(&self) -> &'static str {
        NAME
    }

    // side records are secrets; running on them would recurse
    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::excluding(&["secrets"])
    }
}

#[async_trait]
impl Executable<Backup> for BackupPluginV2 {
    async fn execute(
        &self,
        item: Item,
        backup: &Backup,
    ) -> std::result::Result<ExecuteOutput, ExecuteError> {
        tracing::info!(kind = %item.kind, name = item.name(), "backup plugin v2 executing");
        self.ops.execute(item, backup).await
    }
}

#[async_trait]
impl Pollable<Backup> for BackupPluginV2 {
    async fn progress(&self, operation_id: &str, backup: &Backup) -> Result<OperationProgress> {
        self.ops.progress(operation_id, backup).await
    }
}

#[async_trait]
impl Cancellable<Backup> for BackupPluginV2 {
    async fn cancel(&self, operation_id: &str, backup: &Backup) -> Result<()> {
        self.ops.cancel(operation_id, backup).await
    }
}
