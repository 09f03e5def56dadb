use std::sync::Arc;

use async_trait::async_trait;

use ferry_core::clock::Clock;
use ferry_core::config::AsyncActionConfig;
use ferry_core::error::Result;
use ferry_core::types::{Item, OperationProgress, ResourceIdentifier, ResourceSelector, Restore};
use ferry_records::ResourceStore;

use crate::action::{
    AdditionalItemsReady, Applicable, Cancellable, Executable, ExecuteError, ExecuteOutput,
    Pollable,
};
use crate::async_op::AsyncOperations;

pub const NAME: &str = "example.io/restore-pluginv2";
pub const MARKER_ANNOTATION: &str = "example.io/my-restore-pluginv2";

/// Restore counterpart of [`crate::BackupPluginV2`], reading the `example-ria` directives.
pub struct RestorePluginV2 {
    ops: AsyncOperations,
}

impl RestorePluginV2 {
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

impl Applicable for RestorePluginV2 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::excluding(&["secrets"])
    }
}

#[async_trait]
impl Executable<Restore> for RestorePluginV2 {
    async fn execute(
        &self,
        item: Item,
        restore: &Restore,
    ) -> std::result::Result<ExecuteOutput, ExecuteError> {
        tracing::info!(kind = %item.kind, name = item.name(), "restore plugin v2 executing");
        self.ops.execute(item, restore).await
    }
}

#[async_trait]
impl Pollable<Restore> for RestorePluginV2 {
    async fn progress(&self, operation_id: &str, restore: &Restore) -> Result<OperationProgress> {
        self.ops.progress(operation_id, restore).await
    }
}

#[async_trait]
impl Cancellable<Restore> for RestorePluginV2 {
    async fn cancel(&self, operation_id: &str, restore: &Restore) -> Result<()> {
        self.ops.cancel(operation_id, restore).await
    }
}

#[async_trait]
impl AdditionalItemsReady for RestorePluginV2 {
    async fn are_additional_items_ready(
        &self,
        _additional_items: &[ResourceIdentifier],
        _restore: &Restore,
    ) -> Result<bool> {
        Ok(true)
    }
}
