use async_trait::async_trait;

use ferry_core::error::Result;
use ferry_core::types::{Backup, Item, ParentOperation, ResourceSelector};

use crate::action::{Applicable, DeleteItemAction};

pub const NAME: &str = "example.io/delete-plugin";

/// Logs each item of a backup being deleted.
#[derive(Debug, Default, Clone)]
pub struct DeletePlugin;

impl DeletePlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Applicable for DeletePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::all()
    }
}

#[async_trait]
impl DeleteItemAction for DeletePlugin {
    async fn execute(&self, item: &Item, backup: &Backup) -> Result<()> {
        tracing::info!(
            backup = backup.name(),
            kind = %item.kind,
            namespace = item.namespace(),
            name = item.name(),
            "deleting item from backup"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        let item = Item::new("v1", "ConfigMap", "app", "settings");
        DeletePlugin::new()
            .execute(&item, &Backup::new("velero", "b1"))
            .await
            .unwrap();
    }
}
