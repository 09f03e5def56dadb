use async_trait::async_trait;

use ferry_core::types::{Item, ResourceSelector, Restore};

use crate::action::{Applicable, Executable, ExecuteError, ExecuteOutput};

pub const NAME: &str = "example.io/restore-plugin";
pub const MARKER_ANNOTATION: &str = "example.io/my-restore-plugin";

/// Synchronous restore hook that marks every restored item.
#[derive(Debug, Default, Clone)]
pub struct RestorePlugin;

impl RestorePlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Applicable for RestorePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::all()
    }
}

#[async_trait]
impl Executable<Restore> for RestorePlugin {
    async fn execute(
        &self,
        mut item: Item,
        _restore: &Restore,
    ) -> Result<ExecuteOutput, ExecuteError> {
        tracing::info!(kind = %item.kind, name = item.name(), "restore plugin executing");
        item.set_annotation(MARKER_ANNOTATION, "1");
        Ok(ExecuteOutput::new(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn marks_item() {
        let item = Item::new("apps/v1", "Deployment", "app", "web");
        let out = RestorePlugin::new()
            .execute(item, &Restore::new("velero", "r1"))
            .await
            .unwrap();
        assert_eq!(out.item.annotation(MARKER_ANNOTATION), Some("1"));
        assert_eq!(out.item.name(), "web");
    }
}
