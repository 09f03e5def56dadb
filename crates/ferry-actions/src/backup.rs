use async_trait::async_trait;

use ferry_core::types::{Backup, Item, ResourceSelector};

use crate::action::{Applicable, Executable, ExecuteError, ExecuteOutput};
use crate::directives::resolve_duration;

pub const NAME: &str = "example.io/backup-plugin";
pub const MARKER_ANNOTATION: &str = "example.io/my-backup-plugin";
/// Makes `execute` block for the given duration before returning.
pub const WAIT_DURATION_ANNOTATION: &str = "example.io/example-bia-wait-duration";

/// Synchronous backup hook: marks every item and optionally waits.
#[derive(Debug, Default, Clone)]
pub struct BackupPlugin;

impl BackupPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Applicable for BackupPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::all()
    }
}

#[async_trait]
impl Executable<Backup> for BackupPlugin {
    async fn execute(
        &self,
        mut item: Item,
        backup: &Backup,
    ) -> Result<ExecuteOutput, ExecuteError> {
        tracing::info!(kind = %item.kind, name = item.name(), "backup plugin executing");
        item.set_annotation(MARKER_ANNOTATION, "1");

        if let Some(wait) = resolve_duration(WAIT_DURATION_ANNOTATION, &item, backup) {
            if !wait.duration().is_zero() {
                tracing::info!(
                    namespace = item.namespace(),
                    name = item.name(),
                    wait = %wait,
                    "waiting before returning"
                );
                tokio::time::sleep(wait.duration()).await;
                tracing::info!(name = item.name(), "done waiting");
            }
        }

        Ok(ExecuteOutput::new(item))
    }
}
