use async_trait::async_trait;

use ferry_core::error::{FerryError, Result};
use ferry_core::operation::OperationToken;
use ferry_core::types::{
    Backup, Item, OperationProgress, ParentOperation, ResourceIdentifier, ResourceSelector,
    Restore,
};

/// Result of running a hook against one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOutput {
    /// The item as it should be backed up or restored.
    pub item: Item,
    /// Other resources the orchestrator should process along with this one.
    pub additional_items: Vec<ResourceIdentifier>,
    /// Set when the hook started work that outlives this call.
    pub operation_id: Option<OperationToken>,
    /// Resources to re-fetch once the operation completes.
    pub items_to_update: Vec<ResourceIdentifier>,
}

impl ExecuteOutput {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            additional_items: Vec::new(),
            operation_id: None,
            items_to_update: Vec::new(),
        }
    }

    pub fn with_operation(
        mut self,
        token: OperationToken,
        items_to_update: Vec<ResourceIdentifier>,
    ) -> Self {
        self.operation_id = Some(token);
        self.items_to_update = items_to_update;
        self
    }
}

/// A failed `execute` that still hands back the item edits made before the failure.
#[derive(Debug, thiserror::Error)]
#[error("execute failed for {} {:?}", .item.kind, .item.name())]
pub struct ExecuteError {
    pub item: Box<Item>,
    #[source]
    pub source: FerryError,
}

impl ExecuteError {
    pub fn new(item: Item, source: FerryError) -> Self {
        Self {
            item: Box::new(item),
            source,
        }
    }
}

/// Identity and resource filter shared by every hook.
pub trait Applicable: Send + Sync {
    /// Name the hook is registered under.
    fn name(&self) -> &'static str;

    /// Resources this hook should be invoked for.
    fn applies_to(&self) -> ResourceSelector;
}

#[async_trait]
pub trait Executable<P: ParentOperation>: Applicable {
    async fn execute(
        &self,
        item: Item,
        parent: &P,
    ) -> std::result::Result<ExecuteOutput, ExecuteError>;
}

#[async_trait]
pub trait Pollable<P: ParentOperation>: Send + Sync {
    /// Report progress of an operation started by `execute`. Safe to call any number of times.
    async fn progress(&self, operation_id: &str, parent: &P) -> Result<OperationProgress>;
}

#[async_trait]
pub trait Cancellable<P: ParentOperation>: Send + Sync {
    /// Best-effort cancellation of an operation started by `execute`.
    async fn cancel(&self, operation_id: &str, parent: &P) -> Result<()>;
}

/// A hook supporting the full execute/progress/cancel protocol.
pub trait AsyncItemAction<P: ParentOperation>: Executable<P> + Pollable<P> + Cancellable<P> {}

impl<P, T> AsyncItemAction<P> for T
where
    P: ParentOperation,
    T: Executable<P> + Pollable<P> + Cancellable<P>,
{
}

#[async_trait]
pub trait AdditionalItemsReady: Send + Sync {
    /// Whether resources returned as additional items are ready for the restore to proceed.
    async fn are_additional_items_ready(
        &self,
        additional_items: &[ResourceIdentifier],
        restore: &Restore,
    ) -> Result<bool>;
}

pub trait RestoreItemActionV2: AsyncItemAction<Restore> + AdditionalItemsReady {}

impl<T> RestoreItemActionV2 for T where T: AsyncItemAction<Restore> + AdditionalItemsReady {}

#[async_trait]
pub trait DeleteItemAction: Applicable {
    /// Called for each item of a backup that is being deleted.
    async fn execute(&self, item: &Item, backup: &Backup) -> Result<()>;
}

#[async_trait]
pub trait ItemBlockAction: Applicable {
    /// Items that must be backed up together with `item`.
    async fn get_related_items(
        &self,
        item: &Item,
        backup: &Backup,
    ) -> Result<Vec<ResourceIdentifier>>;
}
