//! Item-action hooks invoked by the orchestrator during backup, restore and deletion.
//!
//! Each hook is a concrete type implementing the capabilities it supports:
//! [`Executable`] for item mutation, [`Pollable`] and [`Cancellable`] for
//! long-running operations started by `execute`, [`DeleteItemAction`] and
//! [`ItemBlockAction`] for the delete and related-item hooks.

pub mod action;
pub mod async_op;
pub mod backup;
pub mod backup_v2;
pub mod delete;
pub mod directives;
pub mod item_block;
pub mod restore;
pub mod restore_v2;

pub use action::{
    AdditionalItemsReady, Applicable, AsyncItemAction, Cancellable, DeleteItemAction,
    Executable, ExecuteError, ExecuteOutput, ItemBlockAction, Pollable, RestoreItemActionV2,
};
pub use async_op::AsyncOperations;
pub use backup::BackupPlugin;
pub use backup_v2::BackupPluginV2;
pub use delete::DeletePlugin;
pub use item_block::ItemBlockActionPlugin;
pub use restore::RestorePlugin;
pub use restore_v2::RestorePluginV2;
