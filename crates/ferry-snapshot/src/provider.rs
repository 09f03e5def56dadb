use async_trait::async_trait;
use std::collections::HashMap;

use ferry_core::types::Item;

/// Type and provisioned IOPS of a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_type: String,
    pub iops: Option<i64>,
}

/// Trait for block-volume snapshot backends.
#[async_trait]
pub trait VolumeSnapshotter: Send + Sync {
    /// Prepare the backend. May be called more than once and must not drop state.
    async fn init(&self, config: &HashMap<String, String>) -> anyhow::Result<()>;

    /// Create a volume in `volume_az` from a snapshot. Returns the new volume ID.
    async fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        volume_type: &str,
        volume_az: &str,
        iops: Option<i64>,
    ) -> anyhow::Result<String>;

    async fn get_volume_info(&self, volume_id: &str, volume_az: &str)
    -> anyhow::Result<VolumeInfo>;

    async fn is_volume_ready(&self, volume_id: &str, volume_az: &str) -> anyhow::Result<bool>;

    /// Snapshot a volume, tagging the snapshot. Returns the snapshot ID.
    async fn create_snapshot(
        &self,
        volume_id: &str,
        volume_az: &str,
        tags: &HashMap<String, String>,
    ) -> anyhow::Result<String>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> anyhow::Result<()>;

    /// Backend-specific volume ID of a persistent volume. Empty when the
    /// volume is not managed by this backend.
    fn get_volume_id(&self, pv: &Item) -> anyhow::Result<String>;

    /// Point a persistent volume at a different backend volume.
    fn set_volume_id(&self, pv: Item, volume_id: &str) -> anyhow::Result<Item>;
}
