use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use ferry_core::types::Item;

use crate::provider::{VolumeInfo, VolumeSnapshotter};

const ORIGINAL_VOLUME_TYPE: &str = "originalVolumeType";
const ORIGINAL_VOLUME_IOPS: i64 = 100;

#[derive(Debug, Clone)]
struct Volume {
    volume_type: String,
    az: String,
    iops: Option<i64>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    volume_id: String,
    az: String,
    tags: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct Registry {
    config: HashMap<String, String>,
    volumes: HashMap<String, Volume>,
    snapshots: HashMap<String, Snapshot>,
}

/// Snapshotter test double that only records volumes and snapshots in memory.
///
/// State is process-local and is lost when the plugin process exits.
#[derive(Debug, Default)]
pub struct NoOpVolumeSnapshotter {
    state: Mutex<Registry>,
}

impl NoOpVolumeSnapshotter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration from the most recent `init`.
    pub fn config(&self) -> HashMap<String, String> {
        self.state.lock().unwrap().config.clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.state.lock().unwrap().snapshots.len()
    }

    /// Volume a snapshot was taken from, with its availability zone and tags.
    pub fn snapshot_source(&self, snapshot_id: &str) -> Option<(String, String, HashMap<String, String>)> {
        let state = self.state.lock().unwrap();
        state
            .snapshots
            .get(snapshot_id)
            .map(|s| (s.volume_id.clone(), s.az.clone(), s.tags.clone()))
    }
}

fn unique_id<V>(existing: &HashMap<String, V>, prefix: &str) -> String {
    loop {
        let candidate = format!("{prefix}.{}", rand::random::<u64>());
        if !existing.contains_key(&candidate) {
            return candidate;
        }
    }
}

fn host_path(pv: &Item) -> Option<&Value> {
    pv.field(&["spec", "hostPath"])
}

#[async_trait]
impl VolumeSnapshotter for NoOpVolumeSnapshotter {
    async fn init(&self, config: &HashMap<String, String>) -> anyhow::Result<()> {
        tracing::info!(?config, "Init called");
        let mut state = self.state.lock().unwrap();
        state.config = config.clone();
        Ok(())
    }

    async fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        volume_type: &str,
        volume_az: &str,
        iops: Option<i64>,
    ) -> anyhow::Result<String> {
        tracing::info!(snapshot_id, volume_type, volume_az, ?iops, "CreateVolumeFromSnapshot called");
        let mut state = self.state.lock().unwrap();
        let volume_id = unique_id(&state.volumes, &format!("{snapshot_id}.vol"));
        state.volumes.insert(
            volume_id.clone(),
            Volume {
                volume_type: volume_type.to_string(),
                az: volume_az.to_string(),
                iops,
            },
        );
        Ok(volume_id)
    }

    async fn get_volume_info(
        &self,
        volume_id: &str,
        volume_az: &str,
    ) -> anyhow::Result<VolumeInfo> {
        tracing::info!(volume_id, volume_az, "GetVolumeInfo called");
        let state = self.state.lock().unwrap();
        let volume = state
            .volumes
            .get(volume_id)
            .ok_or_else(|| anyhow::anyhow!("Volume {volume_id} not found"))?;
        tracing::debug!(volume_id, az = %volume.az, "volume found");
        Ok(VolumeInfo {
            volume_type: volume.volume_type.clone(),
            iops: volume.iops,
        })
    }

    async fn is_volume_ready(&self, volume_id: &str, volume_az: &str) -> anyhow::Result<bool> {
        tracing::info!(volume_id, volume_az, "IsVolumeReady called");
        Ok(true)
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        volume_az: &str,
        tags: &HashMap<String, String>,
    ) -> anyhow::Result<String> {
        tracing::info!(volume_id, volume_az, ?tags, "CreateSnapshot called");
        let mut state = self.state.lock().unwrap();
        let snapshot_id = unique_id(&state.snapshots, &format!("{volume_id}.snap"));

        // first sighting of a volume we did not create
        state
            .volumes
            .entry(volume_id.to_string())
            .or_insert_with(|| Volume {
                volume_type: ORIGINAL_VOLUME_TYPE.to_string(),
                az: volume_az.to_string(),
                iops: Some(ORIGINAL_VOLUME_IOPS),
            });

        state.snapshots.insert(
            snapshot_id.clone(),
            Snapshot {
                volume_id: volume_id.to_string(),
                az: volume_az.to_string(),
                tags: tags.clone(),
            },
        );
        tracing::info!(snapshot_id, "CreateSnapshot returning");
        Ok(snapshot_id)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> anyhow::Result<()> {
        tracing::info!(snapshot_id, "DeleteSnapshot called");
        self.state.lock().unwrap().snapshots.remove(snapshot_id);
        Ok(())
    }

    fn get_volume_id(&self, pv: &Item) -> anyhow::Result<String> {
        tracing::info!(pv = pv.name(), "GetVolumeID called");
        let Some(host_path) = host_path(pv) else {
            return Ok(String::new());
        };
        match host_path.get("path").and_then(Value::as_str) {
            Some(path) if !path.is_empty() => Ok(path.to_string()),
            _ => anyhow::bail!("spec.hostPath.path not found"),
        }
    }

    fn set_volume_id(&self, mut pv: Item, volume_id: &str) -> anyhow::Result<Item> {
        tracing::info!(pv = pv.name(), volume_id, "SetVolumeID called");
        let host_path = pv
            .fields
            .get_mut("spec")
            .and_then(|spec| spec.get_mut("hostPath"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow::anyhow!("spec.hostPath.path not found"))?;
        host_path.insert("path".to_string(), Value::String(volume_id.to_string()));
        Ok(pv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pv(spec: Value) -> Item {
        let mut item = Item::new("v1", "PersistentVolume", "", "pv-1");
        item.fields.insert("spec".to_string(), spec);
        item
    }

    #[tokio::test]
    async fn snapshot_then_restore_volume() {
        let snapshotter = NoOpVolumeSnapshotter::new();
        snapshotter.init(&HashMap::new()).await.unwrap();

        let tags = HashMap::from([("backup".to_string(), "b1".to_string())]);
        let snap = snapshotter
            .create_snapshot("vol-1", "zone-a", &tags)
            .await
            .unwrap();
        assert!(snap.starts_with("vol-1.snap."));
        assert_eq!(snapshotter.snapshot_count(), 1);
        let (source, az, stored_tags) = snapshotter.snapshot_source(&snap).unwrap();
        assert_eq!(source, "vol-1");
        assert_eq!(az, "zone-a");
        assert_eq!(stored_tags, tags);

        // the source volume got registered on first sight
        let info = snapshotter.get_volume_info("vol-1", "zone-a").await.unwrap();
        assert_eq!(info.volume_type, ORIGINAL_VOLUME_TYPE);
        assert_eq!(info.iops, Some(ORIGINAL_VOLUME_IOPS));

        let restored = snapshotter
            .create_volume_from_snapshot(&snap, "gp3", "zone-b", Some(3000))
            .await
            .unwrap();
        assert!(restored.starts_with(&format!("{snap}.vol.")));
        let info = snapshotter.get_volume_info(&restored, "zone-b").await.unwrap();
        assert_eq!(info.volume_type, "gp3");
        assert_eq!(info.iops, Some(3000));
        assert!(snapshotter.is_volume_ready(&restored, "zone-b").await.unwrap());
    }

    #[tokio::test]
    async fn reinit_keeps_state() {
        let snapshotter = NoOpVolumeSnapshotter::new();
        snapshotter.init(&HashMap::new()).await.unwrap();
        snapshotter
            .create_snapshot("vol-1", "zone-a", &HashMap::new())
            .await
            .unwrap();
        let config = HashMap::from([("region".to_string(), "east".to_string())]);
        snapshotter.init(&config).await.unwrap();
        assert_eq!(snapshotter.snapshot_count(), 1);
        assert_eq!(snapshotter.config(), config);
    }

    #[tokio::test]
    async fn delete_snapshot_forgets_it() {
        let snapshotter = NoOpVolumeSnapshotter::new();
        let snap = snapshotter
            .create_snapshot("vol-1", "zone-a", &HashMap::new())
            .await
            .unwrap();
        snapshotter.delete_snapshot(&snap).await.unwrap();
        assert_eq!(snapshotter.snapshot_count(), 0);
        // deleting twice is fine
        snapshotter.delete_snapshot(&snap).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_volume_info_fails() {
        let snapshotter = NoOpVolumeSnapshotter::new();
        let err = snapshotter.get_volume_info("ghost", "zone-a").await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn volume_id_from_host_path() {
        let snapshotter = NoOpVolumeSnapshotter::new();
        let item = pv(json!({"hostPath": {"path": "/data/pv-1"}}));
        assert_eq!(snapshotter.get_volume_id(&item).unwrap(), "/data/pv-1");

        let no_host_path = pv(json!({"nfs": {"server": "x"}}));
        assert_eq!(snapshotter.get_volume_id(&no_host_path).unwrap(), "");

        let empty_path = pv(json!({"hostPath": {"path": ""}}));
        assert!(snapshotter.get_volume_id(&empty_path).is_err());
    }

    #[test]
    fn set_volume_id_rewrites_host_path() {
        let snapshotter = NoOpVolumeSnapshotter::new();
        let item = pv(json!({"hostPath": {"path": "/old"}, "capacity": {"storage": "1Gi"}}));
        let updated = snapshotter.set_volume_id(item, "/new").unwrap();
        assert_eq!(snapshotter.get_volume_id(&updated).unwrap(), "/new");
        assert_eq!(
            updated.field(&["spec", "capacity", "storage"]),
            Some(&json!("1Gi"))
        );

        let without = pv(json!({}));
        assert!(snapshotter.set_volume_id(without, "/new").is_err());
    }
}
