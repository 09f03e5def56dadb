use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use ferry_core::error::{FerryError, Result};
use ferry_core::types::{Backup, GroupResource, Item, ResourceIdentifier, ResourceSelector};
use ferry_records::ResourceStore;

use crate::action::{Applicable, ItemBlockAction};

pub const NAME: &str = "example.io/item-block-action-plugin";
/// Pods sharing a value for this label are backed up as one block.
pub const ITEM_BLOCK_LABEL: &str = "itemblock";

/// Groups pods by the `itemblock` label.
pub struct ItemBlockActionPlugin {
    records: Arc<dyn ResourceStore>,
}

impl ItemBlockActionPlugin {
    pub fn new(records: Arc<dyn ResourceStore>) -> Self {
        Self { records }
    }
}

impl Applicable for ItemBlockActionPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn applies_to(&self) -> ResourceSelector {
        ResourceSelector::including(&["pods"])
    }
}

#[async_trait]
impl ItemBlockAction for ItemBlockActionPlugin {
    async fn get_related_items(
        &self,
        item: &Item,
        _backup: &Backup,
    ) -> Result<Vec<ResourceIdentifier>> {
        if !item.kind.is_empty() && item.kind != "Pod" {
            return Err(FerryError::InvalidItem(format!(
                "expected a Pod, got {}",
                item.kind
            )));
        }
        let Some(block) = item.label(ITEM_BLOCK_LABEL).filter(|v| !v.is_empty()) else {
            return Ok(Vec::new());
        };

        let pods = GroupResource::pods();
        let selector = BTreeMap::from([(ITEM_BLOCK_LABEL.to_string(), block.to_string())]);
        let related: Vec<ResourceIdentifier> = self
            .records
            .list(&pods, item.namespace(), &selector)
            .await
            .map_err(|e| FerryError::store("error listing pods", e))?
            .iter()
            .filter(|pod| pod.name() != item.name())
            .map(|pod| ResourceIdentifier::new(pods.clone(), pod.namespace(), pod.name()))
            .collect();

        tracing::info!(
            namespace = item.namespace(),
            name = item.name(),
            block,
            related = related.len(),
            "found related pods"
        );
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_records::SqliteResourceStore;

    async fn seeded() -> Arc<SqliteResourceStore> {
        let store = Arc::new(SqliteResourceStore::open_in_memory().unwrap());
        let pods = [
            ("app", "web-0", Some("web")),
            ("app", "web-1", Some("web")),
            ("app", "db-0", Some("db")),
            ("app", "loose", None),
            ("app", "blank-0", Some("")),
            ("app", "blank-1", Some("")),
            ("other", "web-2", Some("web")),
        ];
        for (ns, name, block) in pods {
            let mut pod = Item::new("v1", "Pod", ns, name);
            if let Some(block) = block {
                pod = pod.with_label(ITEM_BLOCK_LABEL, block);
            }
            store.create(&GroupResource::pods(), pod).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn returns_peers_in_same_namespace() {
        let plugin = ItemBlockActionPlugin::new(seeded().await);
        let pod = Item::new("v1", "Pod", "app", "web-0").with_label(ITEM_BLOCK_LABEL, "web");
        let related = plugin
            .get_related_items(&pod, &Backup::new("velero", "b1"))
            .await
            .unwrap();
        assert_eq!(
            related,
            vec![ResourceIdentifier::new(GroupResource::pods(), "app", "web-1")]
        );
    }

    #[tokio::test]
    async fn unlabeled_pod_has_no_peers() {
        let plugin = ItemBlockActionPlugin::new(seeded().await);
        let pod = Item::new("v1", "Pod", "app", "loose");
        let related = plugin
            .get_related_items(&pod, &Backup::new("velero", "b1"))
            .await
            .unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn empty_block_label_has_no_peers() {
        let plugin = ItemBlockActionPlugin::new(seeded().await);
        let pod = Item::new("v1", "Pod", "app", "blank-0").with_label(ITEM_BLOCK_LABEL, "");
        let related = plugin
            .get_related_items(&pod, &Backup::new("velero", "b1"))
            .await
            .unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn rejects_non_pods() {
        let plugin = ItemBlockActionPlugin::new(seeded().await);
        let item = Item::new("v1", "ConfigMap", "app", "settings");
        assert!(
            plugin
                .get_related_items(&item, &Backup::new("velero", "b1"))
                .await
                .is_err()
        );
    }

    #[test]
    fn applies_to_pods_only() {
        let plugin = ItemBlockActionPlugin::new(Arc::new(
            SqliteResourceStore::open_in_memory().unwrap(),
        ));
        let selector = plugin.applies_to();
        assert!(selector.matches(&GroupResource::pods(), "app"));
        assert!(!selector.matches(&GroupResource::secrets(), "app"));
    }
}
