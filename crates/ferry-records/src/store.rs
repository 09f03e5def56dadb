use async_trait::async_trait;
use std::collections::BTreeMap;

use ferry_core::error::StoreError;
use ferry_core::types::{GroupResource, Item};

/// Externally owned key/value resource store addressed by `(resource, namespace, name)`.
///
/// Updates are compare-and-swap on `metadata.resourceVersion`: writing a record read
/// at an older version fails with [`StoreError::Conflict`]. Implementations never retry.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Persist a new record. `metadata.generateName` is resolved to a unique name when
    /// `metadata.name` is empty. Returns the stored record with uid and version set.
    async fn create(&self, resource: &GroupResource, template: Item) -> Result<Item, StoreError>;

    async fn get(
        &self,
        resource: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<Item, StoreError>;

    /// Replace a record. An empty `resourceVersion` means an unconditional write.
    async fn update(&self, resource: &GroupResource, item: Item) -> Result<Item, StoreError>;

    /// Records in `namespace` carrying every label in `labels`.
    async fn list(
        &self,
        resource: &GroupResource,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Item>, StoreError>;

    async fn delete(
        &self,
        resource: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError>;
}
