use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Trait for object-store backends holding backup data and metadata.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Prepare the store for use. May be called more than once.
    async fn init(&self, config: &HashMap<String, String>) -> anyhow::Result<()>;

    /// Write an object, replacing any existing one.
    async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> anyhow::Result<()>;

    /// Check whether an object exists.
    async fn object_exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool>;

    /// Read an object's full contents.
    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<Vec<u8>>;

    /// List the "directories" directly under `prefix` split on `delimiter`.
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> anyhow::Result<Vec<String>>;

    /// List object keys under `prefix`.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> anyhow::Result<Vec<String>>;

    async fn delete_object(&self, bucket: &str, key: &str) -> anyhow::Result<()>;

    /// Pre-signed download URL valid for `ttl`.
    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> anyhow::Result<String>;
}
