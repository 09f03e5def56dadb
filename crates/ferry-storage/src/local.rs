use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::provider::ObjectStore;

/// Default root used when no explicit root is configured.
pub const DEFAULT_ROOT: &str = "/tmp/backups";

/// Filesystem-backed object store: `(bucket, key)` lives at `<root>/<bucket>/<key>`.
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `/`-separated segments under the root, refusing to walk above it.
    fn resolve(&self, parts: &[&str]) -> anyhow::Result<PathBuf> {
        let mut path = self.root.clone();
        for part in parts {
            for segment in part.split('/') {
                match segment {
                    "" | "." => {}
                    ".." => anyhow::bail!("Path escapes object store root: {}", parts.join("/")),
                    s => path.push(s),
                }
            }
        }
        Ok(path)
    }
}

fn sorted_entries(path: &Path) -> anyhow::Result<Vec<std::fs::DirEntry>> {
    let mut entries = std::fs::read_dir(path)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn init(&self, config: &HashMap<String, String>) -> anyhow::Result<()> {
        let bucket = config.get("bucket").map(String::as_str).unwrap_or("");
        let prefix = config.get("prefix").map(String::as_str).unwrap_or("");
        let path = self.resolve(&[bucket, prefix])?;
        tracing::info!(path = %path.display(), "FileObjectStore.Init called");
        std::fs::create_dir_all(&path)?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> anyhow::Result<()> {
        let path = self.resolve(&[bucket, key])?;
        tracing::info!(bucket, key, path = %path.display(), "PutObject");
        if let Some(parent) = path.parent() {
            tracing::debug!(dir = %parent.display(), "creating dir");
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, body)?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool> {
        let path = self.resolve(&[bucket, key])?;
        tracing::info!(bucket, key, path = %path.display(), "ObjectExists");
        match std::fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(&[bucket, key])?;
        tracing::info!(bucket, key, path = %path.display(), "GetObject");
        Ok(std::fs::read(&path)?)
    }

    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> anyhow::Result<Vec<String>> {
        let path = self.resolve(&[bucket, prefix, delimiter])?;
        tracing::info!(bucket, prefix, delimiter, path = %path.display(), "ListCommonPrefixes");
        let mut dirs = Vec::new();
        for entry in sorted_entries(&path)? {
            if entry.file_type()?.is_dir() {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(dirs)
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> anyhow::Result<Vec<String>> {
        let path = self.resolve(&[bucket, prefix])?;
        tracing::info!(bucket, prefix, path = %path.display(), "ListObjects");
        let prefix = prefix.trim_end_matches('/');
        let objects = sorted_entries(&path)?
            .into_iter()
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                }
            })
            .collect();
        Ok(objects)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        let path = self.resolve(&[bucket, key])?;
        tracing::info!(bucket, key, path = %path.display(), "DeleteObject");
        let removed = std::fs::remove_file(&path);

        // A filesystem keeps the per-backup directory around after its last object
        // goes; object stores only mimic directories and have nothing to clean up.
        let parts: Vec<&str> = key.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() > 2 {
            let backup_path = self.resolve(&[bucket, parts[0], parts[1]])?;
            if sorted_entries(&backup_path)?.is_empty() {
                tracing::info!(backup_path = %backup_path.display(), "Deleted backup directory");
                std::fs::remove_dir(&backup_path)?;
            }
        }

        removed?;
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        _ttl: Duration,
    ) -> anyhow::Result<String> {
        tracing::info!(bucket, key, "CreateSignedURL");
        anyhow::bail!("CreateSignedURL is not supported for this plugin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(bucket: &str, prefix: &str) -> HashMap<String, String> {
        HashMap::from([
            ("bucket".to_string(), bucket.to_string()),
            ("prefix".to_string(), prefix.to_string()),
        ])
    }

    #[tokio::test]
    async fn init_creates_bucket_prefix() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        store.init(&config("velero", "cluster-a")).await.unwrap();
        assert!(tmp.path().join("velero/cluster-a").is_dir());
        // second init is harmless
        store.init(&config("velero", "cluster-a")).await.unwrap();
    }

    #[tokio::test]
    async fn put_get_exists_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        let key = "backups/b1/b1.tar.gz";

        assert!(!store.object_exists("bkt", key).await.unwrap());
        store.put_object("bkt", key, b"tarball").await.unwrap();
        assert!(store.object_exists("bkt", key).await.unwrap());
        assert_eq!(store.get_object("bkt", key).await.unwrap(), b"tarball");

        store.put_object("bkt", key, b"replaced").await.unwrap();
        assert_eq!(store.get_object("bkt", key).await.unwrap(), b"replaced");
    }

    #[tokio::test]
    async fn get_missing_object_fails() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        assert!(store.get_object("bkt", "nope").await.is_err());
    }

    #[tokio::test]
    async fn list_objects_and_prefixes() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        store.put_object("bkt", "backups/b1/meta.json", b"{}").await.unwrap();
        store.put_object("bkt", "backups/b2/meta.json", b"{}").await.unwrap();
        store.put_object("bkt", "backups/readme", b"x").await.unwrap();

        let prefixes = store
            .list_common_prefixes("bkt", "backups", "/")
            .await
            .unwrap();
        assert_eq!(prefixes, vec!["b1", "b2"]);

        let objects = store.list_objects("bkt", "backups/b1").await.unwrap();
        assert_eq!(objects, vec!["backups/b1/meta.json"]);

        let top = store.list_objects("bkt", "backups/").await.unwrap();
        assert_eq!(top, vec!["backups/b1", "backups/b2", "backups/readme"]);
    }

    #[tokio::test]
    async fn delete_cleans_empty_backup_dir() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        store.put_object("bkt", "backups/b1/a.json", b"a").await.unwrap();
        store.put_object("bkt", "backups/b1/b.json", b"b").await.unwrap();

        store.delete_object("bkt", "backups/b1/a.json").await.unwrap();
        assert!(tmp.path().join("bkt/backups/b1").is_dir());

        store.delete_object("bkt", "backups/b1/b.json").await.unwrap();
        assert!(!tmp.path().join("bkt/backups/b1").exists());
        assert!(tmp.path().join("bkt/backups").is_dir());
    }

    #[tokio::test]
    async fn delete_missing_object_fails() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        store.put_object("bkt", "backups/b1/keep", b"k").await.unwrap();
        assert!(store.delete_object("bkt", "backups/b1/gone").await.is_err());
        assert!(tmp.path().join("bkt/backups/b1/keep").exists());
    }

    #[tokio::test]
    async fn refuses_parent_segments() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        assert!(store.put_object("bkt", "../escape", b"x").await.is_err());
    }

    #[tokio::test]
    async fn signed_urls_unsupported() {
        let tmp = TempDir::new().unwrap();
        let store = FileObjectStore::new(tmp.path());
        let err = store
            .create_signed_url("bkt", "k", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
