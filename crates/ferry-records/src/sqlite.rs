use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, params};

use ferry_core::error::StoreError;
use ferry_core::types::{GroupResource, Item};

use crate::store::ResourceStore;

/// Characters used for generated name suffixes (no vowels, no look-alikes).
const NAME_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const NAME_SUFFIX_LEN: usize = 5;
const GENERATE_NAME_ATTEMPTS: usize = 8;

const MIGRATE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS resources (
    resource         TEXT NOT NULL,
    namespace        TEXT NOT NULL,
    name             TEXT NOT NULL,
    uid              TEXT NOT NULL,
    resource_version INTEGER NOT NULL,
    body             TEXT NOT NULL,
    created_at       TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at       TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (resource, namespace, name)
);
"#;

/// SQLite-backed [`ResourceStore`]. Records are stored as JSON bodies, so any number of
/// plugin processes pointed at the same file observe the same state.
pub struct SqliteResourceStore {
    conn: Mutex<Connection>,
}

impl SqliteResourceStore {
    fn new(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(MIGRATE_SQL).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (or create) the record database and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(backend)?;
            }
        }
        let conn = Connection::open(path).map_err(backend)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(backend)?;
        Self::new(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::new(Connection::open_in_memory().map_err(backend)?)
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn not_found(resource: &GroupResource, namespace: &str, name: &str) -> StoreError {
    StoreError::NotFound {
        resource: resource.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn generate_name(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..NAME_SUFFIX_LEN)
        .map(|_| NAME_ALPHABET[rng.gen_range(0..NAME_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

fn current_version(
    conn: &Connection,
    resource: &str,
    namespace: &str,
    name: &str,
) -> Result<Option<i64>, StoreError> {
    conn.query_row(
        "SELECT resource_version FROM resources WHERE resource=?1 AND namespace=?2 AND name=?3",
        params![resource, namespace, name],
        |row| row.get(0),
    )
    .optional()
    .map_err(backend)
}

#[async_trait]
impl ResourceStore for SqliteResourceStore {
    async fn create(
        &self,
        resource: &GroupResource,
        mut template: Item,
    ) -> Result<Item, StoreError> {
        let explicit_name = !template.metadata.name.is_empty();
        if !explicit_name && template.metadata.generate_name.is_empty() {
            return Err(StoreError::Invalid(
                "name or generateName is required".to_string(),
            ));
        }

        let key = resource.to_string();
        let namespace = template.metadata.namespace.clone();
        template.metadata.uid = uuid::Uuid::now_v7().to_string();
        template.metadata.resource_version = "1".to_string();

        let conn = self.conn.lock().unwrap();
        let attempts = if explicit_name { 1 } else { GENERATE_NAME_ATTEMPTS };
        for _ in 0..attempts {
            if !explicit_name {
                template.metadata.name = generate_name(&template.metadata.generate_name);
            }
            let body = serde_json::to_string(&template).map_err(backend)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO resources (resource, namespace, name, uid, resource_version, body) VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                    params![key, namespace, template.metadata.name, template.metadata.uid, body],
                )
                .map_err(backend)?;
            if inserted == 1 {
                tracing::debug!(
                    resource = %key,
                    namespace = %namespace,
                    name = %template.metadata.name,
                    "created record"
                );
                return Ok(template);
            }
        }

        Err(StoreError::AlreadyExists {
            resource: key,
            namespace,
            name: template.metadata.name,
        })
    }

    async fn get(
        &self,
        resource: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<Item, StoreError> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM resources WHERE resource=?1 AND namespace=?2 AND name=?3",
                params![resource.to_string(), namespace, name],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        let body = body.ok_or_else(|| not_found(resource, namespace, name))?;
        serde_json::from_str(&body).map_err(backend)
    }

    async fn update(&self, resource: &GroupResource, mut item: Item) -> Result<Item, StoreError> {
        let key = resource.to_string();
        let namespace = item.metadata.namespace.clone();
        let name = item.metadata.name.clone();

        let conn = self.conn.lock().unwrap();
        let actual = current_version(&conn, &key, &namespace, &name)?
            .ok_or_else(|| not_found(resource, &namespace, &name))?;

        let expected = if item.metadata.resource_version.is_empty() {
            actual
        } else {
            item.metadata
                .resource_version
                .parse::<i64>()
                .map_err(|_| {
                    StoreError::Invalid(format!(
                        "resource version {:?} is not a number",
                        item.metadata.resource_version
                    ))
                })?
        };
        let conflict = |actual: i64| StoreError::Conflict {
            resource: key.clone(),
            namespace: namespace.clone(),
            name: name.clone(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        };
        if expected != actual {
            return Err(conflict(actual));
        }

        item.metadata.resource_version = (expected + 1).to_string();
        let body = serde_json::to_string(&item).map_err(backend)?;
        let updated = conn
            .execute(
                "UPDATE resources SET body=?1, resource_version=resource_version+1, updated_at=datetime('now') \
                 WHERE resource=?2 AND namespace=?3 AND name=?4 AND resource_version=?5",
                params![body, key, namespace, name, expected],
            )
            .map_err(backend)?;
        if updated == 0 {
            // another process got there between the read and the write
            let now = current_version(&conn, &key, &namespace, &name)?
                .ok_or_else(|| not_found(resource, &namespace, &name))?;
            return Err(conflict(now));
        }
        Ok(item)
    }

    async fn list(
        &self,
        resource: &GroupResource,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Item>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT body FROM resources WHERE resource=?1 AND namespace=?2 ORDER BY name",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![resource.to_string(), namespace], |row| {
                row.get::<_, String>(0)
            })
            .map_err(backend)?;

        let mut items = Vec::new();
        for body in rows {
            let item: Item = serde_json::from_str(&body.map_err(backend)?).map_err(backend)?;
            let matches = labels
                .iter()
                .all(|(k, v)| item.metadata.labels.get(k) == Some(v));
            if matches {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn delete(
        &self,
        resource: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM resources WHERE resource=?1 AND namespace=?2 AND name=?3",
                params![resource.to_string(), namespace, name],
            )
            .map_err(backend)?;
        if deleted == 0 {
            return Err(not_found(resource, namespace, name));
        }
        Ok(())
    }
}
