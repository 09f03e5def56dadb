use thiserror::Error;

/// Failures reported by a durable resource store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{resource} {namespace}/{name} not found")]
    NotFound {
        resource: String,
        namespace: String,
        name: String,
    },

    #[error("{resource} {namespace}/{name} already exists")]
    AlreadyExists {
        resource: String,
        namespace: String,
        name: String,
    },

    /// The stored resource version moved on since the caller read the record.
    #[error(
        "conflict on {resource} {namespace}/{name}: expected resource version {expected}, found {actual}"
    )]
    Conflict {
        resource: String,
        namespace: String,
        name: String,
        expected: String,
        actual: String,
    },

    #[error("invalid resource: {0}")]
    Invalid(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum FerryError {
    #[error("invalid operation ID: {0:?}")]
    InvalidOperationId(String),

    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    // Config
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found at {0}")]
    ConfigNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(String),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),
}

impl FerryError {
    /// Wrap a store failure with the operation that was being attempted.
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        FerryError::Store {
            context: context.into(),
            source,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            FerryError::Store {
                source: StoreError::Conflict { .. },
                ..
            }
        )
    }

    pub fn is_invalid_operation_id(&self) -> bool {
        matches!(self, FerryError::InvalidOperationId(_))
    }
}

pub type Result<T> = std::result::Result<T, FerryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_keeps_context() {
        let err = FerryError::store(
            "error updating web-abcde secret",
            StoreError::Conflict {
                resource: "secrets".into(),
                namespace: "ns".into(),
                name: "web-abcde".into(),
                expected: "1".into(),
                actual: "2".into(),
            },
        );
        assert!(err.is_conflict());
        assert!(!err.is_invalid_operation_id());
        let msg = err.to_string();
        assert!(msg.starts_with("error updating web-abcde secret: conflict on secrets ns/web-abcde"));
    }

    #[test]
    fn not_found_is_not_conflict() {
        let err = FerryError::store(
            "error getting x secret",
            StoreError::NotFound {
                resource: "secrets".into(),
                namespace: "ns".into(),
                name: "x".into(),
            },
        );
        assert!(!err.is_conflict());
    }
}
