use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::FerryError;

/// Object metadata shared by items, side records and parent operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A resource instance handed to a hook. Fields outside `metadata` are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            metadata: ObjectMeta {
                namespace: namespace.to_string(),
                name: name.to_string(),
                ..ObjectMeta::default()
            },
            fields: Map::new(),
        }
    }

    pub fn with_uid(mut self, uid: &str) -> Self {
        self.metadata.uid = uid.to_string();
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.set_annotation(key, value);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        self.metadata
            .annotations
            .insert(key.to_string(), value.to_string());
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// Identifier used to key async operations: the uid, falling back to the name.
    pub fn subject_id(&self) -> &str {
        if self.metadata.uid.is_empty() {
            &self.metadata.name
        } else {
            &self.metadata.uid
        }
    }

    /// Look up a nested field by path, e.g. `["spec", "hostPath", "path"]`.
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(*first)?;
        for segment in rest {
            current = current.get(*segment)?;
        }
        Some(current)
    }
}

/// A resource type, e.g. `pods` or `deployments.apps`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn secrets() -> Self {
        Self::new("", "secrets")
    }

    pub fn pods() -> Self {
        Self::new("", "pods")
    }

    pub fn persistent_volumes() -> Self {
        Self::new("", "persistentvolumes")
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

impl std::str::FromStr for GroupResource {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, group) = s.split_once('.').unwrap_or((s, ""));
        if resource.is_empty() {
            return Err(FerryError::InvalidItem(format!(
                "invalid group resource {s:?}"
            )));
        }
        Ok(Self::new(group, resource))
    }
}

impl TryFrom<String> for GroupResource {
    type Error = FerryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupResource> for String {
    fn from(value: GroupResource) -> Self {
        value.to_string()
    }
}

/// Points the orchestrator at another resource to back up, restore or re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    pub group_resource: GroupResource,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentifier {
    pub fn new(group_resource: GroupResource, namespace: &str, name: &str) -> Self {
        Self {
            group_resource,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Which resources a hook wants to be invoked for. The zero value matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    #[serde(default)]
    pub included_resources: Vec<String>,
    #[serde(default)]
    pub excluded_resources: Vec<String>,
    #[serde(default)]
    pub included_namespaces: Vec<String>,
    #[serde(default)]
    pub excluded_namespaces: Vec<String>,
}

impl ResourceSelector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn including(resources: &[&str]) -> Self {
        Self {
            included_resources: resources.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn excluding(resources: &[&str]) -> Self {
        Self {
            excluded_resources: resources.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn matches(&self, resource: &GroupResource, namespace: &str) -> bool {
        let qualified = resource.to_string();
        let hit = |entry: &String| {
            entry == "*" || *entry == resource.resource || *entry == qualified
        };
        if self.excluded_resources.iter().any(hit) {
            return false;
        }
        if !self.included_resources.is_empty() && !self.included_resources.iter().any(hit) {
            return false;
        }

        // cluster-scoped resources are not filtered by namespace
        if namespace.is_empty() {
            return true;
        }
        let ns_hit = |entry: &String| entry == "*" || entry == namespace;
        if self.excluded_namespaces.iter().any(ns_hit) {
            return false;
        }
        self.included_namespaces.is_empty() || self.included_namespaces.iter().any(ns_hit)
    }
}

/// Lifecycle phase of a backup or restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    New,
    InProgress,
    WaitingForPluginOperations,
    WaitingForPluginOperationsPartiallyFailed,
    Finalizing,
    FinalizingPartiallyFailed,
    Completed,
    PartiallyFailed,
    Failed,
}

impl Phase {
    pub fn is_finalizing(self) -> bool {
        matches!(self, Phase::Finalizing | Phase::FinalizingPartiallyFailed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub start_timestamp: Option<DateTime<Utc>>,
}

/// Read-only view of the backup or restore a hook is invoked under.
pub trait ParentOperation: Send + Sync {
    fn kind(&self) -> &'static str;
    fn metadata(&self) -> &ObjectMeta;
    fn status(&self) -> &OperationStatus;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata().annotations.get(key).map(String::as_str)
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.status().start_timestamp
    }

    fn is_finalizing(&self) -> bool {
        self.status().phase.is_finalizing()
    }
}

macro_rules! parent_operation {
    ($ty:ident, $kind:literal) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $ty {
            #[serde(default)]
            pub metadata: ObjectMeta,
            #[serde(default)]
            pub status: OperationStatus,
        }

        impl $ty {
            pub fn new(namespace: &str, name: &str) -> Self {
                Self {
                    metadata: ObjectMeta {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                        ..ObjectMeta::default()
                    },
                    status: OperationStatus::default(),
                }
            }

            pub fn started(mut self, at: DateTime<Utc>) -> Self {
                self.status.start_timestamp = Some(at);
                self.status.phase = Phase::InProgress;
                self
            }

            pub fn with_phase(mut self, phase: Phase) -> Self {
                self.status.phase = phase;
                self
            }

            pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
                self.metadata
                    .annotations
                    .insert(key.to_string(), value.to_string());
                self
            }
        }

        impl ParentOperation for $ty {
            fn kind(&self) -> &'static str {
                $kind
            }

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn status(&self) -> &OperationStatus {
                &self.status
            }
        }
    };
}

parent_operation!(Backup, "Backup");
parent_operation!(Restore, "Restore");

/// Point-in-time progress of an async operation. Recomputed on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgress {
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    pub n_completed: i64,
    pub n_total: i64,
    pub operation_units: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    pub updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_id_prefers_uid() {
        let item = Item::new("v1", "ConfigMap", "ns", "cm").with_uid("abc-123");
        assert_eq!(item.subject_id(), "abc-123");
        let item = Item::new("v1", "ConfigMap", "ns", "cm");
        assert_eq!(item.subject_id(), "cm");
    }

    #[test]
    fn item_json_keeps_unknown_fields() {
        let json = r#"{
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {"name": "pv-1", "annotations": {"a": "b"}},
            "spec": {"hostPath": {"path": "/data/pv-1"}}
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.name(), "pv-1");
        assert_eq!(item.annotation("a"), Some("b"));
        assert_eq!(
            item.field(&["spec", "hostPath", "path"]).and_then(Value::as_str),
            Some("/data/pv-1")
        );

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["spec"]["hostPath"]["path"], "/data/pv-1");
        assert_eq!(back["apiVersion"], "v1");
    }

    #[test]
    fn group_resource_display_and_parse() {
        let gr: GroupResource = "deployments.apps".parse().unwrap();
        assert_eq!(gr.group, "apps");
        assert_eq!(gr.resource, "deployments");
        assert_eq!(gr.to_string(), "deployments.apps");
        assert_eq!(GroupResource::secrets().to_string(), "secrets");
        assert!("".parse::<GroupResource>().is_err());
    }

    #[test]
    fn resource_identifier_serializes_group_resource_as_string() {
        let id = ResourceIdentifier::new(GroupResource::secrets(), "ns", "web-x1y2z");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["groupResource"], "secrets");
        let back: ResourceIdentifier = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn selector_zero_value_matches_all() {
        let sel = ResourceSelector::all();
        assert!(sel.matches(&GroupResource::pods(), "default"));
        assert!(sel.matches(&GroupResource::new("apps", "deployments"), ""));
    }

    #[test]
    fn selector_excludes_win() {
        let sel = ResourceSelector::excluding(&["secrets"]);
        assert!(!sel.matches(&GroupResource::secrets(), "ns"));
        assert!(sel.matches(&GroupResource::pods(), "ns"));

        let sel = ResourceSelector::including(&["pods"]);
        assert!(sel.matches(&GroupResource::pods(), "ns"));
        assert!(!sel.matches(&GroupResource::secrets(), "ns"));
    }

    #[test]
    fn selector_namespaces() {
        let sel = ResourceSelector {
            excluded_namespaces: vec!["kube-system".into()],
            ..ResourceSelector::default()
        };
        assert!(!sel.matches(&GroupResource::pods(), "kube-system"));
        assert!(sel.matches(&GroupResource::pods(), "default"));
        assert!(sel.matches(&GroupResource::persistent_volumes(), ""));
    }

    #[test]
    fn finalizing_phases() {
        let backup = Backup::new("velero", "b1").with_phase(Phase::FinalizingPartiallyFailed);
        assert!(backup.is_finalizing());
        let restore = Restore::new("velero", "r1").with_phase(Phase::InProgress);
        assert!(!restore.is_finalizing());
        assert_eq!(restore.kind(), "Restore");
    }

    #[test]
    fn parent_operation_json() {
        let json = r#"{
            "metadata": {"namespace": "velero", "name": "b1", "annotations": {"k": "v"}},
            "status": {"phase": "InProgress", "startTimestamp": "2024-01-01T00:00:00Z"}
        }"#;
        let backup: Backup = serde_json::from_str(json).unwrap();
        assert_eq!(backup.annotation("k"), Some("v"));
        assert_eq!(backup.status.phase, Phase::InProgress);
        assert!(backup.started_at().is_some());
    }
}
