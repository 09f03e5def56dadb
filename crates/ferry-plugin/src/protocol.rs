//! Line-delimited JSON messages exchanged with the orchestrator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ferry_actions::ExecuteOutput;
use ferry_core::types::{GroupResource, Item, ResourceIdentifier};

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub plugin: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Item as mutated before a failed `execute` gave up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<Item>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
            partial: None,
        }
    }

    pub fn err(id: Value, kind: ErrorKind, message: String, partial: Option<Item>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody { kind, message }),
            partial,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidOperationId,
    Conflict,
    Store,
    UnknownPlugin,
    UnknownMethod,
    BadRequest,
    Internal,
}

// Params. `parent` is the Backup or Restore the call belongs to.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams<P> {
    pub item: Item,
    pub parent: P,
    /// Resource the item belongs to, checked against the plugin's selector.
    #[serde(default)]
    pub resource: Option<GroupResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationParams<P> {
    pub operation_id: String,
    pub parent: P,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalItemsParams<P> {
    #[serde(default)]
    pub additional_items: Vec<ResourceIdentifier>,
    pub parent: P,
}

#[derive(Debug, Deserialize)]
pub struct InitParams {
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectParams {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct PutObjectParams {
    pub bucket: String,
    pub key: String,
    /// Base64-encoded object body.
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct PrefixParams {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub delimiter: String,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlParams {
    pub bucket: String,
    pub key: String,
    pub ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeParams {
    pub snapshot_id: String,
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub volume_az: String,
    #[serde(default)]
    pub iops: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeParams {
    pub volume_id: String,
    #[serde(default)]
    pub volume_az: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotParams {
    pub volume_id: String,
    #[serde(default)]
    pub volume_az: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotParams {
    pub snapshot_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParams {
    pub item: Item,
    #[serde(default)]
    pub volume_id: String,
}

/// Wire form of [`ExecuteOutput`]. An empty `operationId` means the call was synchronous.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub item: Item,
    pub additional_items: Vec<ResourceIdentifier>,
    pub operation_id: String,
    pub items_to_update: Vec<ResourceIdentifier>,
}

impl From<ExecuteOutput> for ExecuteResult {
    fn from(out: ExecuteOutput) -> Self {
        Self {
            item: out.item,
            additional_items: out.additional_items,
            operation_id: out.operation_id.map(|t| t.encode()).unwrap_or_default(),
            items_to_update: out.items_to_update,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfoResult {
    pub volume_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,
}
