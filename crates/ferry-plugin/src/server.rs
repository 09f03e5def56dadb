//! JSON-lines request loop and per-plugin dispatch.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use ferry_actions::{
    AdditionalItemsReady, Applicable, Cancellable, DeleteItemAction, Executable, ExecuteError,
    ExecuteOutput, ItemBlockAction, Pollable,
};
use ferry_core::duration::parse_duration;
use ferry_core::error::FerryError;
use ferry_core::types::{Backup, Item, ParentOperation, ResourceSelector, Restore};
use ferry_snapshot::provider::VolumeSnapshotter;
use ferry_storage::provider::ObjectStore;

use crate::protocol::{
    AdditionalItemsParams, CreateSnapshotParams, CreateVolumeParams, ErrorKind, ExecuteParams,
    ExecuteResult, InitParams, ItemParams, ObjectParams, OperationParams, PrefixParams,
    PutObjectParams, Request, Response, SignedUrlParams, SnapshotParams, VolumeInfoResult,
    VolumeParams,
};
use crate::registry::{Plugin, Registry};

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("unknown plugin {0:?}")]
    UnknownPlugin(String),

    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Ferry(#[from] FerryError),

    /// Carries the item as mutated before the failure. The message is the cause's.
    #[error("{error}")]
    Execute { partial: Box<Item>, error: FerryError },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<ExecuteError> for CallError {
    fn from(e: ExecuteError) -> Self {
        CallError::Execute {
            partial: e.item,
            error: e.source,
        }
    }
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::UnknownPlugin(_) => ErrorKind::UnknownPlugin,
            CallError::UnknownMethod(_) => ErrorKind::UnknownMethod,
            CallError::BadRequest(_) => ErrorKind::BadRequest,
            CallError::Ferry(e) | CallError::Execute { error: e, .. } => ferry_kind(e),
            CallError::Backend(_) => ErrorKind::Internal,
        }
    }

    fn into_partial(self) -> Option<Item> {
        match self {
            CallError::Execute { partial, .. } => Some(*partial),
            _ => None,
        }
    }
}

fn ferry_kind(e: &FerryError) -> ErrorKind {
    match e {
        FerryError::InvalidOperationId(_) => ErrorKind::InvalidOperationId,
        FerryError::Store { .. } if e.is_conflict() => ErrorKind::Conflict,
        FerryError::Store { .. } => ErrorKind::Store,
        FerryError::InvalidItem(_) | FerryError::InvalidDuration(_) => ErrorKind::BadRequest,
        _ => ErrorKind::Internal,
    }
}

type CallResult = Result<Value, CallError>;

pub struct Server {
    registry: Registry,
}

impl Server {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Answer one request per input line until the reader is exhausted.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
        tracing::info!("input closed, shutting down");
        Ok(())
    }

    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::err(
                Value::Null,
                ErrorKind::BadRequest,
                format!("malformed request: {e}"),
                None,
            ),
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let Request {
            id,
            plugin,
            method,
            params,
        } = request;

        match self.dispatch(&plugin, &method, params).await {
            Ok(result) => Response::ok(id, result),
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                tracing::warn!(plugin = %plugin, method = %method, ?kind, "call failed: {message}");
                Response::err(id, kind, message, e.into_partial())
            }
        }
    }

    async fn dispatch(&self, plugin: &str, method: &str, params: Value) -> CallResult {
        let entry = self
            .registry
            .get(plugin)
            .ok_or_else(|| CallError::UnknownPlugin(plugin.to_string()))?;
        tracing::debug!(plugin, method, "dispatching");

        match entry {
            Plugin::BackupAction(action) => match method {
                "applies_to" => to_value(action.applies_to()),
                "execute" => execute::<Backup, _>(&**action, params).await,
                _ => unknown(method),
            },
            Plugin::BackupActionV2(action) => match method {
                "applies_to" => to_value(action.applies_to()),
                "execute" => execute::<Backup, _>(&**action, params).await,
                "progress" => progress::<Backup, _>(&**action, params).await,
                "cancel" => cancel::<Backup, _>(&**action, params).await,
                _ => unknown(method),
            },
            Plugin::RestoreAction(action) => match method {
                "applies_to" => to_value(action.applies_to()),
                "execute" => execute::<Restore, _>(&**action, params).await,
                _ => unknown(method),
            },
            Plugin::RestoreActionV2(action) => match method {
                "applies_to" => to_value(action.applies_to()),
                "execute" => execute::<Restore, _>(&**action, params).await,
                "progress" => progress::<Restore, _>(&**action, params).await,
                "cancel" => cancel::<Restore, _>(&**action, params).await,
                "are_additional_items_ready" => {
                    let p: AdditionalItemsParams<Restore> = parse(params)?;
                    let ready = action
                        .are_additional_items_ready(&p.additional_items, &p.parent)
                        .await?;
                    Ok(json!(ready))
                }
                _ => unknown(method),
            },
            Plugin::DeleteAction(action) => match method {
                "applies_to" => to_value(action.applies_to()),
                "execute" => {
                    let p: ExecuteParams<Backup> = parse(params)?;
                    if selected(action.applies_to(), &p) {
                        action.execute(&p.item, &p.parent).await?;
                    }
                    Ok(Value::Null)
                }
                _ => unknown(method),
            },
            Plugin::ItemBlockAction(action) => match method {
                "applies_to" => to_value(action.applies_to()),
                "get_related_items" => {
                    let p: ExecuteParams<Backup> = parse(params)?;
                    if !selected(action.applies_to(), &p) {
                        return Ok(json!([]));
                    }
                    to_value(action.get_related_items(&p.item, &p.parent).await?)
                }
                _ => unknown(method),
            },
            Plugin::ObjectStore(store) => object_store(&**store, method, params).await,
            Plugin::VolumeSnapshotter(snapshotter) => {
                volume_snapshotter(&**snapshotter, method, params).await
            }
        }
    }
}

fn unknown(method: &str) -> CallResult {
    Err(CallError::UnknownMethod(method.to_string()))
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, CallError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| CallError::BadRequest(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> CallResult {
    serde_json::to_value(value).map_err(|e| CallError::Ferry(e.into()))
}

fn selected<P>(selector: ResourceSelector, params: &ExecuteParams<P>) -> bool {
    params
        .resource
        .as_ref()
        .is_none_or(|resource| selector.matches(resource, params.item.namespace()))
}

async fn execute<P, A>(action: &A, params: Value) -> CallResult
where
    P: ParentOperation + DeserializeOwned,
    A: Executable<P> + ?Sized,
{
    let p: ExecuteParams<P> = parse(params)?;
    if !selected(action.applies_to(), &p) {
        tracing::debug!(
            plugin = action.name(),
            item = p.item.name(),
            "resource not selected, returning item unchanged"
        );
        return to_value(ExecuteResult::from(ExecuteOutput::new(p.item)));
    }
    let out = action.execute(p.item, &p.parent).await?;
    to_value(ExecuteResult::from(out))
}

async fn progress<P, A>(action: &A, params: Value) -> CallResult
where
    P: ParentOperation + DeserializeOwned,
    A: Pollable<P> + ?Sized,
{
    let p: OperationParams<P> = parse(params)?;
    to_value(action.progress(&p.operation_id, &p.parent).await?)
}

async fn cancel<P, A>(action: &A, params: Value) -> CallResult
where
    P: ParentOperation + DeserializeOwned,
    A: Cancellable<P> + ?Sized,
{
    let p: OperationParams<P> = parse(params)?;
    action.cancel(&p.operation_id, &p.parent).await?;
    Ok(Value::Null)
}

async fn object_store(store: &dyn ObjectStore, method: &str, params: Value) -> CallResult {
    match method {
        "init" => {
            let p: InitParams = parse(params)?;
            store.init(&p.config).await?;
            Ok(Value::Null)
        }
        "put_object" => {
            let p: PutObjectParams = parse(params)?;
            let body = BASE64
                .decode(p.body.as_bytes())
                .map_err(|e| CallError::BadRequest(format!("body is not base64: {e}")))?;
            store.put_object(&p.bucket, &p.key, &body).await?;
            Ok(Value::Null)
        }
        "object_exists" => {
            let p: ObjectParams = parse(params)?;
            Ok(json!(store.object_exists(&p.bucket, &p.key).await?))
        }
        "get_object" => {
            let p: ObjectParams = parse(params)?;
            let body = store.get_object(&p.bucket, &p.key).await?;
            Ok(json!({ "body": BASE64.encode(body) }))
        }
        "list_common_prefixes" => {
            let p: PrefixParams = parse(params)?;
            let prefixes = store
                .list_common_prefixes(&p.bucket, &p.prefix, &p.delimiter)
                .await?;
            Ok(json!(prefixes))
        }
        "list_objects" => {
            let p: PrefixParams = parse(params)?;
            Ok(json!(store.list_objects(&p.bucket, &p.prefix).await?))
        }
        "delete_object" => {
            let p: ObjectParams = parse(params)?;
            store.delete_object(&p.bucket, &p.key).await?;
            Ok(Value::Null)
        }
        "create_signed_url" => {
            let p: SignedUrlParams = parse(params)?;
            let ttl = parse_duration(&p.ttl).map_err(|e| CallError::BadRequest(e.to_string()))?;
            Ok(json!(store.create_signed_url(&p.bucket, &p.key, ttl).await?))
        }
        _ => unknown(method),
    }
}

async fn volume_snapshotter(
    snapshotter: &dyn VolumeSnapshotter,
    method: &str,
    params: Value,
) -> CallResult {
    match method {
        "init" => {
            let p: InitParams = parse(params)?;
            snapshotter.init(&p.config).await?;
            Ok(Value::Null)
        }
        "create_volume_from_snapshot" => {
            let p: CreateVolumeParams = parse(params)?;
            let volume_id = snapshotter
                .create_volume_from_snapshot(&p.snapshot_id, &p.volume_type, &p.volume_az, p.iops)
                .await?;
            Ok(json!(volume_id))
        }
        "get_volume_info" => {
            let p: VolumeParams = parse(params)?;
            let info = snapshotter.get_volume_info(&p.volume_id, &p.volume_az).await?;
            to_value(VolumeInfoResult {
                volume_type: info.volume_type,
                iops: info.iops,
            })
        }
        "is_volume_ready" => {
            let p: VolumeParams = parse(params)?;
            Ok(json!(
                snapshotter.is_volume_ready(&p.volume_id, &p.volume_az).await?
            ))
        }
        "create_snapshot" => {
            let p: CreateSnapshotParams = parse(params)?;
            let snapshot_id = snapshotter
                .create_snapshot(&p.volume_id, &p.volume_az, &p.tags)
                .await?;
            Ok(json!(snapshot_id))
        }
        "delete_snapshot" => {
            let p: SnapshotParams = parse(params)?;
            snapshotter.delete_snapshot(&p.snapshot_id).await?;
            Ok(Value::Null)
        }
        "get_volume_id" => {
            let p: ItemParams = parse(params)?;
            Ok(json!(snapshotter.get_volume_id(&p.item)?))
        }
        "set_volume_id" => {
            let p: ItemParams = parse(params)?;
            to_value(snapshotter.set_volume_id(p.item, &p.volume_id)?)
        }
        _ => unknown(method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ferry_core::clock::ManualClock;
    use ferry_core::config::FerryConfig;
    use ferry_records::SqliteResourceStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        server: Server,
        clock: Arc<ManualClock>,
        _objects: TempDir,
    }

    fn harness() -> Harness {
        let objects = TempDir::new().unwrap();
        let mut config = FerryConfig::default();
        config.ferry.object_store_root = objects.path().display().to_string();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let registry = Registry::standard(
            &config,
            Arc::new(SqliteResourceStore::open_in_memory().unwrap()),
            clock.clone(),
        );
        Harness {
            server: Server::new(registry),
            clock,
            _objects: objects,
        }
    }

    fn backup() -> Value {
        json!({
            "metadata": { "namespace": "velero", "name": "b1" },
            "status": { "phase": "InProgress", "startTimestamp": "2024-05-01T12:00:00Z" }
        })
    }

    async fn call(server: &Server, plugin: &str, method: &str, params: Value) -> Response {
        let line = json!({ "id": 7, "plugin": plugin, "method": method, "params": params });
        server.handle_line(&line.to_string()).await
    }

    #[tokio::test]
    async fn execute_then_progress() {
        let h = harness();
        let item = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "namespace": "app",
                "name": "settings",
                "uid": "abc-123",
                "annotations": { "example.io/example-bia-operation-duration": "30s" }
            },
            "data": { "k": "v" }
        });
        let resp = call(
            &h.server,
            "example.io/backup-pluginv2",
            "execute",
            json!({ "item": item, "parent": backup(), "resource": "configmaps" }),
        )
        .await;
        assert_eq!(resp.id, json!(7));
        let result = resp.result.unwrap();
        assert_eq!(result["operationId"], "abc-123/30s");
        assert_eq!(result["item"]["data"]["k"], "v");
        assert_eq!(
            result["item"]["metadata"]["annotations"]["example.io/my-backup-pluginv2"],
            "1"
        );

        h.clock.advance(chrono::Duration::seconds(10));
        let resp = call(
            &h.server,
            "example.io/backup-pluginv2",
            "progress",
            json!({ "operationId": "abc-123/30s", "parent": backup() }),
        )
        .await;
        let progress = resp.result.unwrap();
        assert_eq!(progress["completed"], false);
        assert_eq!(progress["nCompleted"], 10);
        assert_eq!(progress["nTotal"], 30);
        assert_eq!(progress["operationUnits"], "seconds");
    }

    #[tokio::test]
    async fn unselected_resource_is_returned_unchanged() {
        let h = harness();
        let item = json!({ "apiVersion": "v1", "kind": "Secret", "metadata": { "namespace": "app", "name": "creds" } });
        let resp = call(
            &h.server,
            "example.io/backup-pluginv2",
            "execute",
            json!({ "item": item.clone(), "parent": backup(), "resource": "secrets" }),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["item"], item);
        assert_eq!(result["operationId"], "");
    }

    #[tokio::test]
    async fn bad_token_is_classified() {
        let h = harness();
        let resp = call(
            &h.server,
            "example.io/restore-pluginv2",
            "progress",
            json!({ "operationId": "abc-123/notaduration", "parent": backup() }),
        )
        .await;
        assert_eq!(resp.error.unwrap().kind, ErrorKind::InvalidOperationId);
    }

    #[tokio::test]
    async fn failed_execute_returns_partial_item() {
        let h = harness();
        let item = json!({
            "kind": "ConfigMap",
            "metadata": { "annotations": { "example.io/example-bia-operation-duration": "5s" } }
        });
        let resp = call(
            &h.server,
            "example.io/backup-pluginv2",
            "execute",
            json!({ "item": item, "parent": backup() }),
        )
        .await;
        let error = resp.error.unwrap();
        assert_eq!(error.kind, ErrorKind::BadRequest);
        assert_eq!(error.message, "invalid item: item has neither a uid nor a name");
        let partial = resp.partial.unwrap();
        assert_eq!(partial.annotation("example.io/my-backup-pluginv2"), Some("1"));
    }

    #[tokio::test]
    async fn routing_errors() {
        let h = harness();
        let resp = call(&h.server, "example.io/nope", "execute", Value::Null).await;
        assert_eq!(resp.error.unwrap().kind, ErrorKind::UnknownPlugin);

        let resp = call(&h.server, "example.io/backup-plugin", "progress", Value::Null).await;
        assert_eq!(resp.error.unwrap().kind, ErrorKind::UnknownMethod);

        let resp = call(&h.server, "example.io/backup-plugin", "execute", json!({})).await;
        assert_eq!(resp.error.unwrap().kind, ErrorKind::BadRequest);

        let resp = h.server.handle_line("{not json").await;
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().kind, ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn object_store_calls() {
        let h = harness();
        let plugin = "example.io/object-store-plugin";
        let resp = call(
            &h.server,
            plugin,
            "put_object",
            json!({ "bucket": "b", "key": "backups/b1/b1.tar.gz", "body": BASE64.encode(b"payload") }),
        )
        .await;
        assert!(resp.error.is_none());

        let resp = call(&h.server, plugin, "get_object", json!({ "bucket": "b", "key": "backups/b1/b1.tar.gz" })).await;
        assert_eq!(resp.result.unwrap()["body"], BASE64.encode(b"payload"));

        let resp = call(
            &h.server,
            plugin,
            "create_signed_url",
            json!({ "bucket": "b", "key": "backups/b1/b1.tar.gz", "ttl": "10m" }),
        )
        .await;
        assert_eq!(resp.error.unwrap().kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn item_block_and_restore_helpers() {
        let h = harness();
        let resp = call(
            &h.server,
            "example.io/item-block-action-plugin",
            "get_related_items",
            json!({
                "item": { "kind": "Pod", "metadata": { "namespace": "app", "name": "web-0", "labels": { "itemblock": "web" } } },
                "parent": backup(),
                "resource": "pods"
            }),
        )
        .await;
        assert_eq!(resp.result.unwrap(), json!([]));

        let resp = call(
            &h.server,
            "example.io/restore-pluginv2",
            "are_additional_items_ready",
            json!({ "additionalItems": [], "parent": { "metadata": { "name": "r1" } } }),
        )
        .await;
        assert_eq!(resp.result.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn serve_answers_each_line() {
        let h = harness();
        let input = concat!(
            r#"{"id":1,"plugin":"example.io/delete-plugin","method":"applies_to"}"#,
            "\n\n",
            r#"{"id":2,"plugin":"example.io/restore-plugin","method":"execute","params":{"item":{"metadata":{"name":"x"}},"parent":{}}}"#,
            "\n"
        );
        let mut output = Vec::new();
        h.server.serve(input.as_bytes(), &mut output).await.unwrap();

        let responses: Vec<Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, json!(1));
        assert_eq!(
            responses[1].result.as_ref().unwrap()["item"]["metadata"]["annotations"]["example.io/my-restore-plugin"],
            "1"
        );
    }
}
