//! Shared engine behind the v2 backup and restore hooks.
//!
//! `start` decides whether an item gets a long-running operation, optionally
//! creates a side record, and builds the operation token. `progress` decodes the
//! token, bumps the side record's poll counter and evaluates completion from the
//! parent operation's start time.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;

use ferry_core::clock::Clock;
use ferry_core::config::AsyncActionConfig;
use ferry_core::error::{FerryError, Result};
use ferry_core::operation::{OperationToken, RecordRef, ensure_token_field, evaluate_progress};
use ferry_core::types::{GroupResource, Item, OperationProgress, ParentOperation, ResourceIdentifier};
use ferry_records::ResourceStore;

use crate::action::{ExecuteError, ExecuteOutput};
use crate::directives::resolve_duration;

/// An operation handed back to the orchestrator by `execute`.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedOperation {
    pub token: OperationToken,
    pub items_to_update: Vec<ResourceIdentifier>,
}

pub struct AsyncOperations {
    marker: &'static str,
    config: AsyncActionConfig,
    records: Arc<dyn ResourceStore>,
    clock: Arc<dyn Clock>,
}

impl AsyncOperations {
    /// `marker` is the annotation set to `"1"` on every item passed to `execute`.
    pub fn new(
        marker: &'static str,
        config: AsyncActionConfig,
        records: Arc<dyn ResourceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            marker,
            config,
            records,
            clock,
        }
    }

    pub fn config(&self) -> &AsyncActionConfig {
        &self.config
    }

    /// Mark `item`, then start an operation for it if its directives ask for one.
    pub async fn execute<P>(
        &self,
        mut item: Item,
        parent: &P,
    ) -> std::result::Result<ExecuteOutput, ExecuteError>
    where
        P: ParentOperation + ?Sized,
    {
        item.set_annotation(self.marker, "1");
        match self.start(&mut item, parent).await {
            Ok(Some(started)) => {
                Ok(ExecuteOutput::new(item).with_operation(started.token, started.items_to_update))
            }
            Ok(None) => Ok(ExecuteOutput::new(item)),
            Err(e) => Err(ExecuteError::new(item, e)),
        }
    }

    /// Start an operation for `item` if its directives ask for one.
    ///
    /// Annotates `item` with the side record's name when one is created. On error the
    /// caller still owns whatever edits were already applied to `item`.
    pub async fn start<P>(&self, item: &mut Item, parent: &P) -> Result<Option<StartedOperation>>
    where
        P: ParentOperation + ?Sized,
    {
        if parent.is_finalizing() {
            tracing::debug!(
                parent = parent.name(),
                item = item.name(),
                "parent is finalizing, not starting an operation"
            );
            return Ok(None);
        }

        let Some(duration) = resolve_duration(&self.config.duration_annotation, item, parent)
        else {
            return Ok(None);
        };

        if item.subject_id().is_empty() {
            return Err(FerryError::InvalidItem(
                "item has neither a uid nor a name".to_string(),
            ));
        }
        let mut token = OperationToken::new(item.subject_id(), duration, None)?;

        let mut items_to_update = Vec::new();
        if item.annotation(&self.config.additional_update_annotation) == Some("true") {
            // the record is named after the item and lands in the token
            ensure_token_field("item namespace", item.namespace())?;
            ensure_token_field("item name", item.name())?;

            let record = self.create_record(item).await?;
            token = token.with_record(RecordRef::new(record.namespace(), record.name()))?;
            item.set_annotation(&self.config.record_annotation, record.name());
            items_to_update.push(ResourceIdentifier::new(
                GroupResource::secrets(),
                record.namespace(),
                record.name(),
            ));
        }

        tracing::info!(
            kind = %item.kind,
            namespace = item.namespace(),
            name = item.name(),
            operation_id = %token,
            "started async operation"
        );

        Ok(Some(StartedOperation {
            token,
            items_to_update,
        }))
    }

    /// Poll an operation. Calling this repeatedly with the same inputs yields the same
    /// result apart from the side record's poll counter.
    pub async fn progress<P>(&self, operation_id: &str, parent: &P) -> Result<OperationProgress>
    where
        P: ParentOperation + ?Sized,
    {
        let token = OperationToken::decode(operation_id)?;
        if let Some(record) = token.record() {
            let polls = self.bump_poll_counter(record).await?;
            tracing::debug!(operation_id, polls, "recorded progress poll");
        }
        Ok(evaluate_progress(
            token.duration(),
            parent.started_at(),
            self.clock.now(),
        ))
    }

    /// Cancellation is not supported; the operation runs to its deadline.
    pub async fn cancel<P>(&self, operation_id: &str, parent: &P) -> Result<()>
    where
        P: ParentOperation + ?Sized,
    {
        tracing::debug!(operation_id, parent = parent.name(), "cancel requested, nothing to do");
        Ok(())
    }

    async fn create_record(&self, item: &Item) -> Result<Item> {
        let mut template = Item::new("v1", "Secret", item.namespace(), "")
            .with_label(&self.config.record_label, "true");
        template.metadata.generate_name = format!("{}-", item.name());
        template.fields.insert("type".to_string(), json!("Opaque"));
        template.fields.insert(
            "data".to_string(),
            json!({ "TestObject": BASE64.encode(item.name()) }),
        );

        let record = self
            .records
            .create(&GroupResource::secrets(), template)
            .await
            .map_err(|e| FerryError::store(format!("error creating {} secret", item.name()), e))?;
        tracing::info!(
            namespace = record.namespace(),
            name = record.name(),
            "created side record"
        );
        Ok(record)
    }

    async fn bump_poll_counter(&self, record: &RecordRef) -> Result<u64> {
        let secrets = GroupResource::secrets();
        let key = &self.config.progress_annotation;

        let mut current = self
            .records
            .get(&secrets, &record.namespace, &record.name)
            .await
            .map_err(|e| FerryError::store(format!("error getting {} secret", record.name), e))?;
        let polls = current
            .annotation(key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            .saturating_add(1);
        current.set_annotation(key, &polls.to_string());

        self.records
            .update(&secrets, current)
            .await
            .map_err(|e| FerryError::store(format!("error updating {} secret", record.name), e))?;
        Ok(polls)
    }
}
