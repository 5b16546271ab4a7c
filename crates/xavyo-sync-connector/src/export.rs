//! Concurrent export dispatch.
//!
//! Applies a batch of outbound [`ChangeRecord`]s to the remote store, fanning
//! records out across a bounded worker pool. Per-record failures become
//! failed [`ExportOutcome`]s; the batch call itself only fails when the
//! dispatcher cannot run at all.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::context::ExportContext;
use crate::error::{SyncError, SyncResult};
use crate::record::{AttributeChange, AttributeModification, ChangeRecord, ExportOutcome};
use crate::registry::{HandlerRegistry, ObjectTypeHandler};
use crate::schema::AttributeDataType;
use crate::source::RemoteStore;
use crate::types::{DeprovisioningPolicy, ObjectModification};
use crate::value::AttributeValue;

/// Fans outbound change records out to the remote store.
pub struct ExportDispatcher {
    store: Arc<dyn RemoteStore>,
    registry: Arc<HandlerRegistry>,
    context: Arc<ExportContext>,
    concurrency: usize,
}

impl ExportDispatcher {
    /// Create a dispatcher over a store and handler registry.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        registry: Arc<HandlerRegistry>,
        context: Arc<ExportContext>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            registry,
            context,
            concurrency: concurrency.max(1),
        }
    }

    /// Apply one batch, returning an outcome per record.
    ///
    /// Records after a cancellation signal are not applied; they come back as
    /// failed outcomes so the caller can retry them later.
    #[instrument(skip(self, records), fields(batch_size = records.len()))]
    pub async fn put_batch(&self, records: Vec<ChangeRecord>) -> SyncResult<Vec<ExportOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let outcomes: Arc<Mutex<Vec<ExportOutcome>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(records.len());

        for record in records {
            if self.context.cancellation.is_cancelled() {
                let mut guard = outcomes.lock().await;
                guard.push(ExportOutcome::failed(&record.id, &SyncError::Cancelled));
                self.context.record_error();
                continue;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| SyncError::source(e.to_string()))?;

            let record_id = record.id.clone();
            let store = Arc::clone(&self.store);
            let registry = Arc::clone(&self.registry);
            let context = Arc::clone(&self.context);
            let outcomes = Arc::clone(&outcomes);

            let handle = tokio::spawn(async move {
                let outcome = match apply_record(&*store, &registry, &context, &record).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(id = %record.id, error = %err, "export record failed");
                        ExportOutcome::failed(&record.id, &err)
                    }
                };

                if outcome.is_success() {
                    context.record_exported();
                } else {
                    context.record_error();
                }

                let mut guard = outcomes.lock().await;
                guard.push(outcome);
                drop(permit);
            });
            handles.push((record_id, handle));
        }

        for (record_id, handle) in handles {
            if handle.await.is_err() {
                let mut guard = outcomes.lock().await;
                guard.push(ExportOutcome::failed(
                    &record_id,
                    &SyncError::item_failed(&record_id, "export task panicked"),
                ));
                self.context.record_error();
            }
        }

        let results = Arc::try_unwrap(outcomes)
            .map_err(|_| SyncError::source("export outcomes still shared"))?
            .into_inner();
        debug!(
            run_id = %self.context.run_id,
            applied = results.iter().filter(|o| o.is_success()).count(),
            failed = results.iter().filter(|o| !o.is_success()).count(),
            "export batch applied"
        );
        Ok(results)
    }
}

async fn apply_record(
    store: &dyn RemoteStore,
    registry: &HandlerRegistry,
    context: &ExportContext,
    record: &ChangeRecord,
) -> SyncResult<ExportOutcome> {
    let handler = registry.get(&record.object_type).ok_or_else(|| {
        SyncError::item_failed(
            &record.id,
            format!("no handler registered for type '{}'", record.object_type),
        )
    })?;

    match record.modification {
        ObjectModification::Add => apply_add(store, &*handler, record).await,
        ObjectModification::Update => apply_update(store, &*handler, record).await,
        ObjectModification::Delete => apply_delete(store, context, record).await,
        other => Err(SyncError::unsupported_modification(other, &record.id)),
    }
}

/// Create the object and fold the newly assigned identifier back as an
/// anchor change.
async fn apply_add(
    store: &dyn RemoteStore,
    handler: &dyn ObjectTypeHandler,
    record: &ChangeRecord,
) -> SyncResult<ExportOutcome> {
    let mut attributes = HashMap::new();
    for change in &record.attribute_changes {
        if change.modification == AttributeModification::Delete {
            continue;
        }
        attributes.insert(change.name.clone(), change_value(change));
    }

    let new_id = store.create(&record.object_type, attributes).await?;
    let anchor = AttributeChange::add(
        &handler.schema().anchor_attribute,
        AttributeDataType::String,
        AttributeValue::String(new_id),
    );
    Ok(ExportOutcome::success_with_anchors(&record.id, vec![anchor]))
}

/// Apply an update, choosing between a partial write and a full
/// read-modify-write.
///
/// The partial path applies only when every change is a scalar add/replace
/// whose schema attribute neither is a reference nor demands the full
/// object. Anything else reads the current state, merges, and writes back.
async fn apply_update(
    store: &dyn RemoteStore,
    handler: &dyn ObjectTypeHandler,
    record: &ChangeRecord,
) -> SyncResult<ExportOutcome> {
    if is_partial_update(handler, record) {
        let attributes = record
            .attribute_changes
            .iter()
            .map(|c| (c.name.clone(), change_value(c)))
            .collect();
        store
            .update_partial(&record.object_type, &record.id, attributes)
            .await?;
        return Ok(ExportOutcome::success(&record.id));
    }

    let mut current = store.get(&record.object_type, &record.id).await?;

    for change in &record.attribute_changes {
        let schema_attr = handler.schema().get_attribute(&change.name);
        let is_multi_reference = schema_attr
            .map(|a| a.multi_valued && a.data_type == AttributeDataType::Reference)
            .unwrap_or(false);

        if is_multi_reference {
            // References are reconciled through the store's incremental
            // membership primitives, not the write-back payload.
            apply_membership(store, record, change, &mut current).await?;
            continue;
        }

        match change.modification {
            AttributeModification::Delete => {
                current.remove(&change.name);
            }
            AttributeModification::Add | AttributeModification::Replace => {
                current.insert(change.name.clone(), change_value(change));
            }
        }
    }

    store.update(&record.object_type, &record.id, current).await?;
    Ok(ExportOutcome::success(&record.id))
}

/// Reconcile one multi-valued reference attribute with incremental add and
/// remove calls.
async fn apply_membership(
    store: &dyn RemoteStore,
    record: &ChangeRecord,
    change: &AttributeChange,
    current: &mut HashMap<String, AttributeValue>,
) -> SyncResult<()> {
    let existing: Vec<AttributeValue> = current
        .remove(&change.name)
        .map(AttributeValue::into_values)
        .unwrap_or_default();
    let desired = &change.values;

    for member in desired.iter().filter(|v| !existing.contains(v)) {
        if let Some(id) = member.as_string() {
            store.add_member(&record.object_type, &record.id, id).await?;
        }
    }
    for member in existing.iter().filter(|v| !desired.contains(v)) {
        if let Some(id) = member.as_string() {
            store
                .remove_member(&record.object_type, &record.id, id)
                .await?;
        }
    }
    Ok(())
}

/// Deactivate, and under the delete policy also permanently remove.
async fn apply_delete(
    store: &dyn RemoteStore,
    context: &ExportContext,
    record: &ChangeRecord,
) -> SyncResult<ExportOutcome> {
    store.deactivate(&record.object_type, &record.id).await?;
    if context.deprovisioning == DeprovisioningPolicy::Delete {
        store.delete(&record.object_type, &record.id).await?;
    }
    Ok(ExportOutcome::success(&record.id))
}

fn is_partial_update(handler: &dyn ObjectTypeHandler, record: &ChangeRecord) -> bool {
    record.attribute_changes.iter().all(|change| {
        if change.modification == AttributeModification::Delete || change.values.len() > 1 {
            return false;
        }
        match handler.schema().get_attribute(&change.name) {
            Some(attr) => {
                !attr.multi_valued
                    && attr.data_type != AttributeDataType::Reference
                    && !attr.requires_full_object
            }
            None => true,
        }
    })
}

fn change_value(change: &AttributeChange) -> AttributeValue {
    match change.single_value() {
        Some(value) => value.clone(),
        None if change.values.is_empty() => AttributeValue::Null,
        None => AttributeValue::Array(change.values.clone()),
    }
}
