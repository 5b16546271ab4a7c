//! Export Dispatcher Tests
//!
//! Tests for concurrent export dispatch covering:
//! - Per-record failure isolation within a batch
//! - Anchor fold-back on creation
//! - Partial-update versus read-modify-write routing
//! - Incremental membership reconciliation
//! - Deprovisioning policy and cancellation behavior

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use xavyo_sync_connector::context::ExportContext;
use xavyo_sync_connector::error::{SyncError, SyncResult};
use xavyo_sync_connector::export::ExportDispatcher;
use xavyo_sync_connector::prelude::*;
use xavyo_sync_connector::record::AttributeChange;
use xavyo_sync_connector::schema::AttributeDataType;
use xavyo_sync_connector::types::DeprovisioningPolicy;

// =============================================================================
// Mock Remote Store
// =============================================================================

/// Store that records every call and serves objects from an in-memory map.
struct RecordingStore {
    objects: Mutex<HashMap<String, HashMap<String, AttributeValue>>>,
    calls: Mutex<Vec<String>>,
    missing: Vec<String>,
    created: AtomicUsize,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            missing: Vec::new(),
            created: AtomicUsize::new(0),
        }
    }

    fn with_object(self, id: &str, attributes: HashMap<String, AttributeValue>) -> Self {
        self.objects.lock().unwrap().insert(id.to_string(), attributes);
        self
    }

    fn with_missing(mut self, ids: &[&str]) -> Self {
        self.missing = ids.iter().map(ToString::to_string).collect();
        self
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    async fn create(
        &self,
        object_type: &str,
        _attributes: HashMap<String, AttributeValue>,
    ) -> SyncResult<String> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        self.log(format!("create:{object_type}"));
        Ok(format!("00new{n}"))
    }

    async fn get(
        &self,
        _object_type: &str,
        id: &str,
    ) -> SyncResult<HashMap<String, AttributeValue>> {
        self.log(format!("get:{id}"));
        self.objects
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::not_found(id))
    }

    async fn update(
        &self,
        _object_type: &str,
        id: &str,
        attributes: HashMap<String, AttributeValue>,
    ) -> SyncResult<()> {
        let mut keys: Vec<&String> = attributes.keys().collect();
        keys.sort();
        let keys: Vec<&str> = keys.into_iter().map(String::as_str).collect();
        self.log(format!("update:{id}:{}", keys.join(",")));
        Ok(())
    }

    async fn update_partial(
        &self,
        _object_type: &str,
        id: &str,
        attributes: HashMap<String, AttributeValue>,
    ) -> SyncResult<()> {
        let mut keys: Vec<&String> = attributes.keys().collect();
        keys.sort();
        let keys: Vec<&str> = keys.into_iter().map(String::as_str).collect();
        self.log(format!("update_partial:{id}:{}", keys.join(",")));
        Ok(())
    }

    async fn add_member(&self, _object_type: &str, id: &str, member: &str) -> SyncResult<()> {
        self.log(format!("add_member:{id}:{member}"));
        Ok(())
    }

    async fn remove_member(&self, _object_type: &str, id: &str, member: &str) -> SyncResult<()> {
        self.log(format!("remove_member:{id}:{member}"));
        Ok(())
    }

    async fn deactivate(&self, _object_type: &str, id: &str) -> SyncResult<()> {
        if self.missing.iter().any(|m| m == id) {
            return Err(SyncError::not_found(id));
        }
        self.log(format!("deactivate:{id}"));
        Ok(())
    }

    async fn delete(&self, _object_type: &str, id: &str) -> SyncResult<()> {
        self.log(format!("delete:{id}"));
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn dispatcher(store: Arc<RecordingStore>, context: Arc<ExportContext>) -> ExportDispatcher {
    ExportDispatcher::new(
        store,
        Arc::new(HandlerRegistry::with_builtins()),
        context,
        4,
    )
}

fn login_update(id: &str) -> ChangeRecord {
    let mut record = ChangeRecord::new(id, "user", "id", ObjectModification::Update);
    record.push_change(AttributeChange::replace(
        "login",
        AttributeDataType::String,
        format!("{id}@example.com").into(),
    ));
    record
}

fn delete_record(id: &str) -> ChangeRecord {
    ChangeRecord::new(id, "user", "id", ObjectModification::Delete)
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test]
async fn test_failed_records_do_not_poison_the_batch() {
    let store = Arc::new(RecordingStore::new().with_missing(&["00u8", "00u9"]));
    let dispatcher = dispatcher(Arc::clone(&store), Arc::new(ExportContext::default()));

    let mut batch: Vec<ChangeRecord> = (0..8).map(|i| login_update(&format!("00u{i}"))).collect();
    batch.push(delete_record("00u8"));
    batch.push(delete_record("00u9"));

    let outcomes = dispatcher.put_batch(batch).await.unwrap();

    assert_eq!(outcomes.len(), 10);
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 8);
    let failed: Vec<&ExportOutcome> = outcomes.iter().filter(|o| !o.is_success()).collect();
    assert_eq!(failed.len(), 2);
    for outcome in failed {
        assert_eq!(outcome.error.as_ref().unwrap().code, "OBJECT_NOT_FOUND");
        assert!(outcome.record_id == "00u8" || outcome.record_id == "00u9");
    }
}

#[tokio::test]
async fn test_unsupported_intent_is_a_per_record_failure() {
    let store = Arc::new(RecordingStore::new());
    let dispatcher = dispatcher(Arc::clone(&store), Arc::new(ExportContext::default()));

    let batch = vec![
        login_update("00u1"),
        ChangeRecord::new("00u2", "user", "id", ObjectModification::Replace),
    ];
    let outcomes = dispatcher.put_batch(batch).await.unwrap();

    let failed = outcomes.iter().find(|o| o.record_id == "00u2").unwrap();
    assert_eq!(
        failed.error.as_ref().unwrap().code,
        "UNSUPPORTED_MODIFICATION"
    );
    assert!(outcomes.iter().find(|o| o.record_id == "00u1").unwrap().is_success());
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_add_folds_assigned_identifier_back_as_anchor() {
    let store = Arc::new(RecordingStore::new());
    let dispatcher = dispatcher(Arc::clone(&store), Arc::new(ExportContext::default()));

    let mut record = ChangeRecord::new("temp-1", "user", "id", ObjectModification::Add);
    record.push_change(AttributeChange::add(
        "login",
        AttributeDataType::String,
        "new@example.com".into(),
    ));

    let outcomes = dispatcher.put_batch(vec![record]).await.unwrap();
    let outcome = &outcomes[0];

    assert!(outcome.is_success());
    let anchor = &outcome.anchor_changes[0];
    assert_eq!(anchor.name, "id");
    assert_eq!(anchor.single_value().unwrap().as_string(), Some("00new0"));
    assert!(store.called("create:user"));
}

// =============================================================================
// Update Routing
// =============================================================================

#[tokio::test]
async fn test_scalar_changes_take_the_partial_path() {
    let store = Arc::new(RecordingStore::new());
    let dispatcher = dispatcher(Arc::clone(&store), Arc::new(ExportContext::default()));

    let outcomes = dispatcher.put_batch(vec![login_update("00u1")]).await.unwrap();

    assert!(outcomes[0].is_success());
    assert!(store.called("update_partial:00u1:login"));
    assert!(!store.called("get:"));
    assert!(!store.called("update:"));
}

#[tokio::test]
async fn test_full_object_attribute_forces_read_modify_write() {
    let store = Arc::new(
        RecordingStore::new().with_object(
            "00u1",
            HashMap::from([
                ("login".to_string(), AttributeValue::from("j@example.com")),
                ("suspended".to_string(), AttributeValue::from(false)),
            ]),
        ),
    );
    let dispatcher = dispatcher(Arc::clone(&store), Arc::new(ExportContext::default()));

    // `suspended` is declared as needing the full object on write.
    let mut record = ChangeRecord::new("00u1", "user", "id", ObjectModification::Update);
    record.push_change(AttributeChange::replace(
        "suspended",
        AttributeDataType::Boolean,
        true.into(),
    ));

    let outcomes = dispatcher.put_batch(vec![record]).await.unwrap();

    assert!(outcomes[0].is_success());
    assert!(store.called("get:00u1"));
    assert!(store.called("update:00u1:login,suspended"));
    assert!(!store.called("update_partial:"));
}

#[tokio::test]
async fn test_membership_changes_use_incremental_calls() {
    let store = Arc::new(
        RecordingStore::new().with_object(
            "00g1",
            HashMap::from([
                ("name".to_string(), AttributeValue::from("eng")),
                (
                    "member".to_string(),
                    AttributeValue::Array(vec!["00uA".into(), "00uB".into()]),
                ),
            ]),
        ),
    );
    let dispatcher = dispatcher(Arc::clone(&store), Arc::new(ExportContext::default()));

    // Desired membership is {A, C}: keep A, add C, remove B.
    let mut record = ChangeRecord::new("00g1", "group", "id", ObjectModification::Update);
    record.push_change(AttributeChange::replace_multi(
        "member",
        AttributeDataType::Reference,
        vec!["00uA".into(), "00uC".into()],
    ));

    let outcomes = dispatcher.put_batch(vec![record]).await.unwrap();

    assert!(outcomes[0].is_success());
    assert!(store.called("add_member:00g1:00uC"));
    assert!(store.called("remove_member:00g1:00uB"));
    assert!(!store.called("add_member:00g1:00uA"));
    // The write-back payload carries everything except the membership list.
    assert!(store.called("update:00g1:name"));
}

// =============================================================================
// Deletion and Policy
// =============================================================================

#[tokio::test]
async fn test_delete_policy_deactivates_then_removes() {
    let store = Arc::new(RecordingStore::new());
    let context = Arc::new(ExportContext::new(DeprovisioningPolicy::Delete));
    let dispatcher = dispatcher(Arc::clone(&store), context);

    let outcomes = dispatcher.put_batch(vec![delete_record("00u1")]).await.unwrap();

    assert!(outcomes[0].is_success());
    let calls = store.calls();
    assert_eq!(calls, vec!["deactivate:00u1", "delete:00u1"]);
}

#[tokio::test]
async fn test_deactivate_policy_never_deletes() {
    let store = Arc::new(RecordingStore::new());
    let context = Arc::new(ExportContext::new(DeprovisioningPolicy::Deactivate));
    let dispatcher = dispatcher(Arc::clone(&store), context);

    let outcomes = dispatcher.put_batch(vec![delete_record("00u1")]).await.unwrap();

    assert!(outcomes[0].is_success());
    assert!(store.called("deactivate:00u1"));
    assert!(!store.called("delete:"));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancelled_records_come_back_unapplied() {
    let store = Arc::new(RecordingStore::new());
    let context = Arc::new(ExportContext::default());
    context.cancellation.cancel();
    let dispatcher = dispatcher(Arc::clone(&store), context);

    let batch: Vec<ChangeRecord> = (0..4).map(|i| login_update(&format!("00u{i}"))).collect();
    let outcomes = dispatcher.put_batch(batch).await.unwrap();

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| !o.is_success()));
    assert!(outcomes
        .iter()
        .all(|o| o.error.as_ref().unwrap().code == "CANCELLED"));
    assert!(store.calls().is_empty());
}
