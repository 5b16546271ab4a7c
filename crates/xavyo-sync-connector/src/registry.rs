//! Per-object-type strategy handlers.
//!
//! Each synchronized object type supplies its schema, classification policy,
//! and watermark wiring through an [`ObjectTypeHandler`]. Handlers are looked
//! up once at run start from the [`HandlerRegistry`]; the pipeline itself
//! never branches on object-type strings.

use std::collections::HashMap;
use std::sync::Arc;

use crate::classify::{classify, ClassifierPolicy};
use crate::diff::DiffEngine;
use crate::error::SyncResult;
use crate::record::ChangeRecord;
use crate::schema::{group_schema, user_schema, ObjectTypeSchema};
use crate::source::{RawObject, SourceFilter};
use crate::types::{DeltaAddPolicy, ObjectModification, RunMode};
use crate::watermark::{required_watermark, WatermarkSet, WatermarkTracker};

/// Strategy bundle for one object type: classification, diffing, and
/// watermark observation.
pub trait ObjectTypeHandler: Send + Sync {
    /// The object type this handler serves.
    fn object_type(&self) -> &str;

    /// The type's attribute schema.
    fn schema(&self) -> &ObjectTypeSchema;

    /// Classification policy for this type.
    fn policy(&self) -> ClassifierPolicy {
        ClassifierPolicy::default()
    }

    /// Watermark key whose inbound value drives the delta filter.
    fn primary_watermark_key(&self) -> &str;

    /// All watermark keys this type maintains.
    fn watermark_keys(&self) -> Vec<String> {
        vec![self.primary_watermark_key().to_string()]
    }

    /// Build the delta enumeration filter from the inbound watermark set.
    ///
    /// Every cursor the type maintains must be present; a missing one is
    /// fatal before the run starts.
    fn delta_filter(&self, inbound: &WatermarkSet) -> SyncResult<SourceFilter> {
        Ok(SourceFilter::since(
            self.object_type(),
            required_watermark(inbound, self.primary_watermark_key())?,
        ))
    }

    /// Advance the run's watermark cursors from one observed object.
    fn observe(&self, object: &RawObject, tracker: &WatermarkTracker) {
        if let Some(updated) = object.last_updated {
            tracker.advance(self.primary_watermark_key(), updated.timestamp_millis());
        }
    }

    /// Classify and diff one object into a change record.
    ///
    /// `policy` is the run's effective classification policy (a config
    /// override, or this handler's own [`policy`](Self::policy)). `Ok(None)`
    /// means the object is not surfaced (classified `None`); an `Err` is a
    /// per-item failure the pipeline converts into an error-flagged record.
    fn process(
        &self,
        object: &RawObject,
        mode: RunMode,
        watermark_epoch: Option<i64>,
        policy: &ClassifierPolicy,
    ) -> SyncResult<Option<ChangeRecord>> {
        let modification = classify(object, mode, watermark_epoch, policy);
        if modification == ObjectModification::None {
            return Ok(None);
        }
        DiffEngine::new(self.schema())
            .build_record(object, modification)
            .map(Some)
    }
}

/// Built-in handler for the user object type.
pub struct UserHandler {
    schema: ObjectTypeSchema,
    policy: ClassifierPolicy,
}

impl UserHandler {
    /// Create a user handler with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ClassifierPolicy::default())
    }

    /// Create a user handler with an explicit policy.
    #[must_use]
    pub fn with_policy(policy: ClassifierPolicy) -> Self {
        Self {
            schema: user_schema(),
            policy,
        }
    }
}

impl Default for UserHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTypeHandler for UserHandler {
    fn object_type(&self) -> &str {
        "user"
    }

    fn schema(&self) -> &ObjectTypeSchema {
        &self.schema
    }

    fn policy(&self) -> ClassifierPolicy {
        self.policy
    }

    fn primary_watermark_key(&self) -> &str {
        "users"
    }
}

/// Built-in handler for the group object type.
///
/// Groups track two cursors: one for the group itself and one for membership
/// changes, which the source system timestamps separately.
pub struct GroupHandler {
    schema: ObjectTypeSchema,
    policy: ClassifierPolicy,
}

impl GroupHandler {
    /// Create a group handler with the historical group policy: objects
    /// created after the watermark epoch classify as `Add` in delta runs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ClassifierPolicy {
            delta_add: DeltaAddPolicy::AddWhenCreatedAfterWatermark,
            ..Default::default()
        })
    }

    /// Create a group handler with an explicit policy.
    #[must_use]
    pub fn with_policy(policy: ClassifierPolicy) -> Self {
        Self {
            schema: group_schema(),
            policy,
        }
    }
}

impl Default for GroupHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTypeHandler for GroupHandler {
    fn object_type(&self) -> &str {
        "group"
    }

    fn schema(&self) -> &ObjectTypeSchema {
        &self.schema
    }

    fn policy(&self) -> ClassifierPolicy {
        self.policy
    }

    fn primary_watermark_key(&self) -> &str {
        "group"
    }

    fn watermark_keys(&self) -> Vec<String> {
        vec!["group".to_string(), "group-member".to_string()]
    }

    /// The delta filter carries both cursors, so the source can enumerate
    /// groups whose membership changed even when the group itself did not.
    fn delta_filter(&self, inbound: &WatermarkSet) -> SyncResult<SourceFilter> {
        Ok(
            SourceFilter::since("group", required_watermark(inbound, "group")?)
                .with_membership_since(required_watermark(inbound, "group-member")?),
        )
    }

    fn observe(&self, object: &RawObject, tracker: &WatermarkTracker) {
        if let Some(updated) = object.last_updated {
            tracker.advance("group", updated.timestamp_millis());
        }
        if let Some(updated) = object.membership_updated {
            tracker.advance("group-member", updated.timestamp_millis());
        }
    }
}

/// Object type name → handler table, built once before a run starts.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ObjectTypeHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in user and group handlers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UserHandler::new()));
        registry.register(Arc::new(GroupHandler::new()));
        registry
    }

    /// Register a handler, replacing any existing one for the same type.
    pub fn register(&mut self, handler: Arc<dyn ObjectTypeHandler>) {
        self.handlers
            .insert(handler.object_type().to_string(), handler);
    }

    /// Look up the handler for an object type.
    #[must_use]
    pub fn get(&self, object_type: &str) -> Option<Arc<dyn ObjectTypeHandler>> {
        self.handlers.get(object_type).cloned()
    }

    /// Registered object type names.
    #[must_use]
    pub fn object_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LifecycleStatus;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_registry_lookup() {
        let registry = HandlerRegistry::with_builtins();
        assert!(registry.get("user").is_some());
        assert!(registry.get("group").is_some());
        assert!(registry.get("application").is_none());
    }

    #[test]
    fn test_user_handler_process_full_run() {
        let handler = UserHandler::new();
        let policy = handler.policy();
        let obj = RawObject::new("00u1", "user").with_attribute("login", "jsmith");

        let record = handler
            .process(&obj, RunMode::Full, None, &policy)
            .unwrap()
            .unwrap();
        assert_eq!(record.modification, ObjectModification::Add);

        let removed = RawObject::new("00u2", "user").with_status(LifecycleStatus::Deprovisioned);
        assert!(handler
            .process(&removed, RunMode::Full, None, &policy)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_group_handler_tracks_both_cursors() {
        let handler = GroupHandler::new();
        let tracker = WatermarkTracker::new(handler.watermark_keys());

        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let obj = RawObject::new("00g1", "group")
            .updated_at(t1)
            .membership_updated_at(t2);

        handler.observe(&obj, &tracker);
        assert_eq!(tracker.current("group"), Some(t1.timestamp_millis()));
        assert_eq!(tracker.current("group-member"), Some(t2.timestamp_millis()));
    }

    #[test]
    fn test_group_delta_uses_created_after_watermark() {
        let handler = GroupHandler::new();
        let policy = handler.policy();
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let newer = RawObject::new("00g1", "group")
            .created_at(epoch + chrono::Duration::days(1))
            .with_attribute("name", "eng");
        let record = handler
            .process(&newer, RunMode::Delta, Some(epoch.timestamp_millis()), &policy)
            .unwrap()
            .unwrap();
        assert_eq!(record.modification, ObjectModification::Add);

        let older = RawObject::new("00g2", "group")
            .created_at(epoch - chrono::Duration::days(1))
            .with_attribute("name", "sales");
        let record = handler
            .process(&older, RunMode::Delta, Some(epoch.timestamp_millis()), &policy)
            .unwrap()
            .unwrap();
        assert_eq!(record.modification, ObjectModification::Update);
    }

    #[test]
    fn test_user_delta_filter_uses_primary_cursor() {
        let handler = UserHandler::new();
        let inbound: WatermarkSet = [crate::watermark::Watermark::from_ticks("users", 42)]
            .into_iter()
            .collect();

        let filter = handler.delta_filter(&inbound).unwrap();
        assert_eq!(filter.object_type, "user");
        assert_eq!(filter.updated_after, Some(42));
        assert!(filter.membership_updated_after.is_none());
    }

    #[test]
    fn test_group_delta_filter_carries_both_cursors() {
        let handler = GroupHandler::new();
        let inbound: WatermarkSet = [
            crate::watermark::Watermark::from_ticks("group", 10),
            crate::watermark::Watermark::from_ticks("group-member", 20),
        ]
        .into_iter()
        .collect();

        let filter = handler.delta_filter(&inbound).unwrap();
        assert_eq!(filter.updated_after, Some(10));
        assert_eq!(filter.membership_updated_after, Some(20));

        // Either missing cursor is fatal.
        let only_group: WatermarkSet = [crate::watermark::Watermark::from_ticks("group", 10)]
            .into_iter()
            .collect();
        let err = handler.delta_filter(&only_group).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_WATERMARK");
    }
}
