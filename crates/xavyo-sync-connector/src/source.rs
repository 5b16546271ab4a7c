//! External collaborator traits: paged enumeration and remote mutation.
//!
//! The reconciliation core never talks to a concrete remote API. It consumes
//! a generic [`ObjectSource`] for enumeration and an intent-polymorphic
//! [`RemoteStore`] for applying changes back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncResult;
use crate::types::LifecycleStatus;
use crate::value::AttributeValue;

/// A raw object yielded by the source system.
#[derive(Debug, Clone)]
pub struct RawObject {
    /// The source system's identifier.
    pub id: String,

    /// Object type name.
    pub object_type: String,

    /// Current lifecycle state.
    pub status: LifecycleStatus,

    /// Lifecycle state the object is transitioning toward, if any.
    pub transitioning_to: Option<LifecycleStatus>,

    /// Creation time.
    pub created: Option<DateTime<Utc>>,

    /// Last modification time; feeds the primary watermark cursor.
    pub last_updated: Option<DateTime<Utc>>,

    /// Last membership modification time; feeds the membership cursor for
    /// types that track one.
    pub membership_updated: Option<DateTime<Utc>>,

    /// Native attribute values keyed by name.
    pub attributes: HashMap<String, AttributeValue>,
}

impl RawObject {
    /// Create an active object with no attributes.
    pub fn new(id: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            status: LifecycleStatus::Active,
            transitioning_to: None,
            created: None,
            last_updated: None,
            membership_updated: None,
            attributes: HashMap::new(),
        }
    }

    /// Set the lifecycle status.
    #[must_use]
    pub fn with_status(mut self, status: LifecycleStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the transitioning-to status.
    #[must_use]
    pub fn transitioning_to(mut self, status: LifecycleStatus) -> Self {
        self.transitioning_to = Some(status);
        self
    }

    /// Set the creation time.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created = Some(at);
        self
    }

    /// Set the last-updated time.
    #[must_use]
    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// Set the membership-updated time.
    #[must_use]
    pub fn membership_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.membership_updated = Some(at);
        self
    }

    /// Set an attribute value.
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Get an attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Enumeration filter derived from the run mode and watermarks.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    /// Object type to enumerate.
    pub object_type: String,

    /// Only yield objects modified after this instant (millisecond ticks).
    /// `None` for a full run.
    pub updated_after: Option<i64>,

    /// Also yield objects whose membership changed after this instant, for
    /// types that keep a separate membership cursor.
    pub membership_updated_after: Option<i64>,
}

impl SourceFilter {
    /// Filter for a full enumeration of one type.
    pub fn full(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            updated_after: None,
            membership_updated_after: None,
        }
    }

    /// Filter for an incremental enumeration since the given ticks.
    pub fn since(object_type: impl Into<String>, ticks: i64) -> Self {
        Self {
            object_type: object_type.into(),
            updated_after: Some(ticks),
            membership_updated_after: None,
        }
    }

    /// Add a membership cursor to the filter.
    #[must_use]
    pub fn with_membership_since(mut self, ticks: i64) -> Self {
        self.membership_updated_after = Some(ticks);
        self
    }
}

/// One page of enumerated objects.
#[derive(Debug, Clone)]
pub struct SourcePage {
    /// The page's objects.
    pub objects: Vec<RawObject>,

    /// Cursor for the next page; `None` when the enumeration is exhausted.
    pub next_cursor: Option<String>,
}

impl SourcePage {
    /// The final page of an enumeration.
    #[must_use]
    pub fn last(objects: Vec<RawObject>) -> Self {
        Self {
            objects,
            next_cursor: None,
        }
    }
}

/// Paged enumeration of raw objects from the source system.
///
/// The sequence is lazy and finite per invocation; it is restartable only by
/// enumerating again with a fresh filter.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetch the next page. `cursor` is `None` for the first page.
    async fn next_page(
        &self,
        filter: &SourceFilter,
        cursor: Option<String>,
        page_size: usize,
    ) -> SyncResult<SourcePage>;
}

/// Per-intent mutation primitives on the remote store.
///
/// The export dispatcher is polymorphic over whichever subset a type
/// supports; unsupported calls surface as per-record errors.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a new object and return its assigned identifier.
    async fn create(
        &self,
        object_type: &str,
        attributes: HashMap<String, AttributeValue>,
    ) -> SyncResult<String>;

    /// Fetch an object's current attribute state.
    async fn get(&self, object_type: &str, id: &str)
        -> SyncResult<HashMap<String, AttributeValue>>;

    /// Write back a full attribute state (read-modify-write tail).
    async fn update(
        &self,
        object_type: &str,
        id: &str,
        attributes: HashMap<String, AttributeValue>,
    ) -> SyncResult<()>;

    /// Apply only the given changed attributes.
    async fn update_partial(
        &self,
        object_type: &str,
        id: &str,
        attributes: HashMap<String, AttributeValue>,
    ) -> SyncResult<()>;

    /// Add one member to a multi-valued reference attribute.
    async fn add_member(&self, object_type: &str, id: &str, member: &str) -> SyncResult<()>;

    /// Remove one member from a multi-valued reference attribute.
    async fn remove_member(&self, object_type: &str, id: &str, member: &str) -> SyncResult<()>;

    /// Deactivate an object.
    async fn deactivate(&self, object_type: &str, id: &str) -> SyncResult<()>;

    /// Permanently delete an object.
    async fn delete(&self, object_type: &str, id: &str) -> SyncResult<()>;
}
