//! Change records and attribute-level changes.
//!
//! A [`ChangeRecord`] describes one object's creation, update, or deletion as
//! a set of attribute-level changes, destined for the synchronization engine.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::schema::AttributeDataType;
use crate::types::ObjectModification;
use crate::value::AttributeValue;

/// How a single attribute is modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeModification {
    Add,
    Replace,
    Delete,
}

/// One attribute's change within a record.
///
/// For a multi-valued `Replace`, `values` carries the full resulting list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Attribute name.
    pub name: String,

    /// Declared type of the attribute.
    pub data_type: AttributeDataType,

    /// The modification kind.
    pub modification: AttributeModification,

    /// The value(s); empty for `Delete`.
    pub values: Vec<AttributeValue>,
}

impl AttributeChange {
    /// Create an `Add` change with a single value.
    pub fn add(
        name: impl Into<String>,
        data_type: AttributeDataType,
        value: AttributeValue,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            modification: AttributeModification::Add,
            values: vec![value],
        }
    }

    /// Create an `Add` change carrying a full value list.
    pub fn add_multi(
        name: impl Into<String>,
        data_type: AttributeDataType,
        values: Vec<AttributeValue>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            modification: AttributeModification::Add,
            values,
        }
    }

    /// Create a `Replace` change with a single value.
    pub fn replace(
        name: impl Into<String>,
        data_type: AttributeDataType,
        value: AttributeValue,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            modification: AttributeModification::Replace,
            values: vec![value],
        }
    }

    /// Create a `Replace` change carrying the full resulting list.
    pub fn replace_multi(
        name: impl Into<String>,
        data_type: AttributeDataType,
        values: Vec<AttributeValue>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            modification: AttributeModification::Replace,
            values,
        }
    }

    /// Create a `Delete` change.
    pub fn delete(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            modification: AttributeModification::Delete,
            values: Vec::new(),
        }
    }

    /// The single value, if exactly one is present.
    #[must_use]
    pub fn single_value(&self) -> Option<&AttributeValue> {
        if self.values.len() == 1 {
            self.values.first()
        } else {
            None
        }
    }
}

/// An error captured on a record or outcome without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Stable error code (see [`SyncError::error_code`]).
    pub code: String,
    /// Short error name.
    pub name: String,
    /// Diagnostic detail.
    pub detail: String,
}

impl RecordError {
    /// Capture a [`SyncError`] as a continue-the-run record error.
    #[must_use]
    pub fn from_error(err: &SyncError) -> Self {
        Self {
            code: err.error_code().to_string(),
            name: err.to_string(),
            detail: format!("{err:?}"),
        }
    }
}

/// A description of one object's change, produced by the import pipeline or
/// consumed by the export dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Stable external key (the source system's identifier).
    pub id: String,

    /// Object type name.
    pub object_type: String,

    /// Anchor attribute name/value pairs identifying the object across runs.
    pub anchors: Vec<(String, String)>,

    /// The modification intent. Never `None` on a surfaced record.
    pub modification: ObjectModification,

    /// Ordered attribute-level changes.
    pub attribute_changes: Vec<AttributeChange>,

    /// Set when per-item processing failed; the run continued.
    pub error: Option<RecordError>,
}

impl ChangeRecord {
    /// Create a record with the given intent and a single anchor.
    pub fn new(
        id: impl Into<String>,
        object_type: impl Into<String>,
        anchor_attribute: impl Into<String>,
        modification: ObjectModification,
    ) -> Self {
        let id = id.into();
        Self {
            anchors: vec![(anchor_attribute.into(), id.clone())],
            id,
            object_type: object_type.into(),
            modification,
            attribute_changes: Vec::new(),
            error: None,
        }
    }

    /// Create an error-flagged record for an object whose processing failed.
    ///
    /// The original key is preserved so the engine can report the failure
    /// against the right object.
    pub fn error_record(
        id: impl Into<String>,
        object_type: impl Into<String>,
        err: &SyncError,
    ) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            anchors: Vec::new(),
            modification: ObjectModification::Replace,
            attribute_changes: Vec::new(),
            error: Some(RecordError::from_error(err)),
        }
    }

    /// Append an attribute change.
    pub fn push_change(&mut self, change: AttributeChange) {
        self.attribute_changes.push(change);
    }

    /// Check whether this record carries a per-item error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Find an attribute change by name.
    #[must_use]
    pub fn get_change(&self, name: &str) -> Option<&AttributeChange> {
        self.attribute_changes.iter().find(|c| c.name == name)
    }
}

/// Result of applying one change record to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    /// The record's external key.
    pub record_id: String,

    /// Anchor changes to fold back onto the record. An `Add` outcome carries
    /// at least the newly assigned identifier.
    pub anchor_changes: Vec<AttributeChange>,

    /// Set when the record failed; the batch continued.
    pub error: Option<RecordError>,
}

impl ExportOutcome {
    /// Create a successful outcome.
    pub fn success(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            anchor_changes: Vec::new(),
            error: None,
        }
    }

    /// Create a successful outcome carrying anchor changes.
    pub fn success_with_anchors(
        record_id: impl Into<String>,
        anchor_changes: Vec<AttributeChange>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            anchor_changes,
            error: None,
        }
    }

    /// Create a failed outcome from a continue-the-batch error.
    pub fn failed(record_id: impl Into<String>, err: &SyncError) -> Self {
        Self {
            record_id: record_id.into(),
            anchor_changes: Vec::new(),
            error: Some(RecordError::from_error(err)),
        }
    }

    /// Check whether the record was applied successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
