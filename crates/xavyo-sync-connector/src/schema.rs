//! Schema declarations for synchronized object types.
//!
//! The schema governs attribute-level diffing: declared type drives value
//! coercion, cardinality decides single- vs. multi-valued handling, and the
//! operation capability decides whether an attribute participates in import,
//! export, or both.

use serde::{Deserialize, Serialize};

/// Declared data type for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDataType {
    String,
    Integer,
    Boolean,
    DateTime,
    /// A reference to another synchronized object (e.g. group membership).
    Reference,
}

/// Which directions an attribute participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeOperation {
    ImportOnly,
    ExportOnly,
    ImportExport,
}

impl AttributeOperation {
    /// Check whether the attribute flows on import.
    #[must_use]
    pub fn imports(&self) -> bool {
        matches!(
            self,
            AttributeOperation::ImportOnly | AttributeOperation::ImportExport
        )
    }

    /// Check whether the attribute flows on export.
    #[must_use]
    pub fn exports(&self) -> bool {
        matches!(
            self,
            AttributeOperation::ExportOnly | AttributeOperation::ImportExport
        )
    }
}

/// A single attribute declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAttribute {
    /// Attribute name.
    pub name: String,

    /// Declared data type; governs coercion from the source representation.
    pub data_type: AttributeDataType,

    /// Whether the attribute holds an ordered list of values.
    #[serde(default)]
    pub multi_valued: bool,

    /// Operation capability.
    pub operation: AttributeOperation,

    /// When set, exporting this attribute requires full-object context
    /// (read-modify-write) even if the rest of the change set could be
    /// applied piecemeal.
    #[serde(default)]
    pub requires_full_object: bool,
}

impl SchemaAttribute {
    /// Create a single-valued import/export attribute.
    pub fn new(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            multi_valued: false,
            operation: AttributeOperation::ImportExport,
            requires_full_object: false,
        }
    }

    /// Mark the attribute multi-valued.
    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// Set the operation capability.
    #[must_use]
    pub fn operation(mut self, operation: AttributeOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Flag the attribute as needing full-object context on export.
    #[must_use]
    pub fn requires_full_object(mut self) -> Self {
        self.requires_full_object = true;
        self
    }
}

/// Ordered attribute declarations for one object type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTypeSchema {
    /// The object type name (e.g. "user", "group").
    pub object_type: String,

    /// The immutable attribute uniquely identifying an object across runs.
    pub anchor_attribute: String,

    /// Ordered attribute declarations.
    pub attributes: Vec<SchemaAttribute>,
}

impl ObjectTypeSchema {
    /// Create a schema with the given anchor and attributes.
    pub fn new(
        object_type: impl Into<String>,
        anchor_attribute: impl Into<String>,
        attributes: Vec<SchemaAttribute>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            anchor_attribute: anchor_attribute.into(),
            attributes,
        }
    }

    /// Find an attribute declaration by name.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes that participate in import, in declaration order.
    pub fn import_attributes(&self) -> impl Iterator<Item = &SchemaAttribute> {
        self.attributes.iter().filter(|a| a.operation.imports())
    }
}

/// The built-in user schema.
#[must_use]
pub fn user_schema() -> ObjectTypeSchema {
    ObjectTypeSchema::new(
        "user",
        "id",
        vec![
            SchemaAttribute::new("login", AttributeDataType::String),
            SchemaAttribute::new("email", AttributeDataType::String),
            SchemaAttribute::new("firstName", AttributeDataType::String),
            SchemaAttribute::new("lastName", AttributeDataType::String),
            SchemaAttribute::new("displayName", AttributeDataType::String),
            SchemaAttribute::new("status", AttributeDataType::String)
                .operation(AttributeOperation::ImportOnly),
            SchemaAttribute::new("suspended", AttributeDataType::Boolean).requires_full_object(),
            SchemaAttribute::new("created", AttributeDataType::DateTime)
                .operation(AttributeOperation::ImportOnly),
            SchemaAttribute::new("lastUpdated", AttributeDataType::DateTime)
                .operation(AttributeOperation::ImportOnly),
        ],
    )
}

/// The built-in group schema.
///
/// Membership is a multi-valued reference: surfaced to the engine as a full
/// list on import, mutated through incremental add/remove calls on export.
#[must_use]
pub fn group_schema() -> ObjectTypeSchema {
    ObjectTypeSchema::new(
        "group",
        "id",
        vec![
            SchemaAttribute::new("name", AttributeDataType::String),
            SchemaAttribute::new("description", AttributeDataType::String),
            SchemaAttribute::new("member", AttributeDataType::Reference).multi_valued(),
            SchemaAttribute::new("lastUpdated", AttributeDataType::DateTime)
                .operation(AttributeOperation::ImportOnly),
            SchemaAttribute::new("lastMembershipUpdated", AttributeDataType::DateTime)
                .operation(AttributeOperation::ImportOnly),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_capability() {
        assert!(AttributeOperation::ImportOnly.imports());
        assert!(!AttributeOperation::ImportOnly.exports());
        assert!(AttributeOperation::ImportExport.imports());
        assert!(AttributeOperation::ImportExport.exports());
    }

    #[test]
    fn test_user_schema_lookup() {
        let schema = user_schema();
        assert_eq!(schema.anchor_attribute, "id");
        let login = schema.get_attribute("login").unwrap();
        assert_eq!(login.data_type, AttributeDataType::String);
        assert!(!login.multi_valued);
        assert!(schema.get_attribute("member").is_none());
    }

    #[test]
    fn test_group_member_is_multi_valued_reference() {
        let schema = group_schema();
        let member = schema.get_attribute("member").unwrap();
        assert!(member.multi_valued);
        assert_eq!(member.data_type, AttributeDataType::Reference);
    }

    #[test]
    fn test_import_attributes_are_ordered() {
        let schema = user_schema();
        let names: Vec<&str> = schema.import_attributes().map(|a| a.name.as_str()).collect();
        assert_eq!(names[0], "login");
        assert!(names.contains(&"status"));
    }
}
