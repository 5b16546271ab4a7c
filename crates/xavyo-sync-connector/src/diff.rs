//! Attribute diff engine.
//!
//! Converts a raw source object into the ordered set of attribute changes a
//! [`ChangeRecord`] carries, honoring the schema's declared types and
//! cardinality. A single attribute's conversion failure drops only that
//! attribute's contribution, never the record.

use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::record::{AttributeChange, ChangeRecord};
use crate::schema::{ObjectTypeSchema, SchemaAttribute};
use crate::source::RawObject;
use crate::types::ObjectModification;
use crate::value::{coerce, AttributeValue};

/// Incremental multi-valued reconciliation.
///
/// Computes `(known \ removals) ∪ additions`: survivors keep their original
/// order, additions are appended, and values already present are not
/// duplicated. This recovers the full resulting list for object kinds that
/// only expose incremental add/remove primitives.
#[must_use]
pub fn reconcile_values(
    known: &[AttributeValue],
    additions: &[AttributeValue],
    removals: &[AttributeValue],
) -> Vec<AttributeValue> {
    let mut result: Vec<AttributeValue> = known
        .iter()
        .filter(|v| !removals.contains(v))
        .cloned()
        .collect();

    for add in additions {
        if !result.contains(add) {
            result.push(add.clone());
        }
    }

    result
}

/// Builds change records from raw objects against one object type's schema.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    schema: &'a ObjectTypeSchema,
}

impl<'a> DiffEngine<'a> {
    /// Create a diff engine over a schema.
    #[must_use]
    pub fn new(schema: &'a ObjectTypeSchema) -> Self {
        Self { schema }
    }

    /// Build the change record for an object with the given intent.
    ///
    /// The intent must not be `None`; callers drop `None` classifications
    /// before reaching the diff engine. A `Delete` record carries the anchor
    /// only.
    pub fn build_record(
        &self,
        object: &RawObject,
        modification: ObjectModification,
    ) -> SyncResult<ChangeRecord> {
        if object.id.is_empty() {
            return Err(SyncError::item_failed(
                "<unknown>",
                "source object has no identifier",
            ));
        }

        let mut record = ChangeRecord::new(
            &object.id,
            &self.schema.object_type,
            &self.schema.anchor_attribute,
            modification,
        );

        if modification == ObjectModification::Delete {
            return Ok(record);
        }

        for attribute in self.schema.import_attributes() {
            match self.diff_attribute(object, attribute, modification) {
                Ok(Some(change)) => record.push_change(change),
                Ok(None) => {}
                Err(err) => {
                    // Per-attribute failure: drop this attribute's
                    // contribution, keep the record.
                    warn!(
                        id = %object.id,
                        attribute = %attribute.name,
                        error = %err,
                        "skipping attribute after conversion failure"
                    );
                }
            }
        }

        Ok(record)
    }

    /// Produce zero or one change for a single schema attribute.
    fn diff_attribute(
        &self,
        object: &RawObject,
        attribute: &SchemaAttribute,
        modification: ObjectModification,
    ) -> SyncResult<Option<AttributeChange>> {
        let value = object.get(&attribute.name);
        let adding = modification == ObjectModification::Add;

        if attribute.multi_valued {
            let values = match value {
                Some(v) => self.coerce_list(attribute, v)?,
                None => Vec::new(),
            };

            if adding {
                // Full-replace strategy does not apply on Add: the complete
                // list is the initial state.
                if value.is_none() {
                    return Ok(None);
                }
                return Ok(Some(AttributeChange::add_multi(
                    &attribute.name,
                    attribute.data_type,
                    values,
                )));
            }

            // Full-replace strategy: empty resulting list means the
            // attribute is removed, otherwise replace with the complete list.
            if values.is_empty() {
                return Ok(Some(AttributeChange::delete(
                    &attribute.name,
                    attribute.data_type,
                )));
            }
            return Ok(Some(AttributeChange::replace_multi(
                &attribute.name,
                attribute.data_type,
                values,
            )));
        }

        match value {
            None => {
                if adding {
                    Ok(None)
                } else {
                    Ok(Some(AttributeChange::delete(
                        &attribute.name,
                        attribute.data_type,
                    )))
                }
            }
            Some(v) if v.is_null() => {
                if adding {
                    Ok(None)
                } else {
                    Ok(Some(AttributeChange::delete(
                        &attribute.name,
                        attribute.data_type,
                    )))
                }
            }
            Some(v) => {
                let coerced = coerce(v, attribute.data_type).map_err(|e| {
                    SyncError::attribute_conversion(&attribute.name, e.to_string())
                })?;
                let change = if adding {
                    AttributeChange::add(&attribute.name, attribute.data_type, coerced)
                } else {
                    AttributeChange::replace(&attribute.name, attribute.data_type, coerced)
                };
                Ok(Some(change))
            }
        }
    }

    fn coerce_list(
        &self,
        attribute: &SchemaAttribute,
        value: &AttributeValue,
    ) -> SyncResult<Vec<AttributeValue>> {
        value
            .clone()
            .into_values()
            .iter()
            .map(|v| {
                coerce(v, attribute.data_type)
                    .map_err(|e| SyncError::attribute_conversion(&attribute.name, e.to_string()))
            })
            .collect()
    }
}
