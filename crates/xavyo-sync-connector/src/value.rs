//! Attribute value model and schema-driven type coercion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::schema::AttributeDataType;

/// A value for an attribute, which may be single or multi-valued.
///
/// This is the source system's native representation; [`coerce`] converts it
/// to the schema's declared type before it is placed on a change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No value (null).
    Null,
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// A point in time.
    DateTime(DateTime<Utc>),
    /// A string value.
    String(String),
    /// Multiple values.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Check if this is a null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Get as a string if this is a single string value.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as an array if this is multi-valued.
    #[must_use]
    pub fn as_array(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Check if this is multi-valued.
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributeValue::Array(_))
    }

    /// Flatten to a list of values; a scalar becomes a one-element list.
    #[must_use]
    pub fn into_values(self) -> Vec<AttributeValue> {
        match self {
            AttributeValue::Array(arr) => arr,
            AttributeValue::Null => Vec::new(),
            other => vec![other],
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(dt)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(values: Vec<AttributeValue>) -> Self {
        AttributeValue::Array(values)
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "<null>"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Array(arr) => {
                let parts: Vec<String> = arr.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Convert a native value to the schema's declared type.
///
/// A failure here is a per-attribute error: the attribute's contribution to
/// the record is dropped, not the record itself.
pub fn coerce(value: &AttributeValue, data_type: AttributeDataType) -> SyncResult<AttributeValue> {
    match data_type {
        AttributeDataType::String | AttributeDataType::Reference => match value {
            AttributeValue::String(_) => Ok(value.clone()),
            AttributeValue::Integer(i) => Ok(AttributeValue::String(i.to_string())),
            AttributeValue::Boolean(b) => Ok(AttributeValue::String(b.to_string())),
            AttributeValue::DateTime(dt) => Ok(AttributeValue::String(dt.to_rfc3339())),
            other => Err(conversion_error(other, "string")),
        },
        AttributeDataType::Integer => match value {
            AttributeValue::Integer(_) => Ok(value.clone()),
            AttributeValue::String(s) => s
                .parse::<i64>()
                .map(AttributeValue::Integer)
                .map_err(|e| conversion_error(value, &format!("integer: {e}"))),
            other => Err(conversion_error(other, "integer")),
        },
        AttributeDataType::Boolean => match value {
            AttributeValue::Boolean(_) => Ok(value.clone()),
            AttributeValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(AttributeValue::Boolean(true)),
                "false" | "0" => Ok(AttributeValue::Boolean(false)),
                _ => Err(conversion_error(value, "boolean")),
            },
            other => Err(conversion_error(other, "boolean")),
        },
        AttributeDataType::DateTime => match value {
            AttributeValue::DateTime(_) => Ok(value.clone()),
            AttributeValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| AttributeValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| conversion_error(value, &format!("datetime: {e}"))),
            AttributeValue::Integer(millis) => DateTime::<Utc>::from_timestamp_millis(*millis)
                .map(AttributeValue::DateTime)
                .ok_or_else(|| conversion_error(value, "datetime")),
            other => Err(conversion_error(other, "datetime")),
        },
    }
}

fn conversion_error(value: &AttributeValue, target: &str) -> SyncError {
    SyncError::attribute_conversion(
        String::new(),
        format!("cannot convert {value:?} to {target}"),
    )
}
