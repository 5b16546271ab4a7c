//! Error types for the reconciliation core.
//!
//! Errors are classified as fatal (run-aborting) or continuable. A fatal
//! error terminates the run without advancing the watermark; continuable
//! errors are captured on the affected record or attribute and the run keeps
//! going.

use thiserror::Error;

/// Error that can occur during a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    // Fatal, run-aborting errors
    /// A delta run was requested but no inbound watermark exists for a
    /// required type key.
    #[error("no watermark was available to perform a delta import for '{key}'")]
    MissingWatermark { key: String },

    /// A persisted watermark could not be parsed.
    #[error("invalid watermark for '{key}': {message}")]
    InvalidWatermark { key: String, message: String },

    /// The enumeration/producer task failed; the run cannot continue.
    #[error("the producer task encountered an error: {message}")]
    ProducerFailed { message: String },

    /// A change record carried a modification the dispatcher cannot apply.
    #[error("unknown or unsupported modification type: {modification} on object {id}")]
    UnsupportedModification { modification: String, id: String },

    /// The run was cancelled before the operation could complete.
    #[error("the run was cancelled")]
    Cancelled,

    // Per-item continuable errors
    /// Processing of a single object failed; the run continues.
    #[error("processing failed for object {id}: {message}")]
    ItemFailed { id: String, message: String },

    /// The remote store has no object with the given identifier.
    #[error("object not found: {id}")]
    ObjectNotFound { id: String },

    // Per-attribute continuable errors
    /// A single attribute's value could not be coerced to its declared type.
    #[error("could not convert value for attribute '{attribute}': {message}")]
    AttributeConversion { attribute: String, message: String },

    // Infrastructure
    /// An error reported by the source or remote store.
    #[error("source error: {message}")]
    Source {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Watermark (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Check whether this error aborts the whole run.
    ///
    /// Non-fatal errors are surfaced on the affected record or attribute and
    /// the run completes normally with accurate error counts.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::MissingWatermark { .. }
                | SyncError::InvalidWatermark { .. }
                | SyncError::ProducerFailed { .. }
                | SyncError::Cancelled
                | SyncError::Serialization(_)
        )
    }

    /// Get a stable error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::MissingWatermark { .. } => "MISSING_WATERMARK",
            SyncError::InvalidWatermark { .. } => "INVALID_WATERMARK",
            SyncError::ProducerFailed { .. } => "PRODUCER_FAILED",
            SyncError::UnsupportedModification { .. } => "UNSUPPORTED_MODIFICATION",
            SyncError::Cancelled => "CANCELLED",
            SyncError::ItemFailed { .. } => "ITEM_FAILED",
            SyncError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            SyncError::AttributeConversion { .. } => "ATTRIBUTE_CONVERSION",
            SyncError::Source { .. } => "SOURCE_ERROR",
            SyncError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    // Convenience constructors

    /// Create a missing-watermark error.
    pub fn missing_watermark(key: impl Into<String>) -> Self {
        SyncError::MissingWatermark { key: key.into() }
    }

    /// Create an invalid-watermark error.
    pub fn invalid_watermark(key: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::InvalidWatermark {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a producer-failed error.
    pub fn producer_failed(message: impl Into<String>) -> Self {
        SyncError::ProducerFailed {
            message: message.into(),
        }
    }

    /// Create a per-item error.
    pub fn item_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::ItemFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a per-attribute conversion error.
    pub fn attribute_conversion(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::AttributeConversion {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create a source error.
    pub fn source(message: impl Into<String>) -> Self {
        SyncError::Source {
            message: message.into(),
            source: None,
        }
    }

    /// Create a source error wrapping an underlying error.
    pub fn source_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::Source {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an object-not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        SyncError::ObjectNotFound { id: id.into() }
    }

    /// Create an unsupported-modification error.
    pub fn unsupported_modification(
        modification: impl std::fmt::Display,
        id: impl Into<String>,
    ) -> Self {
        SyncError::UnsupportedModification {
            modification: modification.to_string(),
            id: id.into(),
        }
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
