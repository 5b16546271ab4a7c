//! # Sync Connector Core
//!
//! Watermark-driven change detection and reconciliation between a source
//! identity system and a synchronization engine.
//!
//! The crate turns paged enumerations of raw source objects into
//! attribute-level change records, and applies outbound change records back
//! to the source, with incremental (delta) runs driven by persisted
//! watermarks.
//!
//! ## Architecture
//!
//! Imports run as a streaming pipeline:
//!
//! - A producer task enumerates pages from an [`ObjectSource`]
//! - A worker pool classifies and diffs objects concurrently
//! - The caller drains finished records in batches via [`BatchController`]
//!
//! Both internal channels are bounded, so a slow consumer exerts
//! backpressure all the way back to the source enumeration. Per-object
//! failures become error-flagged records and never abort the run; only a
//! producer failure is fatal, and a fatal run never advances the watermark.
//!
//! Exports fan out through the [`ExportDispatcher`], which routes each
//! record's intent to the matching [`RemoteStore`] primitive and reports a
//! per-record [`ExportOutcome`].
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_sync_connector::prelude::*;
//!
//! let handler = Arc::new(UserHandler::new());
//! let pipeline = ImportPipeline::new(source, handler, SyncConfig::default());
//!
//! let mut run = pipeline.start(RunMode::Delta, watermarks)?;
//! loop {
//!     let batch = run.next_batch().await?;
//!     engine.consume(batch.records).await?;
//!     if !batch.more_to_come {
//!         break;
//!     }
//! }
//! let closed = run.close().await?;
//! persist(closed.watermark);
//! ```
//!
//! ## Crate Organization
//!
//! - [`types`] - Run modes, modification intents, lifecycle states, policies
//! - [`error`] - Error types with fatal/continuable classification
//! - [`value`] - Attribute value model and schema-driven coercion
//! - [`schema`] - Object type schemas
//! - [`record`] - Change records and export outcomes
//! - [`watermark`] - Persisted cursors and the lock-free run tracker
//! - [`classify`] - Lifecycle state to modification intent mapping
//! - [`diff`] - Attribute diff engine and multi-valued reconciliation
//! - [`source`] - Source enumeration and remote mutation traits
//! - [`registry`] - Per-object-type strategy handlers
//! - [`context`] - Per-run shared state and counters
//! - [`pipeline`] - The streaming import pipeline
//! - [`export`] - The concurrent export dispatcher
//! - [`config`] - Run configuration

pub mod classify;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod schema;
pub mod source;
pub mod types;
pub mod value;
pub mod watermark;

pub use classify::{classify, is_removed, ClassifierPolicy};
pub use config::SyncConfig;
pub use context::{ExportContext, ImportContext, PipelineState, RunSummary};
pub use diff::{reconcile_values, DiffEngine};
pub use error::{SyncError, SyncResult};
pub use export::ExportDispatcher;
pub use pipeline::{Batch, BatchController, CloseResult, ImportPipeline};
pub use record::{
    AttributeChange, AttributeModification, ChangeRecord, ExportOutcome, RecordError,
};
pub use registry::{GroupHandler, HandlerRegistry, ObjectTypeHandler, UserHandler};
pub use schema::{
    group_schema, user_schema, AttributeDataType, AttributeOperation, ObjectTypeSchema,
    SchemaAttribute,
};
pub use source::{ObjectSource, RawObject, RemoteStore, SourceFilter, SourcePage};
pub use types::{
    DeltaAddPolicy, DeprovisioningPolicy, LifecycleStatus, ObjectModification, RunMode,
};
pub use value::{coerce, AttributeValue};
pub use watermark::{required_watermark, Watermark, WatermarkSet, WatermarkTracker};

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::classify::ClassifierPolicy;
    pub use crate::config::SyncConfig;
    pub use crate::context::PipelineState;
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::export::ExportDispatcher;
    pub use crate::pipeline::{Batch, BatchController, ImportPipeline};
    pub use crate::record::{ChangeRecord, ExportOutcome};
    pub use crate::registry::{GroupHandler, HandlerRegistry, ObjectTypeHandler, UserHandler};
    pub use crate::source::{ObjectSource, RawObject, RemoteStore, SourceFilter, SourcePage};
    pub use crate::types::{ObjectModification, RunMode};
    pub use crate::value::AttributeValue;
    pub use crate::watermark::{Watermark, WatermarkSet};
}
