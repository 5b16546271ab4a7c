//! Streaming import pipeline.
//!
//! A single producer task enumerates pages from the [`ObjectSource`] and
//! feeds a bounded work channel; a pool of worker tasks classifies and diffs
//! objects concurrently and posts finished [`ChangeRecord`]s to a bounded
//! hand-off channel; the caller drains the hand-off channel in batches
//! through the [`BatchController`]. Both channels are bounded, so a slow
//! caller exerts backpressure all the way to the source enumeration.
//!
//! One object failing to process never aborts the run: the failure becomes an
//! error-flagged record and every other object still flows. Only a producer
//! failure (the enumeration itself breaking) is fatal.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::classify::ClassifierPolicy;
use crate::config::SyncConfig;
use crate::context::{ImportContext, PipelineState, RunSummary};
use crate::error::{SyncError, SyncResult};
use crate::record::ChangeRecord;
use crate::registry::ObjectTypeHandler;
use crate::source::{ObjectSource, RawObject, SourceFilter};
use crate::types::RunMode;
use crate::watermark::WatermarkSet;

/// One caller-facing batch of change records.
#[derive(Debug)]
pub struct Batch {
    /// The batch's records, in hand-off order.
    pub records: Vec<ChangeRecord>,

    /// `false` once the pipeline is drained; the caller should stop asking.
    pub more_to_come: bool,
}

/// Everything reported when a run closes.
#[derive(Debug)]
pub struct CloseResult {
    /// Terminal pipeline state.
    pub state: PipelineState,

    /// Serialized outbound watermark set, absent when the run produced no
    /// cursor to persist (a cancelled run, or a full run that observed
    /// nothing).
    pub watermark: Option<String>,

    /// Run counters and timing.
    pub summary: RunSummary,
}

/// Import pipeline for one object type.
pub struct ImportPipeline {
    source: Arc<dyn ObjectSource>,
    handler: Arc<dyn ObjectTypeHandler>,
    config: SyncConfig,
}

impl ImportPipeline {
    /// Create a pipeline over a source and one type's handler.
    pub fn new(
        source: Arc<dyn ObjectSource>,
        handler: Arc<dyn ObjectTypeHandler>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            handler,
            config,
        }
    }

    /// Start the run and return the controller the caller drains.
    ///
    /// A delta run without an inbound watermark for the handler's primary
    /// type key fails here, before anything is spawned.
    #[instrument(skip(self, inbound), fields(object_type = self.handler.object_type(), mode = %mode))]
    pub fn start(&self, mode: RunMode, inbound: WatermarkSet) -> SyncResult<BatchController> {
        let filter = match mode {
            RunMode::Full => SourceFilter::full(self.handler.object_type()),
            RunMode::Delta => self.handler.delta_filter(&inbound)?,
        };
        let epoch = filter.updated_after;
        let policy = self.config.policy.unwrap_or_else(|| self.handler.policy());

        let context = Arc::new(ImportContext::new(
            mode,
            inbound,
            self.handler.watermark_keys(),
        ));
        context.set_state(PipelineState::Producing);

        let (work_tx, work_rx) = mpsc::channel::<RawObject>(self.config.channel_capacity);
        let (out_tx, out_rx) = mpsc::channel::<ChangeRecord>(self.config.channel_capacity);

        let producer = spawn_producer(
            Arc::clone(&self.source),
            Arc::clone(&context),
            filter,
            self.config.page_size,
            work_tx,
        );

        let work_rx = Arc::new(Mutex::new(work_rx));
        let worker_count = self.config.effective_import_concurrency();
        let workers: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|_| {
                spawn_worker(
                    Arc::clone(&self.handler),
                    Arc::clone(&context),
                    Arc::clone(&work_rx),
                    out_tx.clone(),
                    epoch,
                    policy,
                )
            })
            .collect();
        // Workers hold the only senders; dropping this one lets the hand-off
        // channel close when the last worker exits.
        drop(out_tx);

        debug!(run_id = %context.run_id, workers = worker_count, "import pipeline started");

        let coordinator = spawn_coordinator(Arc::clone(&context), producer, workers);

        Ok(BatchController {
            context,
            rx: out_rx,
            coordinator,
            batch_size: self.config.batch_size.max(1),
            exhausted: false,
        })
    }
}

fn spawn_producer(
    source: Arc<dyn ObjectSource>,
    context: Arc<ImportContext>,
    filter: SourceFilter,
    page_size: usize,
    work_tx: mpsc::Sender<RawObject>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor: Option<String> = None;
        'pages: loop {
            let page = tokio::select! {
                _ = context.cancellation.cancelled() => break 'pages,
                page = source.next_page(&filter, cursor.take(), page_size) => page,
            };

            let page = match page {
                Ok(page) => page,
                Err(err) => {
                    warn!(error = %err, "source enumeration failed");
                    context.set_fatal(err.to_string());
                    // Unblock the workers; the failure, not the token, is
                    // what decides the run's fate.
                    context.cancellation.cancel();
                    break 'pages;
                }
            };

            let next_cursor = page.next_cursor;
            for object in page.objects {
                tokio::select! {
                    _ = context.cancellation.cancelled() => break 'pages,
                    sent = work_tx.send(object) => {
                        if sent.is_err() {
                            break 'pages;
                        }
                    }
                }
            }

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break 'pages,
            }
        }
    })
}

fn spawn_worker(
    handler: Arc<dyn ObjectTypeHandler>,
    context: Arc<ImportContext>,
    work_rx: Arc<Mutex<mpsc::Receiver<RawObject>>>,
    out_tx: mpsc::Sender<ChangeRecord>,
    epoch: Option<i64>,
    policy: ClassifierPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if context.cancellation.is_cancelled() {
                break;
            }

            let object = {
                let mut rx = work_rx.lock().await;
                rx.recv().await
            };
            let Some(object) = object else { break };

            // Every enumerated object advances the cursor, surfaced or not;
            // the watermark reflects what was seen, not what was emitted.
            handler.observe(&object, &context.tracker);

            let record = match handler.process(&object, context.mode, epoch, &policy) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => {
                    warn!(id = %object.id, error = %err, "object failed to process");
                    context.record_error();
                    ChangeRecord::error_record(&object.id, &object.object_type, &err)
                }
            };

            if out_tx.send(record).await.is_err() {
                // Caller closed the hand-off channel.
                break;
            }
        }
    })
}

fn spawn_coordinator(
    context: Arc<ImportContext>,
    producer: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if producer.await.is_err() {
            context.set_fatal("producer task panicked".to_string());
        }
        context.set_state(PipelineState::Draining);

        for worker in workers {
            if worker.await.is_err() {
                context.set_fatal("worker task panicked".to_string());
            }
        }

        if context.fatal().is_some() || context.cancellation.is_cancelled() {
            context.set_state(PipelineState::Cancelled);
            return;
        }

        match context.finalize_watermarks() {
            Ok(()) => context.set_state(PipelineState::Completed),
            Err(err) => {
                warn!(error = %err, "watermark finalization failed");
                context.set_fatal(err.to_string());
                context.set_state(PipelineState::Cancelled);
            }
        }
    })
}

/// Caller-facing handle over a running import.
///
/// Drain with [`next_batch`](Self::next_batch) until `more_to_come` is
/// `false`, then call [`close`](Self::close) to finalize the watermark and
/// collect the run summary. Dropping the controller without closing cancels
/// the run.
pub struct BatchController {
    context: Arc<ImportContext>,
    rx: mpsc::Receiver<ChangeRecord>,
    coordinator: JoinHandle<()>,
    batch_size: usize,
    exhausted: bool,
}

impl BatchController {
    /// Collect up to the configured batch size of records, waiting for the
    /// pipeline as needed.
    pub async fn next_batch(&mut self) -> SyncResult<Batch> {
        if let Some(message) = self.context.fatal() {
            return Err(SyncError::producer_failed(message));
        }

        let mut records = Vec::new();
        while records.len() < self.batch_size {
            match self.rx.recv().await {
                Some(record) => {
                    self.context.record_consumed();
                    records.push(record);
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        // A fatal failure may land while this batch was draining.
        if let Some(message) = self.context.fatal() {
            return Err(SyncError::producer_failed(message));
        }

        Ok(Batch {
            records,
            more_to_come: !self.exhausted,
        })
    }

    /// Current pipeline state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.context.state()
    }

    /// Request cancellation. The run winds down; [`close`](Self::close) still
    /// applies.
    pub fn cancel(&self) {
        self.context.cancellation.cancel();
    }

    /// Close the run: stop any remaining work, finalize the watermark, and
    /// report counters.
    pub async fn close(self) -> SyncResult<CloseResult> {
        let BatchController {
            context,
            rx,
            coordinator,
            batch_size: _,
            exhausted,
        } = self;

        if !exhausted {
            context.cancellation.cancel();
        }
        // Dropping the receiver errors any worker blocked on the hand-off
        // send, so the pool can wind down.
        drop(rx);

        if coordinator.await.is_err() {
            return Err(SyncError::producer_failed("coordinator task panicked"));
        }

        if let Some(message) = context.fatal() {
            return Err(SyncError::producer_failed(message));
        }

        let outbound = context.outbound_watermarks();
        let watermark = if outbound.is_empty() {
            None
        } else {
            Some(outbound.to_json()?)
        };

        let summary = context.summary();
        info!(
            run_id = %context.run_id,
            count = summary.count,
            errors = summary.error_count,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            objects_per_sec = format!("{:.1}", summary.objects_per_sec),
            "import run closed"
        );

        Ok(CloseResult {
            state: context.state(),
            watermark,
            summary,
        })
    }
}
