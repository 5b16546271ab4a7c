//! Per-run state shared across workers.
//!
//! All run-scope mutable state lives on an explicit context object passed to
//! every worker; nothing is global, so overlapping runs cannot contaminate
//! each other's cursors or counters.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{DeprovisioningPolicy, RunMode};
use crate::watermark::{WatermarkSet, WatermarkTracker};

/// Observable state of the streaming pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not yet started.
    Idle,
    /// Producer is enumerating pages.
    Producing,
    /// Producer finished; workers are draining the work channel.
    Draining,
    /// All records produced and the watermark finalized.
    Completed,
    /// The run was cancelled; no watermark was finalized.
    Cancelled,
}

impl PipelineState {
    fn as_u8(self) -> u8 {
        match self {
            PipelineState::Idle => 0,
            PipelineState::Producing => 1,
            PipelineState::Draining => 2,
            PipelineState::Completed => 3,
            PipelineState::Cancelled => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelineState::Producing,
            2 => PipelineState::Draining,
            3 => PipelineState::Completed,
            4 => PipelineState::Cancelled,
            _ => PipelineState::Idle,
        }
    }
}

/// Counters and timing reported when a run closes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Records surfaced to (or applied for) the caller.
    pub count: u64,
    /// Records that carried a continue-the-run error.
    pub error_count: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Throughput in objects per second.
    pub objects_per_sec: f64,
}

fn throughput(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if count == 0 || secs <= 0.0 {
        0.0
    } else {
        count as f64 / secs
    }
}

/// Run-scope state for an import run, shared by the producer, every worker,
/// and the batch controller.
pub struct ImportContext {
    /// Unique id for this run, carried on every log line.
    pub run_id: Uuid,

    /// Full or delta.
    pub mode: RunMode,

    /// Watermarks persisted by the previous run (read-only).
    pub inbound: WatermarkSet,

    /// Running maxima accumulated by workers during this run.
    pub tracker: WatermarkTracker,

    /// Shared cancellation signal, checked at every worker iteration and
    /// page fetch.
    pub cancellation: CancellationToken,

    produced: AtomicU64,
    errors: AtomicU64,
    state: AtomicU8,
    outbound: Mutex<WatermarkSet>,
    fatal: Mutex<Option<String>>,
    started: Instant,
}

impl ImportContext {
    /// Create a context for a run tracking the given watermark keys.
    pub fn new<I, S>(mode: RunMode, inbound: WatermarkSet, watermark_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            inbound,
            tracker: WatermarkTracker::new(watermark_keys),
            cancellation: CancellationToken::new(),
            produced: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            state: AtomicU8::new(PipelineState::Idle.as_u8()),
            outbound: Mutex::new(WatermarkSet::new()),
            fatal: Mutex::new(None),
            started: Instant::now(),
        }
    }

    /// Count one record handed to the caller.
    pub fn record_consumed(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one error-flagged record.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: PipelineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Record a fatal producer failure. The first failure wins.
    pub(crate) fn set_fatal(&self, message: String) {
        let mut guard = self.fatal.lock().expect("fatal mutex poisoned");
        if guard.is_none() {
            *guard = Some(message);
        }
    }

    /// The fatal failure message, if the producer failed.
    pub fn fatal(&self) -> Option<String> {
        self.fatal.lock().expect("fatal mutex poisoned").clone()
    }

    /// Finalize every tracked cursor into the outbound set.
    pub(crate) fn finalize_watermarks(&self) -> crate::error::SyncResult<()> {
        let mut outbound = self.outbound.lock().expect("outbound mutex poisoned");
        self.tracker
            .finalize_into(&mut outbound, &self.inbound, self.mode)
    }

    /// The outbound watermark set accumulated so far.
    pub fn outbound_watermarks(&self) -> WatermarkSet {
        self.outbound.lock().expect("outbound mutex poisoned").clone()
    }

    /// Build the close-time summary.
    pub fn summary(&self) -> RunSummary {
        let count = self.produced.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed();
        RunSummary {
            count,
            error_count: self.errors.load(Ordering::Relaxed),
            elapsed,
            objects_per_sec: throughput(count, elapsed),
        }
    }
}

/// Run-scope state for an export run.
pub struct ExportContext {
    /// Unique id for this run, carried on every log line.
    pub run_id: Uuid,

    /// Shared cancellation signal.
    pub cancellation: CancellationToken,

    /// How `Delete` records are applied.
    pub deprovisioning: DeprovisioningPolicy,

    exported: AtomicU64,
    errors: AtomicU64,
    started: Instant,
}

impl ExportContext {
    /// Create an export context with the given deprovisioning policy.
    #[must_use]
    pub fn new(deprovisioning: DeprovisioningPolicy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancellation: CancellationToken::new(),
            deprovisioning,
            exported: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Count one exported record.
    pub fn record_exported(&self) {
        self.exported.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one failed record.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Build the close-time summary.
    pub fn summary(&self) -> RunSummary {
        let count = self.exported.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed();
        RunSummary {
            count,
            error_count: self.errors.load(Ordering::Relaxed),
            elapsed,
            objects_per_sec: throughput(count, elapsed),
        }
    }
}

impl Default for ExportContext {
    fn default() -> Self {
        Self::new(DeprovisioningPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::Watermark;

    #[test]
    fn test_state_round_trip() {
        for state in [
            PipelineState::Idle,
            PipelineState::Producing,
            PipelineState::Draining,
            PipelineState::Completed,
            PipelineState::Cancelled,
        ] {
            assert_eq!(PipelineState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_counters_and_summary() {
        let ctx = ImportContext::new(RunMode::Full, WatermarkSet::new(), ["users"]);
        ctx.record_consumed();
        ctx.record_consumed();
        ctx.record_error();

        let summary = ctx.summary();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.error_count, 1);
    }

    #[test]
    fn test_first_fatal_wins() {
        let ctx = ImportContext::new(RunMode::Full, WatermarkSet::new(), ["users"]);
        ctx.set_fatal("first".to_string());
        ctx.set_fatal("second".to_string());
        assert_eq!(ctx.fatal().as_deref(), Some("first"));
    }

    #[test]
    fn test_finalize_preserves_inbound() {
        let inbound: WatermarkSet = [Watermark::from_ticks("users", 10)].into_iter().collect();
        let ctx = ImportContext::new(RunMode::Delta, inbound, ["users"]);

        ctx.finalize_watermarks().unwrap();
        let outbound = ctx.outbound_watermarks();
        assert_eq!(outbound.get("users").unwrap().ticks().unwrap(), 10);
    }

    #[test]
    fn test_throughput_zero_when_empty() {
        let ctx = ExportContext::default();
        assert_eq!(ctx.summary().objects_per_sec, 0.0);
    }
}
