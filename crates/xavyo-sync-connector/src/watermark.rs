//! Watermarks: opaque, monotonically advancing cursors.
//!
//! A watermark requests "only objects changed since X" on the next delta run.
//! The persisted form is an ordered list of `{key, value, kind}` entries,
//! serialized to JSON and handed back to the caller at run close. During a
//! run, per-type running maxima are tracked lock-free by
//! [`WatermarkTracker`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::types::RunMode;

/// Cursor kind tag carried in the persisted form.
pub const CURSOR_KIND_DATETIME: &str = "DateTime";

/// Sentinel meaning "no value observed yet" in a tracker slot.
const UNSET: i64 = i64::MIN;

/// A single per-type cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    /// Type key (e.g. "users", "group", "group-member").
    #[serde(rename = "id")]
    pub key: String,

    /// Opaque cursor value. For `DateTime` cursors this is a millisecond
    /// timestamp rendered as a decimal string, but consumers treat it as
    /// opaque.
    pub value: String,

    /// Cursor type tag.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Watermark {
    /// Create a watermark.
    pub fn new(key: impl Into<String>, value: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: kind.into(),
        }
    }

    /// Create a `DateTime`-kind watermark from millisecond ticks.
    pub fn from_ticks(key: impl Into<String>, ticks: i64) -> Self {
        Self::new(key, ticks.to_string(), CURSOR_KIND_DATETIME)
    }

    /// Parse the cursor as millisecond ticks.
    pub fn ticks(&self) -> SyncResult<i64> {
        self.value
            .parse::<i64>()
            .map_err(|e| SyncError::invalid_watermark(&self.key, e.to_string()))
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == CURSOR_KIND_DATETIME {
            if let Ok(ticks) = self.ticks() {
                if let Some(dt) = DateTime::from_timestamp_millis(ticks) {
                    return write!(f, "{}:{}", self.key, dt.to_rfc3339());
                }
            }
            write!(f, "{}:unknown", self.key)
        } else {
            write!(f, "{}:{}", self.key, self.value)
        }
    }
}

/// A keyed collection of watermarks, unique by type key, preserving insertion
/// order in the persisted form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatermarkSet {
    items: Vec<Watermark>,
}

impl WatermarkSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a watermark by type key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Watermark> {
        self.items.iter().find(|w| w.key == key)
    }

    /// Insert a watermark, replacing any existing entry with the same key.
    pub fn insert(&mut self, watermark: Watermark) {
        if let Some(existing) = self.items.iter_mut().find(|w| w.key == watermark.key) {
            *existing = watermark;
        } else {
            self.items.push(watermark);
        }
    }

    /// Check whether the set holds no cursors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of cursors held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Watermark> {
        self.items.iter()
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from the persisted JSON form.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl FromIterator<Watermark> for WatermarkSet {
    fn from_iter<T: IntoIterator<Item = Watermark>>(iter: T) -> Self {
        let mut set = Self::new();
        for wm in iter {
            set.insert(wm);
        }
        set
    }
}

/// Parse the required inbound cursor for a delta filter.
///
/// A delta run without an inbound watermark for a required type is fatal.
pub fn required_watermark(set: &WatermarkSet, key: &str) -> SyncResult<i64> {
    set.get(key)
        .ok_or_else(|| SyncError::missing_watermark(key))?
        .ticks()
}

/// Tracks per-type running maxima during a run.
///
/// Every worker advances the tracker concurrently; the slot is an atomic
/// updated by a compare-and-swap retry loop (read current, compute max, CAS,
/// retry on conflict), so the result is the true maximum of all submitted
/// values regardless of interleaving and no lock is held.
#[derive(Debug)]
pub struct WatermarkTracker {
    slots: HashMap<String, AtomicI64>,
}

impl WatermarkTracker {
    /// Create a tracker for the given type keys. Keys are fixed for the life
    /// of the run.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: keys
                .into_iter()
                .map(|k| (k.into(), AtomicI64::new(UNSET)))
                .collect(),
        }
    }

    /// Atomically merge `candidate` into the running maximum for `key`.
    ///
    /// Unknown keys are ignored; a run only tracks the cursors it declared.
    pub fn advance(&self, key: &str, candidate: i64) {
        if let Some(slot) = self.slots.get(key) {
            let mut current = slot.load(Ordering::Acquire);
            loop {
                let next = current.max(candidate);
                match slot.compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        }
    }

    /// Read the running maximum for a key, if any value was observed.
    #[must_use]
    pub fn current(&self, key: &str) -> Option<i64> {
        self.slots
            .get(key)
            .map(|s| s.load(Ordering::Acquire))
            .filter(|v| *v != UNSET)
    }

    /// Produce the outbound cursor for one key.
    ///
    /// Preserve-on-empty: if no item advanced this key during the run, the
    /// inbound watermark is returned unchanged so a run with zero changed
    /// objects cannot corrupt the cursor. If there is no inbound value either,
    /// a delta run fails fatally and a full run simply yields no cursor.
    pub fn finalize(
        &self,
        key: &str,
        inbound: &WatermarkSet,
        mode: RunMode,
    ) -> SyncResult<Option<Watermark>> {
        if let Some(max) = self.current(key) {
            return Ok(Some(Watermark::from_ticks(key, max)));
        }

        match inbound.get(key) {
            Some(wm) => Ok(Some(wm.clone())),
            None if mode.is_delta() => Err(SyncError::missing_watermark(key)),
            None => Ok(None),
        }
    }

    /// Finalize every tracked key into `outbound`.
    pub fn finalize_into(
        &self,
        outbound: &mut WatermarkSet,
        inbound: &WatermarkSet,
        mode: RunMode,
    ) -> SyncResult<()> {
        // Deterministic key order for the persisted form.
        let mut keys: Vec<&String> = self.slots.keys().collect();
        keys.sort();

        for key in keys {
            if let Some(wm) = self.finalize(key, inbound, mode)? {
                outbound.insert(wm);
            }
        }
        Ok(())
    }
}
