//! Core enums for runs, modification intents, and lifecycle policies.

use serde::{Deserialize, Serialize};

/// The kind of run being performed against the source system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Enumerate and classify every object, ignoring prior watermarks.
    Full,
    /// Consider only objects changed since the last watermark.
    Delta,
}

impl RunMode {
    /// Check whether this is an incremental run.
    #[must_use]
    pub fn is_delta(&self) -> bool {
        matches!(self, RunMode::Delta)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::Delta => write!(f, "delta"),
        }
    }
}

/// What should happen to an object in the synchronization engine.
///
/// `None` is an internal classification outcome only: records classified as
/// `None` are dropped before they reach the hand-off channel and are never
/// surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectModification {
    /// A new object to be created.
    Add,
    /// A full replacement of the object's attribute state.
    Replace,
    /// An update carrying only changed attributes.
    Update,
    /// The object should be removed.
    Delete,
    /// No change record should be produced.
    None,
}

impl std::fmt::Display for ObjectModification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectModification::Add => write!(f, "add"),
            ObjectModification::Replace => write!(f, "replace"),
            ObjectModification::Update => write!(f, "update"),
            ObjectModification::Delete => write!(f, "delete"),
            ObjectModification::None => write!(f, "none"),
        }
    }
}

/// Lifecycle state of an object in the source system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Fully provisioned and usable.
    Active,
    /// Created but not yet activated.
    Staged,
    /// Temporarily blocked from signing in.
    Suspended,
    /// Terminally removed from service.
    Deprovisioned,
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStatus::Active => write!(f, "active"),
            LifecycleStatus::Staged => write!(f, "staged"),
            LifecycleStatus::Suspended => write!(f, "suspended"),
            LifecycleStatus::Deprovisioned => write!(f, "deprovisioned"),
        }
    }
}

/// How deprovisioned objects are handled.
///
/// `Deactivate` suppresses the terminal-state shortcut in the classifier, so
/// removed objects surface as ordinary updates instead of deletes, and the
/// export dispatcher stops after deactivation instead of deleting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeprovisioningPolicy {
    /// Deprovisioned objects are deleted from the engine / remote store.
    #[default]
    Delete,
    /// Deprovisioned objects are only deactivated and keep flowing as updates.
    Deactivate,
}

/// How a delta run classifies objects that are not in a removed state.
///
/// The source history is ambiguous here: one provider always emitted
/// `Replace`, another compared the creation time against the watermark epoch
/// and emitted `Add` for newly created objects. Both are supported as an
/// explicit policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaAddPolicy {
    /// Every non-removed object in a delta run is a `Replace`.
    #[default]
    AlwaysReplace,
    /// Objects created after the watermark epoch are `Add`; the rest are
    /// `Update`.
    AddWhenCreatedAfterWatermark,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode() {
        assert!(RunMode::Delta.is_delta());
        assert!(!RunMode::Full.is_delta());
        assert_eq!(RunMode::Full.to_string(), "full");
    }

    #[test]
    fn test_display() {
        assert_eq!(ObjectModification::Replace.to_string(), "replace");
        assert_eq!(LifecycleStatus::Deprovisioned.to_string(), "deprovisioned");
    }

    #[test]
    fn test_policy_defaults() {
        assert_eq!(DeprovisioningPolicy::default(), DeprovisioningPolicy::Delete);
        assert_eq!(DeltaAddPolicy::default(), DeltaAddPolicy::AlwaysReplace);
    }
}
