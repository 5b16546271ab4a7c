//! Change classification: lifecycle state + run mode → modification intent.

use serde::{Deserialize, Serialize};

use crate::source::RawObject;
use crate::types::{
    DeltaAddPolicy, DeprovisioningPolicy, LifecycleStatus, ObjectModification, RunMode,
};

/// Policy switches governing classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    /// How terminally removed objects are handled.
    pub deprovisioning: DeprovisioningPolicy,

    /// How non-removed objects classify in a delta run.
    pub delta_add: DeltaAddPolicy,
}

/// Check whether the object is in a terminal removed state.
///
/// An object transitioning toward `Active` is treated as not removed even if
/// its current status says otherwise, so a spurious delete cannot race a
/// reactivation.
#[must_use]
pub fn is_removed(object: &RawObject) -> bool {
    let deprovisioned = object.status == LifecycleStatus::Deprovisioned
        || object.transitioning_to == Some(LifecycleStatus::Deprovisioned);

    deprovisioned && object.transitioning_to != Some(LifecycleStatus::Active)
}

/// Map an object's lifecycle state and the run mode to a modification intent.
///
/// `watermark_epoch` is the inbound cursor (millisecond ticks) and is only
/// consulted under [`DeltaAddPolicy::AddWhenCreatedAfterWatermark`].
///
/// A `None` result means the object is not surfaced at all; callers drop it
/// before any record is built.
#[must_use]
pub fn classify(
    object: &RawObject,
    mode: RunMode,
    watermark_epoch: Option<i64>,
    policy: &ClassifierPolicy,
) -> ObjectModification {
    // Under a deactivate-only deprovisioning policy the terminal-state
    // shortcut is suppressed entirely: removed objects flow as ordinary
    // updates.
    let removed =
        policy.deprovisioning != DeprovisioningPolicy::Deactivate && is_removed(object);

    match mode {
        RunMode::Full => {
            if removed {
                // A full run has no prior record to delete.
                tracing::trace!(id = %object.id, "discarding object in deprovisioned state");
                ObjectModification::None
            } else {
                ObjectModification::Add
            }
        }
        RunMode::Delta => {
            if removed {
                return ObjectModification::Delete;
            }

            match policy.delta_add {
                DeltaAddPolicy::AlwaysReplace => ObjectModification::Replace,
                DeltaAddPolicy::AddWhenCreatedAfterWatermark => {
                    let created_ticks = object.created.map(|dt| dt.timestamp_millis());
                    match (created_ticks, watermark_epoch) {
                        (Some(created), Some(epoch)) if created > epoch => {
                            ObjectModification::Add
                        }
                        _ => ObjectModification::Update,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn active_user(id: &str) -> RawObject {
        RawObject::new(id, "user")
    }

    fn deprovisioned_user(id: &str) -> RawObject {
        RawObject::new(id, "user").with_status(LifecycleStatus::Deprovisioned)
    }

    #[test]
    fn test_full_run_active_is_add() {
        let policy = ClassifierPolicy::default();
        assert_eq!(
            classify(&active_user("a"), RunMode::Full, None, &policy),
            ObjectModification::Add
        );
    }

    #[test]
    fn test_full_run_removed_is_none() {
        let policy = ClassifierPolicy::default();
        assert_eq!(
            classify(&deprovisioned_user("a"), RunMode::Full, None, &policy),
            ObjectModification::None
        );
    }

    #[test]
    fn test_delta_run_removed_is_delete() {
        let policy = ClassifierPolicy::default();
        assert_eq!(
            classify(&deprovisioned_user("a"), RunMode::Delta, None, &policy),
            ObjectModification::Delete
        );
    }

    #[test]
    fn test_delta_run_active_is_replace() {
        let policy = ClassifierPolicy::default();
        assert_eq!(
            classify(&active_user("a"), RunMode::Delta, None, &policy),
            ObjectModification::Replace
        );
    }

    #[test]
    fn test_transitioning_to_deprovisioned_counts_as_removed() {
        let policy = ClassifierPolicy::default();
        let obj = active_user("a").transitioning_to(LifecycleStatus::Deprovisioned);
        assert_eq!(
            classify(&obj, RunMode::Delta, None, &policy),
            ObjectModification::Delete
        );
    }

    #[test]
    fn test_reactivation_race_is_not_removed() {
        let policy = ClassifierPolicy::default();
        let obj = deprovisioned_user("a").transitioning_to(LifecycleStatus::Active);
        assert!(!is_removed(&obj));
        assert_eq!(
            classify(&obj, RunMode::Delta, None, &policy),
            ObjectModification::Replace
        );
        assert_eq!(
            classify(&obj, RunMode::Full, None, &policy),
            ObjectModification::Add
        );
    }

    #[test]
    fn test_deactivate_policy_suppresses_shortcut() {
        let policy = ClassifierPolicy {
            deprovisioning: DeprovisioningPolicy::Deactivate,
            ..Default::default()
        };
        assert_eq!(
            classify(&deprovisioned_user("a"), RunMode::Delta, None, &policy),
            ObjectModification::Replace
        );
        assert_eq!(
            classify(&deprovisioned_user("a"), RunMode::Full, None, &policy),
            ObjectModification::Add
        );
    }

    #[test]
    fn test_created_after_watermark_policy() {
        let policy = ClassifierPolicy {
            delta_add: DeltaAddPolicy::AddWhenCreatedAfterWatermark,
            ..Default::default()
        };
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let newer = active_user("a").created_at(epoch + chrono::Duration::hours(1));
        assert_eq!(
            classify(
                &newer,
                RunMode::Delta,
                Some(epoch.timestamp_millis()),
                &policy
            ),
            ObjectModification::Add
        );

        let older = active_user("b").created_at(epoch - chrono::Duration::hours(1));
        assert_eq!(
            classify(
                &older,
                RunMode::Delta,
                Some(epoch.timestamp_millis()),
                &policy
            ),
            ObjectModification::Update
        );

        // No creation time recorded: fall back to Update.
        assert_eq!(
            classify(
                &active_user("c"),
                RunMode::Delta,
                Some(epoch.timestamp_millis()),
                &policy
            ),
            ObjectModification::Update
        );
    }
}
