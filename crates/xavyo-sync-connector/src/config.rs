//! Run configuration.

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierPolicy;

/// Configuration for import and export runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Page size requested from the source enumerator.
    pub page_size: usize,

    /// Number of concurrent import workers.
    pub import_concurrency: usize,

    /// Number of concurrent export workers.
    pub export_concurrency: usize,

    /// Capacity of the bounded work and hand-off channels.
    pub channel_capacity: usize,

    /// Number of change records per caller-facing batch.
    pub batch_size: usize,

    /// Force strictly serial execution for deterministic debugging.
    pub deterministic: bool,

    /// Classification policy override. `None` keeps each handler's own
    /// policy, so the group handler's created-after-watermark behavior is
    /// only replaced when a caller asks for it.
    pub policy: Option<ClassifierPolicy>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            import_concurrency: 4,
            export_concurrency: 4,
            channel_capacity: 256,
            batch_size: 100,
            deterministic: false,
            policy: None,
        }
    }
}

impl SyncConfig {
    /// Set the import worker count.
    #[must_use]
    pub fn with_import_concurrency(mut self, n: usize) -> Self {
        self.import_concurrency = n.max(1);
        self
    }

    /// Set the export worker count.
    #[must_use]
    pub fn with_export_concurrency(mut self, n: usize) -> Self {
        self.export_concurrency = n.max(1);
        self
    }

    /// Set the source page size.
    #[must_use]
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }

    /// Set the caller-facing batch size.
    #[must_use]
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    /// Enable deterministic (strictly serial) execution.
    #[must_use]
    pub fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }

    /// Override every handler's classification policy for this run.
    #[must_use]
    pub fn with_policy(mut self, policy: ClassifierPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Import workers to actually run, honoring deterministic mode.
    #[must_use]
    pub fn effective_import_concurrency(&self) -> usize {
        if self.deterministic {
            1
        } else {
            self.import_concurrency.max(1)
        }
    }

    /// Export workers to actually run, honoring deterministic mode.
    #[must_use]
    pub fn effective_export_concurrency(&self) -> usize {
        if self.deterministic {
            1
        } else {
            self.export_concurrency.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 200);
        assert_eq!(config.import_concurrency, 4);
        assert_eq!(config.batch_size, 100);
        assert!(!config.deterministic);
        assert!(config.policy.is_none());
    }

    #[test]
    fn test_policy_override_is_explicit() {
        let config = SyncConfig::default().with_policy(ClassifierPolicy::default());
        assert_eq!(config.policy, Some(ClassifierPolicy::default()));
    }

    #[test]
    fn test_deterministic_forces_serial() {
        let config = SyncConfig::default()
            .with_import_concurrency(16)
            .deterministic();
        assert_eq!(config.effective_import_concurrency(), 1);
        assert_eq!(config.effective_export_concurrency(), 1);
    }

    #[test]
    fn test_concurrency_floor() {
        let config = SyncConfig::default().with_import_concurrency(0);
        assert_eq!(config.effective_import_concurrency(), 1);
    }
}
