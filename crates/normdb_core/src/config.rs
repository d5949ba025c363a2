//! Store configuration.

use crate::collection::ConflictPolicy;

/// Configuration for a [`crate::store::Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Collapse concurrent identical finds into one adapter call and
    /// serve repeat finds from the cache. On by default.
    pub dedup_finds: bool,
    /// Conflict policy for collections the store creates.
    pub on_conflict: ConflictPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dedup_finds: true,
            on_conflict: ConflictPolicy::Merge,
        }
    }
}

impl StoreConfig {
    /// Enables or disables find de-duplication.
    #[must_use]
    pub fn dedup_finds(mut self, enabled: bool) -> Self {
        self.dedup_finds = enabled;
        self
    }

    /// Sets the conflict policy for store-created collections.
    #[must_use]
    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }
}
