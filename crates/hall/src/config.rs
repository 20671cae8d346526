//! Hall configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the hall core.
///
/// Deserializable so the host can embed it in its own config file;
/// missing fields fall back to [`HallConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallConfig {
    /// How often the announcement source is polled.
    pub announce_interval_ms: u64,
    /// Announcements buffered between the poller and the fanout task.
    /// When full, the poller waits.
    pub announce_queue_capacity: usize,
    /// Leaderboard page size used when a request doesn't set one.
    pub default_page_size: u64,
}

impl Default for HallConfig {
    fn default() -> Self {
        Self {
            announce_interval_ms: 1_000,
            announce_queue_capacity: 10,
            default_page_size: 10,
        }
    }
}

impl HallConfig {
    /// Replaces zero values with the defaults.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.announce_interval_ms == 0 {
            tracing::warn!("announce_interval_ms is 0, using default");
            self.announce_interval_ms = defaults.announce_interval_ms;
        }
        if self.announce_queue_capacity == 0 {
            tracing::warn!("announce_queue_capacity is 0, using default");
            self.announce_queue_capacity = defaults.announce_queue_capacity;
        }
        if self.default_page_size == 0 {
            self.default_page_size = defaults.default_page_size;
        }
        self
    }

    /// The poll period as a `Duration`.
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }
}
