//! Runner configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for one [`crate::Runner`].
/// Every field has a default so partial JSON configs deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Debounce window of the animation batcher, in milliseconds.
    /// Larger windows coalesce more submissions at the cost of latency.
    pub batch_window_ms: u64,

    /// Run `seq` children one after another instead of concurrently.
    /// Off by default: both group kinds traverse their children concurrently.
    pub sequential_seq: bool,

    /// Give shapes armed with an onClick condition a pointer cursor and raise them.
    pub highlight_click_targets: bool,
}

impl RunnerConfig {
    #[inline]
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 10,
            sequential_seq: false,
            highlight_click_targets: true,
        }
    }
}
