//! Router configuration.
//!
//! These structs are plain serde types so that `parley-runtime` can embed
//! them in its configuration file under the `[router]` table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Number of worker tasks pulling events.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the inbound queue between the event source and the workers.
    /// In sharded mode the capacity is split evenly across the shards.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How events are assigned to workers.
    #[serde(default)]
    pub dispatch: DispatchMode,

    /// Graceful-drain settings used by `shutdown`.
    #[serde(default)]
    pub drain: DrainConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            dispatch: DispatchMode::default(),
            drain: DrainConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Worker count, never less than one.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }

    /// Queue capacity, never less than one.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

fn default_workers() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    1024
}

/// Assignment of events to workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// All workers pull from one shared queue. Two events of the same
    /// conversation may be handled concurrently and race on its state row.
    #[default]
    Shared,

    /// Each worker owns a queue; events are assigned by a hash of their
    /// conversation key, so one conversation is always handled in order by
    /// the same worker.
    Sharded,
}

/// Graceful-drain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// First wait interval in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single wait interval in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive intervals.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Hard deadline for the whole drain in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl DrainConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_deadline_ms() -> u64 {
    5000
}
