//! Runtime Configuration
//!
//! Hosts embed the engine in very different loops: a test harness wants every
//! write to settle before it returns, while a UI event loop wants to coalesce
//! all writes of one frame and settle them once. [`RuntimeConfig`] selects
//! between the two and bounds runaway effect loops.
//!
//! The configuration is plain data and can be loaded with serde:
//!
//! ```rust,ignore
//! let config: RuntimeConfig = serde_json::from_str(r#"{ "flush_mode": "deferred" }"#)?;
//! let rt = Runtime::with_config(config);
//! ```

use serde::{Deserialize, Serialize};

/// Default upper bound on flush passes before the runtime gives up.
pub const DEFAULT_MAX_FLUSH_PASSES: usize = 10_000;

/// When writes outside a batch are flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// A write outside any batch flushes before returning. Effect errors
    /// surface from the write itself.
    #[default]
    Immediate,

    /// Writes only enqueue. The host drains the queue with
    /// [`Runtime::flush_sync`](crate::Runtime::flush_sync), and effect errors
    /// surface from that call. Batches still flush on exit.
    Deferred,
}

/// Tunables for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// When writes outside a batch are flushed.
    pub flush_mode: FlushMode,

    /// Maximum number of passes over the pending queue in one flush.
    ///
    /// Each pass runs every effect queued by the previous one, so this only
    /// trips when effects keep re-triggering each other.
    pub max_flush_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::default(),
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
        }
    }
}

impl RuntimeConfig {
    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_flushes_immediately() {
        let config = RuntimeConfig::default();
        assert_eq!(config.flush_mode, FlushMode::Immediate);
        assert_eq!(config.max_flush_passes, DEFAULT_MAX_FLUSH_PASSES);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "flush_mode": "deferred" }"#).unwrap();
        assert_eq!(config.flush_mode, FlushMode::Deferred);
        assert_eq!(config.max_flush_passes, DEFAULT_MAX_FLUSH_PASSES);

        let config: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn max_passes_is_at_least_one() {
        let config = RuntimeConfig::default().with_max_flush_passes(0);
        assert_eq!(config.max_flush_passes, 1);
    }
}
