//! Error Types
//!
//! The engine distinguishes two classes of failure:
//!
//! - **User-function errors**: a signal updater, effect body or cleanup
//!   returned an error. These are never caught or logged by the engine; they
//!   surface from whichever call triggered the work (`set`, `batch`,
//!   `flush_sync`, `create_effect`).
//!
//! - **Misuse errors**: an owner-relative API was called with no active
//!   owner, or a disposed scope was re-entered. These are returned at the
//!   point of misuse.
//!
//! Panics inside derivations are not converted; they unwind through the
//! engine unchanged.

use crate::graph::NodeId;

/// Boxed error produced by user code (effect bodies, cleanups, updaters).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// An effect body returned an error.
    #[error("effect {node:?} failed: {source}")]
    Effect {
        node: NodeId,
        #[source]
        source: BoxError,
    },

    /// A cleanup registered on a node returned an error.
    #[error("cleanup for {node:?} failed: {source}")]
    Cleanup {
        node: NodeId,
        #[source]
        source: BoxError,
    },

    /// A fallible signal updater returned an error. The signal is unchanged.
    #[error("signal updater failed: {0}")]
    Updater(#[source] BoxError),

    /// An owner-relative operation was called outside of any owner.
    #[error("`{operation}` called outside of a reactive owner")]
    NoOwner { operation: &'static str },

    /// The node or scope has already been disposed.
    #[error("{0:?} has been disposed")]
    Disposed(NodeId),

    /// A computed read itself while it was being computed.
    #[error("dependency cycle detected while computing {0:?}")]
    Cycle(NodeId),

    /// The flush loop did not settle within the configured number of passes.
    #[error("flush did not settle after {passes} passes; an effect keeps re-triggering itself")]
    FlushLimit { passes: usize },
}

impl ReactiveError {
    /// Whether this error originated in user code rather than engine misuse.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ReactiveError::Effect { .. } | ReactiveError::Cleanup { .. } | ReactiveError::Updater(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_classified() {
        let err = ReactiveError::Updater("bad input".into());
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "signal updater failed: bad input");

        let err = ReactiveError::NoOwner { operation: "on_cleanup" };
        assert!(!err.is_user_error());
        assert_eq!(
            err.to_string(),
            "`on_cleanup` called outside of a reactive owner"
        );
    }

    #[test]
    fn effect_error_exposes_source() {
        use std::error::Error as _;

        let err = ReactiveError::Effect {
            node: NodeId::default(),
            source: "boom".into(),
        };
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }
}
