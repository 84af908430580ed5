//! Trellis Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Glitch-free, dependency-ordered change propagation
//! - Batching and synchronous flush control
//! - Ownership scopes with nested disposal
//! - Keyed collection signals with per-item granularity
//!
//! Everything runs on one thread, synchronously from the caller's point of
//! view. A [`Runtime`] owns one dependency graph; handles created from it
//! are `!Send`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives, dependency tracking and the runtime
//! - `graph`: The node arena, dirty-state propagation and the pending queue
//! - `config`: Runtime configuration
//! - `error`: The crate error type
//!
//! # Example
//!
//! ```rust
//! use trellis_core::Runtime;
//!
//! # fn main() -> trellis_core::Result<()> {
//! let rt = Runtime::new();
//! let (count, set_count) = rt.create_signal(0);
//!
//! let doubled = rt.create_computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! let root = rt.create_root(|root| {
//!     rt.create_effect(move || {
//!         println!("Count: {}, Doubled: {}", count.get(), doubled.get());
//!     })?;
//!     Ok::<_, trellis_core::ReactiveError>(root)
//! })?;
//!
//! // Effect runs again before `set` returns: "Count: 5, Doubled: 10"
//! set_count.set(5)?;
//!
//! root.dispose()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{FlushMode, RuntimeConfig};
pub use error::{BoxError, ReactiveError, Result};
pub use graph::{DirtyState, GraphSnapshot, NodeId, NodeKind, NodeSnapshot};
pub use reactive::{
    Cleanup, Computed, Effect, EffectOutput, KeyedSignal, ReadSignal, RootHandle, Runtime, Signal,
    WriteSignal,
};
