//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds,
//! effects, ownership scopes and keyed collections. Every primitive is
//! created from a [`Runtime`], which owns the dependency graph they share.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while a computed or effect is running, that computation is recorded as a
//! dependent. When the signal's value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changes, and only when it is read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems.
//!
//! ## Scopes
//!
//! A scope owns the computeds and effects created inside it. Disposing the
//! scope disposes all of them.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically: the runtime keeps a stack of
//! running computations, and every read is recorded against the top of it.
//! The sources collected during a run replace the previous ones, so
//! branches that are no longer taken stop triggering reruns.

mod computed;
mod context;
mod effect;
mod keyed;
mod runtime;
mod scope;
mod signal;

pub use computed::Computed;
pub use effect::{Cleanup, Effect, EffectOutput};
pub use keyed::KeyedSignal;
pub use runtime::Runtime;
pub use scope::RootHandle;
pub use signal::{ReadSignal, Signal, WriteSignal};

pub(crate) use runtime::Reactive;
