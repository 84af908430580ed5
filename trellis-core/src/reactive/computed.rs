//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its derivation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a signal it read changes, the computed is marked `Dirty`. When
//!    something further upstream changes, it is marked `Check`.
//!
//! 4. On next access, a `Check` computed first brings its own computed
//!    sources up to date. Only if one of them produced a new value does it
//!    recompute. A `Dirty` computed always recomputes.
//!
//! 5. If the recomputed value equals the cached one, readers that were only
//!    marked `Check` are not re-run.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, Payload};

use super::runtime::{Reactive, Runtime, RuntimeState};

struct ComputedState<T> {
    /// The derivation function.
    derive: Box<dyn Fn() -> T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    /// Set while the derivation is running, to detect self-reads.
    running: Cell<bool>,
}

impl<T> Reactive for ComputedState<T>
where
    T: Clone + PartialEq + 'static,
{
    fn run(&self, rt: &RuntimeState, id: NodeId) -> Result<bool> {
        self.running.set(true);
        let _running = ResetOnDrop(&self.running);

        let next = rt.run_tracked(id, || (self.derive)());

        let mut value = self.value.borrow_mut();
        if value.as_ref() == Some(&next) {
            return Ok(false);
        }
        *value = Some(next);
        Ok(true)
    }
}

struct ResetOnDrop<'a>(&'a Cell<bool>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. `PartialEq` lets the runtime skip
///   re-running readers when a recomputation yields the same value.
///
/// # Ownership
///
/// A computed belongs to the owner that was active when it was created and
/// is disposed with it. Reading a disposed computed is inert: it returns the
/// last cached value and tracks nothing.
pub struct Computed<T: 'static> {
    id: NodeId,
    rt: Weak<RuntimeState>,
    state: Rc<ComputedState<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + 'static,
{
    /// The derivation is not run until the first read.
    pub(crate) fn new_in<F>(rt: &Runtime, derive: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let state = Rc::new(ComputedState {
            derive: Box::new(derive),
            value: RefCell::new(None),
            running: Cell::new(false),
        });
        let reactive: Rc<dyn Reactive> = state.clone();
        let id = rt.state().register(Payload::Computed(reactive));

        Self {
            id,
            rt: rt.downgrade(),
            state,
        }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the derivation reads this computed (a dependency cycle) or
    /// if a cleanup registered inside the derivation fails. Use
    /// [`try_get`](Computed::try_get) to handle those as errors.
    pub fn get(&self) -> T {
        self.try_get()
            .unwrap_or_else(|err| panic!("failed to read computed: {err}"))
    }

    /// Get the current value, recomputing if necessary.
    pub fn try_get(&self) -> Result<T> {
        if self.state.running.get() {
            return Err(ReactiveError::Cycle(self.id));
        }
        let Some(rt) = self.rt.upgrade() else {
            return Ok(self.detached_value(None));
        };

        rt.track_read(self.id);
        if !rt.is_live(self.id) {
            return Ok(self.detached_value(Some(&*rt)));
        }
        rt.update_if_necessary(self.id)?;

        let cached = self.state.value.borrow().clone();
        match cached {
            Some(value) => Ok(value),
            None => Ok(self.detached_value(Some(&*rt))),
        }
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        match self.rt.upgrade() {
            Some(rt) => rt.untrack(|| self.get()),
            None => self.get(),
        }
    }

    /// Alias for [`peek`](Computed::peek).
    pub fn get_untracked(&self) -> T {
        self.peek()
    }

    /// Whether the computed has been disposed along with its owner.
    pub fn is_disposed(&self) -> bool {
        self.rt.upgrade().map_or(true, |rt| !rt.is_live(self.id))
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.state.value.borrow().is_some()
    }

    /// Get the number of computations currently reading this computed.
    pub fn observer_count(&self) -> usize {
        self.rt
            .upgrade()
            .map(|rt| rt.observer_count(self.id))
            .unwrap_or(0)
    }

    /// Value of a computed that is no longer part of a live graph: the
    /// cache if there is one, otherwise one untracked evaluation.
    fn detached_value(&self, rt: Option<&RuntimeState>) -> T {
        if let Some(value) = self.state.value.borrow().clone() {
            return value;
        }

        self.state.running.set(true);
        let value = {
            let _running = ResetOnDrop(&self.state.running);
            match rt {
                Some(rt) => rt.untrack(|| (self.state.derive)()),
                None => (self.state.derive)(),
            }
        };
        *self.state.value.borrow_mut() = Some(value.clone());
        value
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            rt: Weak::clone(&self.rt),
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id)
            .field("value", &*self.state.value.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
