//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. It runs during the
//!    next flush, at most once per pass no matter how many of its
//!    dependencies changed.
//!
//! 3. Before re-running, the effect runs its cleanups and disposes anything
//!    it created during the previous run. The sources it reads this run
//!    replace the previous ones.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when
//!   deps change).
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is disposed. This is useful for
//! cleaning up resources like event listeners or timers.
//!
//! # Errors
//!
//! An effect body may return `Result<(), E>` or `Result<Cleanup, E>`. An
//! error is returned from the call that caused the run (`create_effect`,
//! `set`, `batch` or `flush_sync`) as [`ReactiveError::Effect`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{BoxError, ReactiveError, Result};
use crate::graph::{NodeId, Payload};

use super::runtime::{Reactive, Runtime, RuntimeState};

/// A callback run before an effect re-runs, or when its owner is disposed.
pub struct Cleanup(Box<dyn FnOnce() -> std::result::Result<(), BoxError>>);

impl Cleanup {
    /// Wrap an infallible cleanup.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wrap a cleanup whose failure should be reported.
    pub fn try_new<E>(f: impl FnOnce() -> std::result::Result<(), E> + 'static) -> Self
    where
        E: Into<BoxError>,
    {
        Self(Box::new(move || f().map_err(Into::into)))
    }

    pub(crate) fn run(self) -> std::result::Result<(), BoxError> {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect body may return.
pub trait EffectOutput {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, BoxError>;
}

impl EffectOutput for () {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        Ok(self)
    }
}

impl<E: Into<BoxError>> EffectOutput for std::result::Result<(), E> {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        self.map(|()| None).map_err(Into::into)
    }
}

impl<E: Into<BoxError>> EffectOutput for std::result::Result<Cleanup, E> {
    fn into_outcome(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        self.map(Some).map_err(Into::into)
    }
}

type EffectBody = Box<dyn FnMut() -> std::result::Result<Option<Cleanup>, BoxError>>;

struct EffectState {
    /// The effect function.
    body: RefCell<EffectBody>,

    /// Number of times the body has run.
    runs: Cell<usize>,
}

impl Reactive for EffectState {
    fn run(&self, rt: &RuntimeState, id: NodeId) -> Result<bool> {
        let outcome = rt.run_tracked(id, || {
            let mut body = self.body.borrow_mut();
            (*body)()
        });
        self.runs.set(self.runs.get() + 1);

        match outcome {
            Ok(Some(cleanup)) => rt.push_cleanup(id, cleanup)?,
            Ok(None) => {}
            Err(source) => return Err(ReactiveError::Effect { node: id, source }),
        }
        Ok(true)
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Dropping the handle does not stop the effect; it lives until its owner
/// is disposed or [`dispose`](Effect::dispose) is called.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// let reader = count.clone();
/// let effect = rt.create_effect(move || {
///     println!("Count is: {}", reader.get());
/// })?;
///
/// count.set(5)?;  // Prints: "Count is: 5"
/// ```
pub struct Effect {
    id: NodeId,
    rt: Weak<RuntimeState>,
    state: Rc<EffectState>,
}

impl Effect {
    pub(crate) fn new_in<F, O>(rt: &Runtime, mut f: F) -> Result<Self>
    where
        F: FnMut() -> O + 'static,
        O: EffectOutput,
    {
        let body: EffectBody = Box::new(move || f().into_outcome());
        let state = Rc::new(EffectState {
            body: RefCell::new(body),
            runs: Cell::new(0),
        });
        let reactive: Rc<dyn Reactive> = state.clone();
        let id = rt.state().register(Payload::Effect(reactive));

        // Run immediately to establish dependencies
        if let Err(err) = rt.state().run_initial(id) {
            // The caller never receives a handle, so nothing could dispose it
            // later. The run error is the one reported.
            let _ = rt.state().dispose_node(id);
            return Err(err);
        }
        rt.state().flush_if_idle()?;

        Ok(Self {
            id,
            rt: rt.downgrade(),
            state,
        })
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Stop the effect: run its cleanups, dispose what it owns, and remove
    /// it from every value it was reading.
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&self) -> Result<()> {
        match self.rt.upgrade() {
            Some(rt) => rt.dispose_node(self.id),
            None => Ok(()),
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.rt.upgrade().map_or(true, |rt| !rt.is_live(self.id))
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.state.runs.get()
    }

    /// Get the number of values the effect read during its last run.
    pub fn dependency_count(&self) -> usize {
        self.rt
            .upgrade()
            .map(|rt| rt.source_count(self.id))
            .unwrap_or(0)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            rt: Weak::clone(&self.rt),
            state: Rc::clone(&self.state),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
