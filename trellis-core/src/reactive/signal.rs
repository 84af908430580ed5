//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as an observer.
//!
//! 2. When a signal's value changes, all observers are marked dirty and
//!    affected effects are scheduled.
//!
//! 3. Writing a value equal to the current one is a no-op: nothing is
//!    marked and nothing is scheduled.
//!
//! # Memory Layout
//!
//! The value lives in the handle (shared behind an `Rc`), not in the graph.
//! The graph only holds a bookkeeping node, which is removed when the last
//! handle is dropped.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use crate::error::{BoxError, ReactiveError, Result};
use crate::graph::{NodeId, Payload};

use super::runtime::{Runtime, RuntimeState};

struct SignalInner<T> {
    /// Unique identifier for this signal.
    id: NodeId,

    /// The runtime this signal notifies.
    rt: Weak<RuntimeState>,

    /// The current value.
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.remove_signal(self.id);
        }
    }
}

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. `PartialEq` gates writes:
///   setting an equal value does not notify anyone.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies observers)
/// count.set(5)?;
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    pub(crate) fn new_in(rt: &Runtime, value: T) -> Self {
        let id = rt.state().register(Payload::Signal);
        Self {
            inner: Rc::new(SignalInner {
                id,
                rt: rt.downgrade(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as an observer.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Alias for [`peek`](Signal::peek).
    pub fn get_untracked(&self) -> T {
        self.peek()
    }

    /// Borrow the current value, tracking the read.
    ///
    /// Writing to this signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify observers if it differs from the current one.
    ///
    /// Returns the new value. Outside a batch (in immediate mode) dependent
    /// effects run before this returns, and any error they produce is
    /// returned here.
    pub fn set(&self, value: T) -> Result<T> {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return Ok(value);
            }
            *current = value.clone();
        }

        if let Some(rt) = self.inner.rt.upgrade() {
            rt.notify_write(self.inner.id)?;
        }
        Ok(value)
    }

    /// Update the value using a function of the previous value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<T> {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Update the value with a fallible function. On error the signal is
    /// left unchanged and the error is returned as [`ReactiveError::Updater`].
    pub fn try_update<E>(&self, f: impl FnOnce(&T) -> std::result::Result<T, E>) -> Result<T>
    where
        E: Into<BoxError>,
    {
        let next = f(&self.inner.value.borrow()).map_err(|e| ReactiveError::Updater(e.into()))?;
        self.set(next)
    }

    /// Mark every current reader stale without changing the value.
    ///
    /// Used before a signal is retired so that readers re-run and stop
    /// depending on it.
    pub(crate) fn notify_observers(&self) -> Result<()> {
        match self.inner.rt.upgrade() {
            Some(rt) => rt.notify_write(self.inner.id),
            None => Ok(()),
        }
    }

    /// Get the number of computations currently reading this signal.
    pub fn observer_count(&self) -> usize {
        self.inner
            .rt
            .upgrade()
            .map(|rt| rt.observer_count(self.inner.id))
            .unwrap_or(0)
    }

    /// Split into read-only and write-only halves sharing this signal.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (
            ReadSignal {
                signal: self.clone(),
            },
            WriteSignal { signal: self },
        )
    }

    fn track(&self) {
        if let Some(rt) = self.inner.rt.upgrade() {
            rt.track_read(self.inner.id);
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// The read half of a signal created with
/// [`Runtime::create_signal`](crate::Runtime::create_signal).
pub struct ReadSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T> ReadSignal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.signal.id()
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T {
        self.signal.get()
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        self.signal.peek()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with_untracked(f)
    }

    /// Get the number of computations currently reading this signal.
    pub fn observer_count(&self) -> usize {
        self.signal.observer_count()
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Debug> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.signal).finish()
    }
}

/// The write half of a signal created with
/// [`Runtime::create_signal`](crate::Runtime::create_signal).
pub struct WriteSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T> WriteSignal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.signal.id()
    }

    /// See [`Signal::set`].
    pub fn set(&self, value: T) -> Result<T> {
        self.signal.set(value)
    }

    /// See [`Signal::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<T> {
        self.signal.update(f)
    }

    /// See [`Signal::try_update`].
    pub fn try_update<E>(&self, f: impl FnOnce(&T) -> std::result::Result<T, E>) -> Result<T>
    where
        E: Into<BoxError>,
    {
        self.signal.try_update(f)
    }
}

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Debug> Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteSignal").field(&self.signal).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let rt = Runtime::new();
        let signal = rt.signal(0);
        assert_eq!(signal.get(), 0);

        assert_eq!(signal.set(42).unwrap(), 42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = rt.signal(10);
        assert_eq!(signal.update(|v| v + 5).unwrap(), 15);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn failed_updater_leaves_value_unchanged() {
        let rt = Runtime::new();
        let signal = rt.signal(10);
        let err = signal
            .try_update(|_| Err::<i32, _>("not a number"))
            .unwrap_err();
        assert!(matches!(err, ReactiveError::Updater(_)));
        assert_eq!(signal.get(), 10);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let rt = Runtime::new();
        let signal = rt.signal(1);
        let runs = Rc::new(Cell::new(0));

        let reader = signal.clone();
        let runs_clone = runs.clone();
        let _effect = rt
            .create_effect(move || {
                reader.get();
                runs_clone.set(runs_clone.get() + 1);
            })
            .unwrap();
        assert_eq!(runs.get(), 1);

        signal.set(1).unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(rt.pending_count(), 0);

        signal.set(2).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let rt = Runtime::new();
        let signal1 = rt.signal(0);
        let signal2 = signal1.clone();

        signal1.set(42).unwrap();
        assert_eq!(signal2.get(), 42);

        signal2.set(100).unwrap();
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let rt = Runtime::new();
        let s1 = rt.signal(0);
        let s2 = rt.signal(0);
        let s3 = rt.signal(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn split_halves_share_one_node() {
        let rt = Runtime::new();
        let (read, write) = rt.create_signal(String::from("a"));
        assert_eq!(read.id(), write.id());
        assert!(rt.is_signal(read.id()));

        write.set("b".to_string()).unwrap();
        assert_eq!(read.get(), "b");
        assert_eq!(read.with(|s| s.len()), 1);
    }

    #[test]
    fn signal_outlives_runtime() {
        let rt = Runtime::new();
        let signal = rt.signal(1);
        drop(rt);

        assert_eq!(signal.set(2).unwrap(), 2);
        assert_eq!(signal.get(), 2);
        assert_eq!(signal.observer_count(), 0);
    }
}
