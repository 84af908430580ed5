//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! effects and scopes. It owns the dependency graph and schedules updates
//! when signals change.
//!
//! # How It Works
//!
//! 1. When a signal, computed, effect or scope is created, it registers a
//!    node with the runtime. Computations are owned by whatever node is the
//!    current owner.
//!
//! 2. When a computed or effect reads a signal, the runtime records the
//!    dependency in the current context frame. When the run finishes the
//!    collected sources replace the node's previous ones.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct observers `Dirty` and everything further downstream
//!       `Check`
//!    b. Queues the effects that were reached
//!    c. Flushes, unless a batch is open or the runtime is in deferred mode
//!    d. Computeds are lazy: they recompute on next access
//!
//! # Thread Safety
//!
//! None. A runtime and all of its handles are confined to the thread that
//! created them (`Rc` makes them `!Send`). Interior mutability is `RefCell`
//! based, and no user closure is ever called while the graph is borrowed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, debug_span, trace, warn};

use crate::config::{FlushMode, RuntimeConfig};
use crate::error::{ReactiveError, Result};
use crate::graph::{DirtyState, GraphSnapshot, NodeId, NodeKind, Payload, UpdateScheduler};

use super::computed::Computed;
use super::context::ReactiveContext;
use super::effect::{Cleanup, Effect, EffectOutput};
use super::keyed::KeyedSignal;
use super::scope::RootHandle;
use super::signal::{ReadSignal, Signal, WriteSignal};

/// A computation the scheduler can re-run without knowing its value type.
pub(crate) trait Reactive {
    /// Re-run the computation with `id` as the active observer.
    ///
    /// Returns whether the computation produced a new value. Effects always
    /// report a change.
    fn run(&self, rt: &RuntimeState, id: NodeId) -> Result<bool>;
}

/// Shared state behind a [`Runtime`].
pub(crate) struct RuntimeState {
    graph: RefCell<UpdateScheduler>,
    pub(crate) context: ReactiveContext,
    config: RuntimeConfig,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
    /// Signals dropped while the graph was borrowed; removed on next mutation.
    orphans: RefCell<Vec<NodeId>>,
}

impl RuntimeState {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            graph: RefCell::new(UpdateScheduler::new()),
            context: ReactiveContext::new(),
            config,
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            orphans: RefCell::new(Vec::new()),
        }
    }

    /// Register a new node, owned by the current owner.
    pub(crate) fn register(&self, payload: Payload) -> NodeId {
        self.sweep_orphans();

        let kind = payload.kind();
        let owner = match kind {
            // Signals belong to their handles, not to the ownership tree.
            NodeKind::Signal => None,
            _ => self.context.current_owner(),
        };
        let id = self.graph.borrow_mut().add_node(payload, owner);

        if owner.is_none() && matches!(kind, NodeKind::Computed | NodeKind::Effect) {
            warn!(
                node = ?id,
                ?kind,
                "computation created outside of a root; it will never be disposed"
            );
        }
        trace!(node = ?id, ?kind, ?owner, "node registered");
        id
    }

    /// Record a read of `id` by the current observer and link the edge.
    pub(crate) fn track_read(&self, id: NodeId) {
        if let Some(observer) = self.context.track(id) {
            self.graph.borrow_mut().link(observer, id);
        }
    }

    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.graph.borrow().is_live(id)
    }

    /// Run `f` with `id` as the active observer and owner, then make the
    /// sources it read the node's new source set.
    pub(crate) fn run_tracked<R>(&self, id: NodeId, f: impl FnOnce() -> R) -> R {
        let guard = self.context.enter_tracking(id);
        let value = f();
        let sources = guard.finish();

        let mut graph = self.graph.borrow_mut();
        if graph.replace_sources(id, &sources) {
            trace!(node = ?id, sources = sources.len(), "sources reconciled");
        }
        value
    }

    /// Run `f` with no active observer.
    pub(crate) fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.context.enter_untracked();
        f()
    }

    /// A signal changed: mark its dependents and flush if appropriate.
    pub(crate) fn notify_write(&self, id: NodeId) -> Result<()> {
        let marked = self.graph.borrow_mut().mark_changed(id);
        trace!(node = ?id, marked, "signal changed");

        self.flush_if_idle()
    }

    /// Flush now if the runtime is in immediate mode and no batch is open.
    pub(crate) fn flush_if_idle(&self) -> Result<()> {
        if self.config.flush_mode == FlushMode::Immediate && self.batch_depth.get() == 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Bring `id` up to date: re-run it if it is `Dirty`, or if it is
    /// `Check` and one of its computed sources produced a new value.
    pub(crate) fn update_if_necessary(&self, id: NodeId) -> Result<()> {
        let (state, sources) = {
            let graph = self.graph.borrow();
            match graph.get_node(id) {
                Some(node) if !node.disposed => (node.state, node.sources.clone()),
                _ => return Ok(()),
            }
        };

        if state == DirtyState::Check {
            for source in sources {
                let is_computed = self.graph.borrow().kind_of(source) == Some(NodeKind::Computed);
                if is_computed {
                    self.update_if_necessary(source)?;
                }
                if self.graph.borrow().state_of(id) == Some(DirtyState::Dirty) {
                    break;
                }
            }
        }

        let state = self.graph.borrow().state_of(id);
        match state {
            Some(DirtyState::Dirty) => self.run_node(id),
            Some(DirtyState::Check) => {
                if let Some(node) = self.graph.borrow_mut().get_node_mut(id) {
                    node.state = DirtyState::Clean;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Re-run a computation: dispose what it owned, run its cleanups, then
    /// run its body under tracking.
    fn run_node(&self, id: NodeId) -> Result<()> {
        let (kind, reactive) = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_node_mut(id) else {
                return Ok(());
            };
            if node.disposed {
                return Ok(());
            }
            // Cleared before running: a write during the run re-queues it.
            node.state = DirtyState::Clean;
            (node.kind(), node.payload().reactive())
        };
        let Some(reactive) = reactive else {
            return Ok(());
        };

        self.reset_owned(id)?;
        let changed = reactive.run(self, id)?;
        if changed && kind == NodeKind::Computed {
            self.graph.borrow_mut().mark_observers_dirty(id);
        }
        Ok(())
    }

    /// Run an effect for the first time.
    ///
    /// Writes made during the run only enqueue, as if inside a batch, so no
    /// flush can re-enter the effect before its body returns. The caller
    /// flushes afterwards with [`flush_if_idle`](RuntimeState::flush_if_idle).
    pub(crate) fn run_initial(&self, id: NodeId) -> Result<()> {
        let _hold = DepthGuard::enter(&self.batch_depth);
        self.run_node(id)
    }

    /// Dispose everything `id` owns and run its registered cleanups.
    fn reset_owned(&self, id: NodeId) -> Result<()> {
        let (owned, cleanups) = {
            let mut graph = self.graph.borrow_mut();
            match graph.get_node_mut(id) {
                Some(node) => (
                    std::mem::take(&mut node.owned),
                    std::mem::take(&mut node.cleanups),
                ),
                None => return Ok(()),
            }
        };

        let mut first_error = None;
        for child in owned {
            if let Err(err) = self.dispose_node(child) {
                first_error.get_or_insert(err);
            }
        }
        for cleanup in cleanups {
            if let Err(err) = self.run_cleanup(id, cleanup) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn run_cleanup(&self, id: NodeId, cleanup: Cleanup) -> Result<()> {
        let _guard = self.context.enter_owner(None);
        cleanup
            .run()
            .map_err(|source| ReactiveError::Cleanup { node: id, source })
    }

    /// Dispose `id` and every node it owns, depth-first.
    ///
    /// Edges are cut before any cleanup runs, so nothing a cleanup does can
    /// schedule a node that is being torn down. Every cleanup runs even if
    /// an earlier one fails; the first failure is returned.
    pub(crate) fn dispose_node(&self, id: NodeId) -> Result<()> {
        let (subtree, cleanups) = {
            let mut graph = self.graph.borrow_mut();
            if graph.get_node(id).is_none() {
                return Ok(());
            }
            let subtree = graph.subtree(id);
            let mut cleanups = Vec::new();
            for node_id in &subtree {
                graph.sever(*node_id);
                if let Some(node) = graph.get_node_mut(*node_id) {
                    cleanups.push((*node_id, std::mem::take(&mut node.cleanups)));
                }
            }
            (subtree, cleanups)
        };
        trace!(node = ?id, nodes = subtree.len(), "disposing");

        let mut first_error = None;
        for (node_id, node_cleanups) in cleanups {
            for cleanup in node_cleanups {
                if let Err(err) = self.run_cleanup(node_id, cleanup) {
                    first_error.get_or_insert(err);
                }
            }
        }

        let removed: Vec<_> = {
            let mut graph = self.graph.borrow_mut();
            subtree
                .iter()
                .filter_map(|node_id| graph.remove_node(*node_id))
                .collect()
        };
        // Dropping nodes drops user closures, which may drop signal handles
        // that need the graph; the borrow above is released by now.
        drop(removed);

        first_error.map_or(Ok(()), Err)
    }

    /// Attach a cleanup to `id`, or run it right away if `id` is gone.
    pub(crate) fn push_cleanup(&self, id: NodeId, cleanup: Cleanup) -> Result<()> {
        let leftover = {
            let mut graph = self.graph.borrow_mut();
            match graph.get_node_mut(id) {
                Some(node) if !node.disposed => {
                    node.cleanups.push(cleanup);
                    None
                }
                _ => Some(cleanup),
            }
        };
        match leftover {
            Some(cleanup) => self.run_cleanup(id, cleanup),
            None => Ok(()),
        }
    }

    /// Remove a signal node whose last handle was dropped.
    pub(crate) fn remove_signal(&self, id: NodeId) {
        let removed = match self.graph.try_borrow_mut() {
            Ok(mut graph) => graph.remove_node(id),
            Err(_) => {
                self.orphans.borrow_mut().push(id);
                None
            }
        };
        drop(removed);
    }

    fn sweep_orphans(&self) {
        let orphans = std::mem::take(&mut *self.orphans.borrow_mut());
        if orphans.is_empty() {
            return;
        }
        let removed: Vec<_> = {
            let mut graph = self.graph.borrow_mut();
            orphans
                .into_iter()
                .filter_map(|id| graph.remove_node(id))
                .collect()
        };
        drop(removed);
    }

    /// Run `f` as one batch: writes inside only enqueue, and the outermost
    /// batch flushes once on exit.
    pub(crate) fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let value = {
            let _batch = DepthGuard::enter(&self.batch_depth);
            f()
        };
        if self.batch_depth.get() == 0 {
            self.flush()?;
        }
        Ok(value)
    }

    /// Drain the pending queue until the graph settles.
    ///
    /// Re-entrant calls (from inside an effect) return immediately; the
    /// outer flush picks up whatever they would have processed.
    pub(crate) fn flush(&self) -> Result<()> {
        if self.flushing.get() {
            return Ok(());
        }
        let _flushing = FlagGuard::enter(&self.flushing);
        let _span = debug_span!("flush").entered();
        self.sweep_orphans();

        let mut passes = 0;
        let mut processed = 0;
        loop {
            let pass = self.graph.borrow_mut().take_pending();
            if pass.is_empty() {
                break;
            }

            passes += 1;
            if passes > self.config.max_flush_passes {
                let mut graph = self.graph.borrow_mut();
                graph.requeue(pass);
                graph.clear_pending();
                return Err(ReactiveError::FlushLimit {
                    passes: self.config.max_flush_passes,
                });
            }

            for (index, id) in pass.iter().enumerate() {
                if let Err(err) = self.update_if_necessary(*id) {
                    // Effects later in this pass have not run yet.
                    self.graph
                        .borrow_mut()
                        .requeue(pass[index + 1..].iter().copied());
                    return Err(err);
                }
                processed += 1;
            }
        }

        if passes > 0 {
            debug!(passes, processed, "flush settled");
        }
        Ok(())
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.graph.borrow().kind_of(id)
    }

    pub(crate) fn observer_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .get_node(id)
            .map(|n| n.observers.len())
            .unwrap_or(0)
    }

    pub(crate) fn source_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .get_node(id)
            .map(|n| n.sources.len())
            .unwrap_or(0)
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.borrow().len()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.graph.borrow().pending_len()
    }

    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(&self.graph.borrow())
    }
}

/// Increments a depth counter for as long as it lives.
struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Sets a flag for as long as it lives, even if the body panics.
struct FlagGuard<'a>(&'a Cell<bool>);

impl<'a> FlagGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A reactive runtime: one dependency graph plus the primitives built on it.
///
/// Cloning a `Runtime` is cheap and yields another handle to the same graph.
/// Handles created from a runtime hold only a weak reference to it; once
/// every `Runtime` clone is dropped, signals keep their values but stop
/// notifying, and computations are released.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let (count, set_count) = rt.create_signal(1);
/// let doubled = rt.create_computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// rt.create_effect(move || println!("doubled: {}", doubled.get()))?;
/// set_count.set(5)?; // prints "doubled: 10"
/// ```
#[derive(Clone)]
pub struct Runtime {
    state: Rc<RuntimeState>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            state: Rc::new(RuntimeState::new(config)),
        }
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        self.state.config()
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeState> {
        Rc::downgrade(&self.state)
    }

    /// Rebuild a runtime handle from a weak reference held by a primitive.
    pub(crate) fn from_weak(state: &Weak<RuntimeState>) -> Option<Self> {
        state.upgrade().map(|state| Self { state })
    }

    pub(crate) fn state(&self) -> &RuntimeState {
        &self.state
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a signal and return its read and write halves.
    pub fn create_signal<T>(&self, initial: T) -> (ReadSignal<T>, WriteSignal<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        self.signal(initial).split()
    }

    /// Create a signal as a single read/write handle.
    pub fn signal<T>(&self, initial: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        Signal::new_in(self, initial)
    }

    /// Create a lazily evaluated, cached derived value.
    pub fn create_computed<T, F>(&self, derive: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new_in(self, derive)
    }

    /// Create an effect. It runs once before this call returns, then again
    /// whenever one of the values it read changes.
    ///
    /// If the first run fails the effect is disposed and the run's error is
    /// returned; cleanup errors raised while tearing it down are dropped in
    /// favour of that error. If the first run succeeds, writes it made are
    /// flushed before returning (in immediate mode, outside a batch), and an
    /// error from that flush is returned while the effect stays registered
    /// with its owner.
    pub fn create_effect<F, O>(&self, body: F) -> Result<Effect>
    where
        F: FnMut() -> O + 'static,
        O: EffectOutput,
    {
        Effect::new_in(self, body)
    }

    /// Create an ownership scope, run `f` inside it and return its result.
    pub fn create_root<R>(&self, f: impl FnOnce(RootHandle) -> R) -> R {
        RootHandle::create_in(self, f)
    }

    /// Create a keyed collection signal.
    pub fn create_keyed<K, V, F>(&self, items: Vec<V>, key_fn: F) -> KeyedSignal<K, V>
    where
        K: Clone + Eq + std::hash::Hash + 'static,
        V: Clone + PartialEq + 'static,
        F: Fn(&V) -> K + 'static,
    {
        KeyedSignal::new_in(self, items, key_fn)
    }

    /// Register a cleanup on the current owner.
    ///
    /// Inside an effect or computed it runs before the next run and on
    /// disposal; inside a root it runs when the root is disposed.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) -> Result<()> {
        let owner = self
            .state
            .context
            .current_owner()
            .ok_or(ReactiveError::NoOwner {
                operation: "on_cleanup",
            })?;
        self.state.push_cleanup(owner, Cleanup::new(cleanup))
    }

    // ------------------------------------------------------------------
    // Escape hatches and batching
    // ------------------------------------------------------------------

    /// Run `f` without tracking any reads.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.state.untrack(f)
    }

    /// Coalesce every write in `f` into a single trailing flush.
    ///
    /// Batches nest flatly: only the outermost batch flushes.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.state.batch(f)
    }

    /// Run every pending effect now, regardless of batch state.
    pub fn flush_sync(&self) -> Result<()> {
        self.state.flush()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether `id` names a live signal.
    pub fn is_signal(&self, id: NodeId) -> bool {
        self.state.kind_of(id) == Some(NodeKind::Signal)
    }

    /// Kind of the node, if it is still alive.
    pub fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        self.state.kind_of(id)
    }

    /// Number of computations currently reading `id`.
    pub fn observer_count(&self, id: NodeId) -> usize {
        self.state.observer_count(id)
    }

    /// Number of nodes `id` read during its last run.
    pub fn source_count(&self, id: NodeId) -> usize {
        self.state.source_count(id)
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.state.node_count()
    }

    /// Number of effects waiting for a flush.
    pub fn pending_count(&self) -> usize {
        self.state.pending_count()
    }

    /// Whether a batch is currently open.
    pub fn is_batching(&self) -> bool {
        self.state.is_batching()
    }

    /// Whether a computed or effect is currently recording reads.
    pub fn is_tracking(&self) -> bool {
        self.state.context.is_tracking()
    }

    /// Capture a serializable view of the graph for debug tooling.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.state.snapshot()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("pending", &self.pending_count())
            .field("batching", &self.is_batching())
            .field("config", self.config())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
