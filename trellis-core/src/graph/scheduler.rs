//! Update Scheduler
//!
//! The scheduler owns the node arena and determines which nodes must be
//! updated, and in which order, after a signal changes.
//!
//! # Algorithm
//!
//! Propagation is split into two phases:
//!
//! 1. **Mark** (at write time). The direct observers of the changed signal
//!    become `Dirty`. Observers of an invalidated computed become `Check`,
//!    recursively. Effects that leave the `Clean` state are added to the
//!    pending queue.
//!
//! 2. **Resolve** (at read or flush time). Pending effects are taken in
//!    ownership order. A `Check` node asks its computed sources to bring
//!    themselves up to date first; only if one of them actually produced a
//!    new value does the node become `Dirty` and re-run.
//!
//! This push-pull split means a computed is recomputed at most once per
//! propagation cycle, no matter how many paths lead to it.

use std::collections::VecDeque;

use indexmap::IndexSet;
use slotmap::SlotMap;

use super::node::{DirtyState, Node, NodeId, NodeKind, Payload};

/// The update scheduler manages the dependency graph and coordinates updates.
pub(crate) struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: SlotMap<NodeId, Node>,

    /// Effects waiting for the next flush. Deduplicated, insertion ordered.
    pending: IndexSet<NodeId>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub(crate) fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            pending: IndexSet::new(),
        }
    }

    /// Add a node to the graph, registering it with its owner.
    pub(crate) fn add_node(&mut self, payload: Payload, owner: Option<NodeId>) -> NodeId {
        let owner = owner.filter(|id| self.nodes.contains_key(*id));
        let depth = owner
            .and_then(|id| self.nodes.get(id))
            .map(|o| o.depth + 1)
            .unwrap_or(0);

        let id = self.nodes.insert(Node::new(payload, owner, depth));
        if let Some(owner) = owner.and_then(|id| self.nodes.get_mut(id)) {
            owner.owned.push(id);
        }
        id
    }

    /// Get a reference to a node.
    pub(crate) fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Get a mutable reference to a node.
    pub(crate) fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    /// Whether the node exists and has not started disposal.
    pub(crate) fn is_live(&self, node_id: NodeId) -> bool {
        self.nodes.get(node_id).is_some_and(|n| !n.disposed)
    }

    pub(crate) fn kind_of(&self, node_id: NodeId) -> Option<NodeKind> {
        self.nodes.get(node_id).map(Node::kind)
    }

    pub(crate) fn state_of(&self, node_id: NodeId) -> Option<DirtyState> {
        self.nodes.get(node_id).map(|n| n.state)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Replace the source set of `observer` with `sources`, keeping the
    /// reverse edges consistent.
    ///
    /// Sources that were read last run but not this run lose their edge.
    /// Returns `false` if the observer no longer exists.
    pub(crate) fn replace_sources(&mut self, observer: NodeId, sources: &[NodeId]) -> bool {
        let Some(node) = self.nodes.get(observer) else {
            return false;
        };
        if node.disposed {
            return false;
        }

        let sources: Vec<NodeId> = sources
            .iter()
            .copied()
            .filter(|id| *id != observer && self.is_live(*id))
            .collect();

        let previous = match self.nodes.get_mut(observer) {
            Some(node) => std::mem::replace(&mut node.sources, sources.clone()),
            None => return false,
        };

        for stale in previous.iter().filter(|id| !sources.contains(id)) {
            if let Some(source) = self.nodes.get_mut(*stale) {
                source.observers.shift_remove(&observer);
            }
        }
        for fresh in sources.iter().filter(|id| !previous.contains(id)) {
            if let Some(source) = self.nodes.get_mut(*fresh) {
                source.observers.insert(observer);
            }
        }
        true
    }

    /// Record that `observer` read `source` during its current run.
    ///
    /// The edge is live immediately, so a write to `source` later in the same
    /// run re-queues the observer. [`replace_sources`] prunes it at the end
    /// of the run if it turns out to be stale.
    ///
    /// [`replace_sources`]: UpdateScheduler::replace_sources
    pub(crate) fn link(&mut self, observer: NodeId, source: NodeId) {
        if observer == source || !self.is_live(observer) || !self.is_live(source) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(observer) {
            if !node.sources.contains(&source) {
                node.sources.push(source);
            }
        }
        if let Some(node) = self.nodes.get_mut(source) {
            node.observers.insert(observer);
        }
    }

    /// Mark the observers of a changed signal and propagate dirty flags.
    ///
    /// Direct observers become `Dirty`, everything downstream of an
    /// invalidated computed becomes `Check`. Returns the number of nodes
    /// whose state changed.
    pub(crate) fn mark_changed(&mut self, source_id: NodeId) -> usize {
        let mut queue: VecDeque<(NodeId, DirtyState)> = match self.nodes.get(source_id) {
            Some(source) => source
                .observers
                .iter()
                .map(|id| (*id, DirtyState::Dirty))
                .collect(),
            None => return 0,
        };

        let mut marked = 0;
        while let Some((node_id, state)) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(node_id) else {
                continue;
            };
            if node.disposed || node.state >= state {
                continue;
            }

            let was_clean = node.is_clean();
            node.state = state;
            marked += 1;

            if !was_clean {
                // Already pending (effect) or already propagated (computed).
                continue;
            }
            match node.kind() {
                NodeKind::Effect => {
                    self.pending.insert(node_id);
                }
                NodeKind::Computed => {
                    queue.extend(node.observers.iter().map(|id| (*id, DirtyState::Check)));
                }
                NodeKind::Signal | NodeKind::Scope => {}
            }
        }
        marked
    }

    /// A computed produced a new value: its `Check` observers must re-run.
    ///
    /// Clean observers are either running right now or have already read
    /// the new value, so they are left alone.
    pub(crate) fn mark_observers_dirty(&mut self, node_id: NodeId) {
        let observers: Vec<NodeId> = match self.nodes.get(node_id) {
            Some(node) => node.observers.iter().copied().collect(),
            None => return,
        };
        for id in observers {
            if let Some(observer) = self.nodes.get_mut(id) {
                if observer.state == DirtyState::Check {
                    observer.state = DirtyState::Dirty;
                }
            }
        }
    }

    /// Take every pending effect, parents before children.
    pub(crate) fn take_pending(&mut self) -> Vec<NodeId> {
        let mut batch: Vec<NodeId> = std::mem::take(&mut self.pending).into_iter().collect();
        batch.sort_by_key(|id| self.nodes.get(*id).map(|n| n.depth).unwrap_or(0));
        batch
    }

    /// Put effects back in the queue after an aborted pass.
    pub(crate) fn requeue(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        for id in ids {
            if self.nodes.get(id).is_some_and(|n| !n.disposed && !n.is_clean()) {
                self.pending.insert(id);
            }
        }
    }

    /// Drop every pending effect, resetting it to `Clean`.
    pub(crate) fn clear_pending(&mut self) {
        for id in std::mem::take(&mut self.pending) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.state = DirtyState::Clean;
            }
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Collect `root` and all of its owned descendants, children first.
    pub(crate) fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                // Reverse so the first-created child is disposed first.
                stack.extend(node.owned.iter().rev().map(|child| (*child, false)));
            }
        }
        order
    }

    /// Cut every edge a node participates in and stop it from being
    /// scheduled. The node stays in the arena until [`remove_node`] so its
    /// cleanups can still be collected.
    ///
    /// [`remove_node`]: UpdateScheduler::remove_node
    pub(crate) fn sever(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        node.disposed = true;
        node.state = DirtyState::Clean;
        let sources = std::mem::take(&mut node.sources);
        let observers = std::mem::take(&mut node.observers);

        // Remove this node from its sources' observer lists
        for source_id in sources {
            if let Some(source) = self.nodes.get_mut(source_id) {
                source.observers.shift_remove(&node_id);
            }
        }

        // Remove this node from its observers' source lists
        for observer_id in observers {
            if let Some(observer) = self.nodes.get_mut(observer_id) {
                observer.sources.retain(|id| *id != node_id);
            }
        }

        self.pending.shift_remove(&node_id);
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node and detaches it from its
    /// owner. The removed node is returned so the caller can drop it (and any
    /// user closures it holds) after releasing its borrow of the scheduler.
    pub(crate) fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.sever(node_id);
        let node = self.nodes.remove(node_id)?;
        if let Some(owner) = node.owner.and_then(|id| self.nodes.get_mut(id)) {
            owner.owned.retain(|id| *id != node_id);
        }
        Some(node)
    }
}
