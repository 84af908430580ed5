//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! Every reactive primitive (signal, computed, effect) and every ownership
//! scope is represented by one [`Node`] in the graph arena. The node carries
//! the bookkeeping the scheduler needs; typed values live in the handles that
//! user code holds.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use serde::Serialize;
use slotmap::Key;

use crate::reactive::{Cleanup, Reactive};

slotmap::new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    ///
    /// Identifiers are generational: once a node is disposed its id never
    /// resolves again, even if the arena slot is reused.
    pub struct NodeId;
}

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.data().as_ffi()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no sources, only observers.
    Signal,

    /// A derived node (computed). These have sources and may have observers.
    /// They cache their computed value.
    Computed,

    /// An effect node. These are leaves of the graph.
    Effect,

    /// An ownership scope. Scopes take no part in propagation; they only
    /// own other nodes.
    Scope,
}

/// Dirty state of a node.
///
/// The ordering matters: marking only ever raises a node's state, so a node
/// that is already `Dirty` is never downgraded to `Check` by a later mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. One of its upstream computeds was
    /// invalidated, but we have not yet verified that its value changed.
    Check,

    /// The node definitely needs to recompute. A direct source changed.
    Dirty,
}

/// Behaviour attached to a node.
pub(crate) enum Payload {
    Signal,
    Computed(Rc<dyn Reactive>),
    Effect(Rc<dyn Reactive>),
    Scope,
}

impl Payload {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Payload::Signal => NodeKind::Signal,
            Payload::Computed(_) => NodeKind::Computed,
            Payload::Effect(_) => NodeKind::Effect,
            Payload::Scope => NodeKind::Scope,
        }
    }

    pub(crate) fn reactive(&self) -> Option<Rc<dyn Reactive>> {
        match self {
            Payload::Computed(r) | Payload::Effect(r) => Some(Rc::clone(r)),
            Payload::Signal | Payload::Scope => None,
        }
    }
}

/// A node in the dependency graph.
pub(crate) struct Node {
    payload: Payload,

    /// Current dirty state.
    pub(crate) state: DirtyState,

    /// Nodes this node read during its last run, in first-read order.
    pub(crate) sources: Vec<NodeId>,

    /// Nodes that read this node during their last run.
    pub(crate) observers: IndexSet<NodeId>,

    /// The scope, effect or computed that created this node.
    pub(crate) owner: Option<NodeId>,

    /// Computations and scopes created while this node was the owner.
    pub(crate) owned: Vec<NodeId>,

    /// Distance from the ownership root. Used to run parents before children.
    pub(crate) depth: u32,

    /// Cleanups registered through `on_cleanup` or returned by an effect.
    pub(crate) cleanups: Vec<Cleanup>,

    /// Set once disposal has started. A disposing node is never run again.
    pub(crate) disposed: bool,
}

impl Node {
    /// Create a new node with the given payload.
    pub(crate) fn new(payload: Payload, owner: Option<NodeId>, depth: u32) -> Self {
        let state = match payload {
            // Start dirty to ensure first computation
            Payload::Computed(_) | Payload::Effect(_) => DirtyState::Dirty,
            Payload::Signal | Payload::Scope => DirtyState::Clean,
        };

        Self {
            payload,
            state,
            sources: Vec::new(),
            observers: IndexSet::new(),
            owner,
            owned: Vec::new(),
            depth,
            cleanups: Vec::new(),
            disposed: false,
        }
    }

    /// Get the node's kind.
    pub(crate) fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub(crate) fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Check if the node needs any processing.
    pub(crate) fn is_clean(&self) -> bool {
        self.state == DirtyState::Clean
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("state", &self.state)
            .field("sources", &self.sources)
            .field("observers", &self.observers)
            .field("owner", &self.owner)
            .field("owned", &self.owned)
            .field("disposed", &self.disposed)
            .finish()
    }
}
