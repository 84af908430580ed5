//! Graph Snapshots
//!
//! A point-in-time, serializable view of the dependency graph for debug
//! tooling. Snapshots are never consulted by the engine itself.

use serde::Serialize;

use super::node::{DirtyState, NodeKind};
use super::scheduler::UpdateScheduler;

/// One node as seen by a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: u64,
    pub kind: NodeKind,
    pub state: DirtyState,
    pub owner: Option<u64>,
    pub sources: Vec<u64>,
    pub observers: Vec<u64>,
    pub owned: usize,
}

/// Serializable view of every node in a runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub pending: usize,
}

impl GraphSnapshot {
    pub(crate) fn capture(scheduler: &UpdateScheduler) -> Self {
        let mut nodes: Vec<NodeSnapshot> = scheduler
            .nodes()
            .map(|(id, node)| NodeSnapshot {
                id: id.raw(),
                kind: node.kind(),
                state: node.state,
                owner: node.owner.map(|o| o.raw()),
                sources: node.sources.iter().map(|s| s.raw()).collect(),
                observers: node.observers.iter().map(|o| o.raw()).collect(),
                owned: node.owned.len(),
            })
            .collect();
        nodes.sort_by_key(|n| n.id);

        Self {
            nodes,
            pending: scheduler.pending_len(),
        }
    }

    /// Number of nodes of the given kind.
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    /// Render the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Payload;

    #[test]
    fn snapshot_lists_nodes_and_edges() {
        let mut scheduler = UpdateScheduler::new();
        let signal = scheduler.add_node(Payload::Signal, None);
        let scope = scheduler.add_node(Payload::Scope, None);
        scheduler.replace_sources(scope, &[signal]);

        let snapshot = GraphSnapshot::capture(&scheduler);
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.count(NodeKind::Signal), 1);

        let signal_view = snapshot
            .nodes
            .iter()
            .find(|n| n.id == signal.raw())
            .unwrap();
        assert_eq!(signal_view.observers, vec![scope.raw()]);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.add_node(Payload::Signal, None);

        let json = GraphSnapshot::capture(&scheduler).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["nodes"][0]["kind"], "signal");
        assert_eq!(value["nodes"][0]["state"], "clean");
        assert_eq!(value["pending"], 0);
    }
}
