//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent reactive values (signals), computations (computeds,
//!   effects) or ownership scopes
//! - Edges represent dependencies: if A read B during its last run, B lists A
//!   as an observer and A lists B as a source
//!
//! A second, independent tree is threaded through the same nodes: the
//! ownership tree. Every computation created while another node is running
//! (or while a scope is active) is owned by it and disposed with it.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a generational arena ([`slotmap`]). Edges are plain
//!    [`NodeId`] keys, so cycles between observers and sources need no
//!    reference counting, and a stale id of a disposed node can never alias a
//!    newer one.
//!
//! 2. We maintain both forward (sources) and reverse (observers) edges
//!    to enable efficient traversal in both directions.
//!
//! 3. User closures are never called while the graph is borrowed.

mod node;
mod scheduler;
mod snapshot;

pub use node::{DirtyState, NodeId, NodeKind};
pub(crate) use node::{Node, Payload};
pub(crate) use scheduler::UpdateScheduler;
pub use snapshot::{GraphSnapshot, NodeSnapshot};
