//! Ownership Scopes
//!
//! A scope is a disposal boundary. Every computed and effect created while a
//! scope is the active owner becomes its child, and disposing the scope
//! tears the whole subtree down: cleanups run, edges are severed, and the
//! nodes leave the graph.
//!
//! Scopes nest. A root created inside another root (or inside an effect) is
//! owned by it and disposed along with it.

use std::fmt;
use std::rc::Weak;

use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, Payload};

use super::runtime::{Runtime, RuntimeState};

/// Handle to an ownership scope created by
/// [`Runtime::create_root`](crate::Runtime::create_root).
///
/// Dropping the handle does not dispose the scope.
#[derive(Clone)]
pub struct RootHandle {
    id: NodeId,
    rt: Weak<RuntimeState>,
}

impl RootHandle {
    pub(crate) fn create_in<R>(rt: &Runtime, f: impl FnOnce(RootHandle) -> R) -> R {
        let id = rt.state().register(Payload::Scope);
        let handle = Self {
            id,
            rt: rt.downgrade(),
        };

        let _owner = rt.state().context.enter_owner(Some(id));
        f(handle)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose the scope and everything created inside it.
    ///
    /// Children are disposed before the scope's own cleanups run. Every
    /// cleanup runs even if one fails; the first failure is returned.
    /// Disposing twice is a no-op.
    pub fn dispose(&self) -> Result<()> {
        match self.rt.upgrade() {
            Some(rt) => rt.dispose_node(self.id),
            None => Ok(()),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.rt.upgrade().map_or(true, |rt| !rt.is_live(self.id))
    }

    /// Run `f` with this scope as the active owner again, so that whatever
    /// it creates is disposed with the scope.
    pub fn run_in<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let rt = self
            .rt
            .upgrade()
            .filter(|rt| rt.is_live(self.id))
            .ok_or(ReactiveError::Disposed(self.id))?;

        let _owner = rt.context.enter_owner(Some(self.id));
        Ok(f())
    }
}

impl fmt::Debug for RootHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootHandle")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
