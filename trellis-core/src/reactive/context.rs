//! Reactive Context
//!
//! The reactive context tracks which computation is currently running and
//! which node owns newly created computations. This enables automatic
//! dependency tracking: when a signal is read, we can register the current
//! computation as an observer.
//!
//! # Implementation
//!
//! Each [`Runtime`](crate::Runtime) owns an explicit stack of frames. When a
//! computed or effect runs, a frame is pushed; when the run completes, it is
//! popped and the sources it collected become the node's new source set.
//! `untrack` and `create_root` push frames with no observer, so reads inside
//! them record nothing.
//!
//! The stack is confined to the runtime that owns it, so there is no ambient
//! global state that could leak between runtimes or survive a panic.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::graph::NodeId;

/// Sources collected while a frame is active. Most computations read only a
/// handful of nodes, so they stay inline.
pub(crate) type SourceList = SmallVec<[NodeId; 8]>;

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct Frame {
    /// The computation recording reads, if any.
    observer: Option<NodeId>,
    /// The node that owns computations created in this frame.
    owner: Option<NodeId>,
    /// Sources read in this frame, in first-read order.
    sources: SourceList,
}

/// The per-runtime context stack.
#[derive(Debug, Default)]
pub(crate) struct ReactiveContext {
    frames: RefCell<Vec<Frame>>,
}

impl ReactiveContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enter a tracking frame: `node` observes reads and owns creations.
    ///
    /// The context is automatically exited when the returned guard is dropped.
    pub(crate) fn enter_tracking(&self, node: NodeId) -> ContextGuard<'_> {
        self.push(Frame {
            observer: Some(node),
            owner: Some(node),
            sources: SourceList::new(),
        })
    }

    /// Enter a frame that owns creations but tracks no reads.
    pub(crate) fn enter_owner(&self, owner: Option<NodeId>) -> ContextGuard<'_> {
        self.push(Frame {
            observer: None,
            owner,
            sources: SourceList::new(),
        })
    }

    /// Enter an untracked frame, keeping the current owner.
    pub(crate) fn enter_untracked(&self) -> ContextGuard<'_> {
        self.enter_owner(self.current_owner())
    }

    fn push(&self, frame: Frame) -> ContextGuard<'_> {
        let mut frames = self.frames.borrow_mut();
        frames.push(frame);
        ContextGuard {
            context: self,
            depth: frames.len(),
            popped: false,
        }
    }

    /// Check if reads are currently being tracked.
    pub(crate) fn is_tracking(&self) -> bool {
        self.current_observer().is_some()
    }

    /// Get the current observer, if any.
    pub(crate) fn current_observer(&self) -> Option<NodeId> {
        self.frames.borrow().last().and_then(|f| f.observer)
    }

    /// Get the current owner, if any.
    pub(crate) fn current_owner(&self) -> Option<NodeId> {
        self.frames.borrow().last().and_then(|f| f.owner)
    }

    /// Record a read of `source` in the current frame.
    ///
    /// This is called by signals and computeds when they are read. Returns
    /// the observer if this is its first read of `source` in this frame.
    pub(crate) fn track(&self, source: NodeId) -> Option<NodeId> {
        let mut frames = self.frames.borrow_mut();
        let frame = frames.last_mut()?;
        let observer = frame.observer.filter(|o| *o != source)?;
        if frame.sources.contains(&source) {
            return None;
        }
        frame.sources.push(source);
        Some(observer)
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Guard that pops the frame when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub(crate) struct ContextGuard<'a> {
    context: &'a ReactiveContext,
    depth: usize,
    popped: bool,
}

impl ContextGuard<'_> {
    /// Pop the frame and return the sources it collected.
    pub(crate) fn finish(mut self) -> SourceList {
        self.popped = true;
        self.pop().map(|f| f.sources).unwrap_or_default()
    }

    fn pop(&self) -> Option<Frame> {
        let mut frames = self.context.frames.borrow_mut();
        // Verify we're popping the right frame.
        // This helps catch bugs where guards are dropped out of order.
        debug_assert!(
            std::thread::panicking() || frames.len() == self.depth,
            "reactive context mismatch: expected depth {}, got {}",
            self.depth,
            frames.len()
        );
        if frames.len() >= self.depth {
            frames.truncate(self.depth);
            frames.pop()
        } else {
            None
        }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if !self.popped {
            self.pop();
        }
    }
}
