//! Keyed Collection Signal
//!
//! A list of items where each item is identified by a key. Every item gets
//! its own signal, and the sequence of keys has one more (the structural
//! signal). Readers subscribe at the granularity they need:
//!
//! - `get(key)` reruns only when that item changes
//! - `ids()` / `len()` rerun only when keys are added, removed or reordered
//!
//! Replacing the whole list with [`KeyedSignal::set`] diffs it against the
//! current one inside a single batch, so readers of several items rerun once.
//!
//! Duplicate keys collapse: the last item with a given key wins, at the
//! position where that key first appeared.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::{ReactiveError, Result};

use super::runtime::{Runtime, RuntimeState};
use super::signal::Signal;

struct KeyedInner<K: 'static, V: 'static> {
    rt: Weak<RuntimeState>,
    key_fn: Box<dyn Fn(&V) -> K>,
    /// The key sequence, in item order.
    ids: Signal<Vec<K>>,
    items: RefCell<IndexMap<K, Signal<V>>>,
}

/// A collection of items with per-key signals.
pub struct KeyedSignal<K: 'static, V: 'static> {
    inner: Rc<KeyedInner<K, V>>,
}

impl<K, V> KeyedSignal<K, V>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + PartialEq + 'static,
{
    pub(crate) fn new_in<F>(rt: &Runtime, items: Vec<V>, key_fn: F) -> Self
    where
        F: Fn(&V) -> K + 'static,
    {
        let by_key = collect_by_key(items, &key_fn);
        let ids: Signal<Vec<K>> = Signal::new_in(rt, by_key.keys().cloned().collect());
        let items: IndexMap<K, Signal<V>> = by_key
            .into_iter()
            .map(|(key, value)| (key, Signal::new_in(rt, value)))
            .collect();

        Self {
            inner: Rc::new(KeyedInner {
                rt: rt.downgrade(),
                key_fn: Box::new(key_fn),
                ids,
                items: RefCell::new(items),
            }),
        }
    }

    /// Get the item for `key`, tracking only that item.
    ///
    /// If the key is absent, the structural signal is tracked instead so
    /// the reader reruns once the key appears.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.item(key) {
            Some(signal) => Some(signal.get()),
            None => {
                self.inner.ids.with(|_| ());
                None
            }
        }
    }

    /// The current keys in order. Tracks only the structure.
    pub fn ids(&self) -> Vec<K> {
        self.inner.ids.get()
    }

    /// Every item in key order, without tracking anything.
    pub fn get_all(&self) -> Vec<V> {
        self.inner
            .items
            .borrow()
            .values()
            .map(Signal::peek)
            .collect()
    }

    /// Number of items. Tracks only the structure.
    pub fn len(&self) -> usize {
        self.inner.ids.with(Vec::len)
    }

    /// Whether the collection has no items. Tracks only the structure.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an item with `key` exists. Tracks only the structure.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.ids.with(|ids| ids.contains(key))
    }

    /// Replace the item stored under `key`. Only readers of that item are
    /// notified. Returns `false` (and changes nothing) if the key is absent.
    pub fn update(&self, key: &K, value: V) -> Result<bool> {
        match self.item(key) {
            Some(signal) => {
                signal.set(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the whole collection.
    ///
    /// Items under existing keys are written to their signals (unchanged
    /// items notify nobody), new keys get fresh signals, removed keys are
    /// dropped, and the structural signal changes only if the key sequence
    /// did. Everything happens in one batch.
    pub fn set(&self, items: Vec<V>) -> Result<()> {
        let rt = Runtime::from_weak(&self.inner.rt)
            .ok_or_else(|| ReactiveError::Disposed(self.inner.ids.id()))?;
        rt.batch(|| self.apply(&rt, items))?
    }

    fn apply(&self, rt: &Runtime, items: Vec<V>) -> Result<()> {
        let next = collect_by_key(items, &*self.inner.key_fn);
        let keys: Vec<K> = next.keys().cloned().collect();

        let mut writes = Vec::new();
        let removed = {
            let mut current = self.inner.items.borrow_mut();
            let mut rebuilt = IndexMap::with_capacity(next.len());
            for (key, value) in next {
                let signal = match current.swap_remove(&key) {
                    Some(signal) => {
                        writes.push((signal.clone(), value));
                        signal
                    }
                    None => Signal::new_in(rt, value),
                };
                rebuilt.insert(key, signal);
            }
            std::mem::replace(&mut *current, rebuilt)
        };
        // Readers of a removed key re-run and fall back to the structural
        // signal, so they pick up the key's fresh signal if it comes back.
        for signal in removed.values() {
            signal.notify_observers()?;
        }
        // Signals for removed keys leave the graph here, outside the borrow.
        drop(removed);

        for (signal, value) in writes {
            signal.set(value)?;
        }
        self.inner.ids.set(keys)?;
        Ok(())
    }

    fn item(&self, key: &K) -> Option<Signal<V>> {
        self.inner.items.borrow().get(key).cloned()
    }
}

fn collect_by_key<K, V>(items: Vec<V>, key_fn: &dyn Fn(&V) -> K) -> IndexMap<K, V>
where
    K: Eq + Hash,
{
    let mut by_key = IndexMap::with_capacity(items.len());
    for item in items {
        by_key.insert(key_fn(&item), item);
    }
    by_key
}

impl<K, V> Clone for KeyedSignal<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> Debug for KeyedSignal<K, V>
where
    K: Debug,
    V: Clone + PartialEq + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.inner
                    .items
                    .borrow()
                    .iter()
                    .map(|(k, s)| (k, s.peek())),
            )
            .finish()
    }
}
