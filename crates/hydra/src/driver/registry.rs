//! Window registry
//!
//! Maps window identity to window state for one driver. Windows are inserted
//! when they are created and removed right after their native window is
//! destroyed, both on the driver thread, so the key set is exactly the set of
//! windows that have not finished their destroy sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::NativeId;
use crate::sync::lock;
use crate::window::{WindowId, WindowShared};

/// Registry of live windows, keyed by [`WindowId`]
pub struct Registry<E> {
    windows: Arc<Mutex<HashMap<WindowId, Arc<WindowShared<E>>>>>,
}

impl<E> Clone for Registry<E> {
    fn clone(&self) -> Self {
        Self {
            windows: Arc::clone(&self.windows),
        }
    }
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<E> Registry<E> {
    /// Whether a window is registered
    pub fn contains(&self, id: WindowId) -> bool {
        lock(&self.windows).contains_key(&id)
    }

    /// Number of registered windows
    pub fn len(&self) -> usize {
        lock(&self.windows).len()
    }

    /// Whether no window is registered
    pub fn is_empty(&self) -> bool {
        lock(&self.windows).is_empty()
    }

    /// Registered window ids in ascending order
    pub fn ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<_> = lock(&self.windows).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn insert(&self, window: Arc<WindowShared<E>>) {
        lock(&self.windows).insert(window.id(), window);
    }

    pub(crate) fn remove(&self, id: WindowId) -> Option<Arc<WindowShared<E>>> {
        lock(&self.windows).remove(&id)
    }

    pub(crate) fn clear(&self) {
        lock(&self.windows).clear();
    }

    /// Consistent copy of the current entries
    pub(crate) fn snapshot(&self) -> Vec<Arc<WindowShared<E>>> {
        lock(&self.windows).values().cloned().collect()
    }

    pub(crate) fn find_native(&self, native: NativeId) -> Option<Arc<WindowShared<E>>> {
        lock(&self.windows)
            .values()
            .find(|window| window.native() == native)
            .cloned()
    }

    /// Deliver a raw event to every registered window's handler
    ///
    /// Handlers run outside the registry lock, so they may query the
    /// registry. Removal only happens on the driver thread, which is also
    /// where broadcasts run, so a removed window never sees a later event.
    pub(crate) fn broadcast(&self, event: &E) {
        for window in self.snapshot() {
            window.dispatch(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::channel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn window(id: WindowId, native: NativeId) -> Arc<WindowShared<u32>> {
        let (synchro, _token) = channel();
        Arc::new(WindowShared::new(id, native, format!("window {id}"), synchro))
    }

    #[test]
    fn test_insert_find_remove() {
        let registry = Registry::default();
        registry.insert(window(10, 1));
        registry.insert(window(11, 2));

        assert_eq!(registry.ids(), vec![10, 11]);
        assert_eq!(registry.find_native(2).map(|w| w.id()), Some(11));
        assert!(registry.find_native(3).is_none());

        assert!(registry.remove(10).is_some());
        assert!(registry.remove(10).is_none());
        assert!(!registry.contains(10));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_reaches_only_registered_handlers() {
        let registry = Registry::default();
        let first = window(20, 1);
        let second = window(21, 2);
        let hits = Arc::new(AtomicUsize::new(0));

        for w in [&first, &second] {
            let hits = Arc::clone(&hits);
            w.set_handler(Some(Box::new(move |event: &u32| {
                hits.fetch_add(*event as usize, Ordering::SeqCst);
            })));
            registry.insert(Arc::clone(w));
        }

        registry.broadcast(&5);
        assert_eq!(hits.load(Ordering::SeqCst), 10);

        registry.remove(first.id());
        registry.broadcast(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_handlers_may_query_the_registry() {
        let registry = Registry::default();
        let w = window(30, 1);
        let seen = Arc::new(AtomicUsize::new(0));
        let (inner, count) = (registry.clone(), Arc::clone(&seen));
        w.set_handler(Some(Box::new(move |_: &u32| {
            count.store(inner.len(), Ordering::SeqCst);
        })));
        registry.insert(w);

        registry.broadcast(&0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
