//! Opaque handles for objects shared across an API boundary.
//!
//! Foreign callers hold a [`Handle`] instead of a pointer. Looking a handle
//! up yields an `Arc`, so an object removed from the registry stays alive
//! until the last caller using it lets go.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::connection::Connection;

/// Opaque, non-zero identifier issued by a [`HandleRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU64);

impl Handle {
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }

    /// Rebuild a handle from its raw value. Zero is never a valid handle.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concurrent map from handles to shared objects. Handles are never reused.
pub struct HandleRegistry<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<Handle, Arc<T>>>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Handle, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self) -> Handle {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        // The counter starts at one and would need 2^64 inserts to wrap.
        Handle(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MAX))
    }

    pub fn insert(&self, value: T) -> Handle {
        self.insert_arc(Arc::new(value))
    }

    pub fn insert_arc(&self, value: Arc<T>) -> Handle {
        let handle = self.issue();
        self.lock().insert(handle, value);
        handle
    }

    pub fn get(&self, handle: Handle) -> Option<Arc<T>> {
        self.lock().get(&handle).cloned()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.lock().contains_key(&handle)
    }

    pub fn remove(&self, handle: Handle) -> Option<Arc<T>> {
        self.lock().remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> fmt::Debug for HandleRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Process-wide registry of connections.
pub fn connection_registry() -> &'static HandleRegistry<Connection> {
    static REGISTRY: OnceLock<HandleRegistry<Connection>> = OnceLock::new();
    REGISTRY.get_or_init(HandleRegistry::new)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn insert_get_remove() {
        let registry = HandleRegistry::new();
        let handle = registry.insert("bench".to_string());

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(handle));
        assert_eq!(registry.get(handle).unwrap().as_str(), "bench");

        let removed = registry.remove(handle).unwrap();
        assert_eq!(removed.as_str(), "bench");
        assert!(registry.get(handle).is_none());
        assert!(registry.remove(handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn handles_are_not_reused() {
        let registry = HandleRegistry::new();
        let first = registry.insert(1);
        registry.remove(first);
        let second = registry.insert(2);

        assert_ne!(first, second);
        assert!(registry.get(first).is_none());
        assert_eq!(*registry.get(second).unwrap(), 2);
    }

    #[test]
    fn removed_object_outlives_its_entry() {
        let registry = HandleRegistry::new();
        let handle = registry.insert(vec![1, 2, 3]);
        let held = registry.get(handle).unwrap();

        registry.remove(handle);
        assert_eq!(held.len(), 3);
    }

    #[test]
    fn raw_round_trip_rejects_zero() {
        let registry = HandleRegistry::new();
        let handle = registry.insert(());

        assert_eq!(Handle::from_raw(handle.as_raw()), Some(handle));
        assert!(Handle::from_raw(0).is_none());
    }

    #[test]
    fn concurrent_inserts_get_distinct_handles() {
        let registry = Arc::new(HandleRegistry::new());
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..250)
                        .map(|i| registry.insert(worker * 1000 + i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let handles: HashSet<_> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        assert_eq!(handles.len(), 1000);
        assert_eq!(registry.len(), 1000);
    }

    #[test]
    fn global_registry_holds_connections() {
        let handle = connection_registry().insert(Connection::new());
        assert!(connection_registry().get(handle).is_some());
        assert!(connection_registry().remove(handle).is_some());
    }
}
