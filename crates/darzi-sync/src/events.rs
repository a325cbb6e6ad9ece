//! # Event Listeners
//!
//! Callback registry used for connectivity changes and drain completions.
//!
//! ## Subscription Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Listener Registry                                  │
//! │                                                                         │
//! │  subscribe(cb) ──► Subscription (keep it alive to stay subscribed)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  emit(event) ──► every live callback runs synchronously, in            │
//! │                  subscription order                                     │
//! │                                                                         │
//! │  drop(Subscription) ──► callback removed, no further deliveries        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callbacks must be fast and non-blocking; slow work belongs in a task the
//! callback spawns.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

// =============================================================================
// Listener Registry
// =============================================================================

/// A set of callbacks invoked on each emitted event.
///
/// Cloning shares the underlying registry.
pub struct ListenerRegistry<E> {
    listeners: Arc<Mutex<BTreeMap<u64, Callback<E>>>>,
    next_id: Arc<AtomicU64>,
}

impl<E> Clone for ListenerRegistry<E> {
    fn clone(&self) -> Self {
        ListenerRegistry {
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ListenerRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        ListenerRegistry {
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a callback. The callback stays registered until the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> Subscription<E> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(callback));

        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Delivers an event to every live callback.
    ///
    /// The registry lock is released before any callback runs, so a
    /// callback may subscribe or drop subscriptions on this registry.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// True if no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle keeping a callback registered; dropping it unsubscribes.
pub struct Subscription<E> {
    id: u64,
    listeners: Arc<Mutex<BTreeMap<u64, Callback<E>>>>,
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count2 = Arc::clone(&count);
        let sub = registry.subscribe(move |n| {
            count2.fetch_add(*n as usize, Ordering::SeqCst);
        });

        registry.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(sub);
        registry.emit(&5);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_callback_may_use_the_registry_it_fires_from() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let added: Arc<Mutex<Vec<Subscription<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let registry2 = registry.clone();
        let added2 = Arc::clone(&added);
        let _sub = registry.subscribe(move |_| {
            let extra = registry2.subscribe(|_| {});
            added2.lock().unwrap().push(extra);
        });

        registry.emit(&());
        assert_eq!(registry.len(), 2);

        added.lock().unwrap().clear();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_multiple_listeners_all_fire() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let subs: Vec<_> = (0..3)
            .map(|_| {
                let count = Arc::clone(&count);
                registry.subscribe(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        registry.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        drop(subs);
    }
}
