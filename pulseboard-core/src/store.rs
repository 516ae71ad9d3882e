/**
 * OBSERVABLE STORE - Process-wide dashboard state with subscribe/notify
 *
 * ROLE: One writer (the update loop), many readers (HTTP handlers, loggers).
 * Every write swaps in a new `Arc<T>`; readers only ever see whole states
 * and must treat them as immutable.
 *
 * NOTIFY: listeners run synchronously on the writer, after the new value is
 * visible, outside of any lock so they may read the store themselves.
 */

use crate::model::{FleetSummary, HistoryEntry};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

struct Inner<T> {
    value: RwLock<Arc<T>>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
}

/// Shared, observable value
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Send + Sync + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(Arc::new(value)),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Current value
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&*self.inner.value.read())
    }

    /// Replace the value and notify
    pub fn set(&self, value: T) {
        let next = Arc::new(value);
        *self.inner.value.write() = Arc::clone(&next);
        self.notify(&next);
    }

    /// Derive the next value from the current one and notify.
    ///
    /// `f` runs under the write lock and must not touch this store.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = self.update_quiet(f);
        self.notify(&next);
    }

    /// Like `update`, but leaves notification to the caller.
    ///
    /// Lets a writer release its own locks before listeners run; pass the
    /// returned value to `notify`.
    pub fn update_quiet<F>(&self, f: F) -> Arc<T>
    where
        F: FnOnce(&T) -> T,
    {
        let mut guard = self.inner.value.write();
        let next = Arc::new(f(&**guard));
        *guard = Arc::clone(&next);
        next
    }

    /// Register a listener; it stays registered while the handle lives
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Run every listener with `value`
    pub fn notify(&self, value: &Arc<T>) {
        let listeners: Vec<Listener<T>> = self.inner.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(value);
        }
    }
}

/// Handle returned by `Observable::subscribe`; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Connectivity of the live update loop, for neutral-state display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Connecting,
    Live,
    Reconnecting,
    Polling,
}

/// Everything the UI reads about the fleet
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub summary: Option<Arc<FleetSummary>>,
    pub history: Vec<HistoryEntry>,
    pub loading: bool,
    pub error: Option<String>,
    pub server_version: String,
    pub link: LinkState,
    pub reconnects: u32,
}

impl DashboardState {
    pub fn initial() -> Self {
        Self { loading: true, ..Default::default() }
    }
}

pub type DashboardStore = Observable<DashboardState>;

pub fn new_dashboard_store() -> DashboardStore {
    Observable::new(DashboardState::initial())
}
