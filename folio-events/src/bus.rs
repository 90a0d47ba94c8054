//! Listener registry owned by a repository instance.

use crate::AssetEvent;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Failure reported by a listener. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Listener failed: {reason}")]
pub struct ListenerError {
    pub reason: String,
}

impl ListenerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Receives repository events synchronously on the mutating thread.
pub trait AssetListener: Send + Sync {
    fn on_event(&self, event: &AssetEvent) -> Result<(), ListenerError>;
}

impl<F> AssetListener for F
where
    F: Fn(&AssetEvent) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_event(&self, event: &AssetEvent) -> Result<(), ListenerError> {
        self(event)
    }
}

/// Returned by [`EventBus::register`]; pass it back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(Uuid);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Registry = Vec<(ListenerHandle, Arc<dyn AssetListener>)>;

/// In-process observer registry.
///
/// Cloning yields another handle to the same registry. Delivery is
/// synchronous and most-recently-registered first.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn AssetListener>) -> ListenerHandle {
        let handle = ListenerHandle(Uuid::now_v7());
        match self.listeners.write() {
            Ok(mut registry) => registry.push((handle, listener)),
            Err(poisoned) => poisoned.into_inner().push((handle, listener)),
        }
        handle
    }

    /// Returns `false` when the handle was unknown.
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let mut registry = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = registry.len();
        registry.retain(|(h, _)| *h != handle);
        registry.len() != before
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(registry) => registry.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Deliver `event` to every listener. Errors and panics are logged.
    pub fn fire(&self, event: &AssetEvent) {
        let snapshot: Vec<(ListenerHandle, Arc<dyn AssetListener>)> = match self.listeners.read() {
            Ok(registry) => registry.iter().rev().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().rev().cloned().collect(),
        };

        for (handle, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        listener = %handle,
                        change = %event.change,
                        entry = %event.entry,
                        error = %e,
                        "Asset listener returned an error"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        listener = %handle,
                        change = %event.change,
                        entry = %event.entry,
                        "Asset listener panicked"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
