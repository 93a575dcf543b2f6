//! In-process lifecycle event bus.
//!
//! Replaces the original app's process-wide broadcast intents with a typed
//! observer list. Delivery is best-effort to the subscribers present at
//! publish time; there is no persistence or replay. A subscriber attaching
//! late must reconcile through `DaemonController::query_actual()` instead of
//! waiting for an event.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Lifecycle events published by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A start attempt was accepted and the engine launch is in flight.
    Starting,
    /// The engine launch succeeded.
    Started,
    /// The session ended: user stop, start failure, or engine death.
    Stopped,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Starting => write!(f, "Starting"),
            LifecycleEvent::Started => write!(f, "Started"),
            LifecycleEvent::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Callback interface for lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    fn on_lifecycle_event(&self, event: LifecycleEvent);
}

/// Fan-out channel from the controller to tile/notification adapters and any
/// subscribed UI.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn LifecycleObserver>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.write().push(observer);
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// The list is snapshotted before dispatch so an observer may subscribe
    /// re-entrantly from its callback without deadlocking; such an observer
    /// first hears the next event.
    pub fn publish(&self, event: LifecycleEvent) {
        let observers = self.observers.read().clone();
        tracing::debug!("publishing {} to {} observer(s)", event, observers.len());
        for observer in observers {
            observer.on_lifecycle_event(event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}
