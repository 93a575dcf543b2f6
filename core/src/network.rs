//! Connectivity annotator for the status notification.
//!
//! Purely cosmetic: on connectivity loss while the engine is active the
//! displayed status becomes a transient reconnecting message, and on recovery
//! it reverts to "Active" after a short debounce so a flapping link doesn't
//! thrash the notification. The engine owns its own reconnection logic; this
//! component never starts or stops anything.

use crate::adapters::{NotificationHost, STATUS_ACTIVE};
use crate::controller::{DaemonController, LifecycleState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STATUS_WAITING: &str = "Waiting for network...";
pub const RECOVERY_DEBOUNCE: Duration = Duration::from_millis(1500);

pub struct NetworkObserver {
    controller: Arc<DaemonController>,
    notifications: Arc<dyn NotificationHost>,
    debounce: Duration,
    /// Bumped on every loss; a pending recovery only applies if the link
    /// stayed up for the whole debounce window.
    flap_generation: Arc<AtomicU64>,
}

impl NetworkObserver {
    pub fn new(
        controller: Arc<DaemonController>,
        notifications: Arc<dyn NotificationHost>,
    ) -> Arc<Self> {
        Self::with_debounce(controller, notifications, RECOVERY_DEBOUNCE)
    }

    pub fn with_debounce(
        controller: Arc<DaemonController>,
        notifications: Arc<dyn NotificationHost>,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            controller,
            notifications,
            debounce,
            flap_generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Host connectivity went away.
    pub fn on_connectivity_lost(&self) {
        self.flap_generation.fetch_add(1, Ordering::SeqCst);
        if self.controller.lifecycle() != LifecycleState::Active {
            return;
        }
        tracing::debug!("network lost while active");
        if let Err(e) = self.notifications.post_status(STATUS_WAITING) {
            tracing::warn!("failed to post reconnecting status: {}", e);
        }
    }

    /// Host connectivity came back.
    pub fn on_connectivity_restored(&self) {
        let generation = self.flap_generation.load(Ordering::SeqCst);
        let flap_generation = Arc::clone(&self.flap_generation);
        let controller = Arc::clone(&self.controller);
        let notifications = Arc::clone(&self.notifications);
        let debounce = self.debounce;
        let spawned = std::thread::Builder::new()
            .name("ts-net-debounce".to_string())
            .spawn(move || {
                std::thread::sleep(debounce);
                if flap_generation.load(Ordering::SeqCst) != generation {
                    // flapped again inside the window
                    return;
                }
                if controller.lifecycle() != LifecycleState::Active {
                    return;
                }
                tracing::debug!("network recovered");
                if let Err(e) = notifications.post_status(STATUS_ACTIVE) {
                    tracing::warn!("failed to restore active status: {}", e);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("failed to spawn debounce thread: {}", e);
        }
    }
}
