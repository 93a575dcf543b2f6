//! Quick-tile and notification projections of controller state.
//!
//! Both adapters are pure subscribers: no state of their own, no caching
//! across restarts. On attach and on every lifecycle event they re-derive
//! what to show from the live controller, so a host widget that was recreated
//! by the OS converges as soon as it re-attaches.

use crate::controller::{DaemonController, LifecycleState};
use crate::events::{LifecycleEvent, LifecycleObserver};
use std::sync::Arc;

pub const TILE_LABEL: &str = "TailSocks";
pub const STATUS_STARTING: &str = "Starting daemon...";
pub const STATUS_ACTIVE: &str = "Active";

/// Host surface for the persistent status notification.
pub trait NotificationHost: Send + Sync {
    fn post_status(&self, status: &str) -> Result<(), String>;
    fn clear_status(&self);
}

/// Host surface for the OS quick-toggle tile.
pub trait TileHost: Send + Sync {
    fn render(&self, tile: &TileSnapshot) -> Result<(), String>;
}

/// What the quick-toggle should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSnapshot {
    /// The "intended" glyph: persisted desired state, not the live engine.
    pub engaged: bool,
    /// A start or stop is in flight.
    pub transitioning: bool,
    pub label: &'static str,
}

/// Notification text for a lifecycle state; `None` clears the notification.
pub fn status_text(state: LifecycleState) -> Option<&'static str> {
    match state {
        LifecycleState::Starting => Some(STATUS_STARTING),
        LifecycleState::Active => Some(STATUS_ACTIVE),
        LifecycleState::Stopping | LifecycleState::Stopped => None,
    }
}

pub struct NotificationAdapter {
    controller: Arc<DaemonController>,
    host: Arc<dyn NotificationHost>,
}

impl NotificationAdapter {
    /// Subscribe to the controller's bus. Renders once immediately so a
    /// freshly attached notification never shows stale content.
    pub fn attach(
        controller: Arc<DaemonController>,
        host: Arc<dyn NotificationHost>,
    ) -> Arc<Self> {
        let adapter = Arc::new(Self { controller, host });
        adapter.refresh();
        adapter.controller.bus().subscribe(adapter.clone());
        adapter
    }

    pub fn refresh(&self) {
        match status_text(self.controller.lifecycle()) {
            Some(text) => {
                if let Err(e) = self.host.post_status(text) {
                    // e.g. notification permission denied; the engine still
                    // runs without the peripheral guarantee
                    tracing::warn!("failed to post notification: {}", e);
                }
            }
            None => self.host.clear_status(),
        }
    }
}

impl LifecycleObserver for NotificationAdapter {
    fn on_lifecycle_event(&self, _event: LifecycleEvent) {
        self.refresh();
    }
}

pub struct TileAdapter {
    controller: Arc<DaemonController>,
    host: Arc<dyn TileHost>,
}

impl TileAdapter {
    pub fn attach(controller: Arc<DaemonController>, host: Arc<dyn TileHost>) -> Arc<Self> {
        let adapter = Arc::new(Self { controller, host });
        adapter.refresh();
        adapter.controller.bus().subscribe(adapter.clone());
        adapter
    }

    pub fn refresh(&self) {
        let snapshot = TileSnapshot {
            engaged: self.controller.desired(),
            transitioning: matches!(
                self.controller.lifecycle(),
                LifecycleState::Starting | LifecycleState::Stopping
            ),
            label: TILE_LABEL,
        };
        if let Err(e) = self.host.render(&snapshot) {
            tracing::warn!("failed to render tile: {}", e);
        }
    }
}

impl LifecycleObserver for TileAdapter {
    fn on_lifecycle_event(&self, _event: LifecycleEvent) {
        self.refresh();
    }
}
