//! TailSocks core — daemon lifecycle and state reconciliation.
//!
//! The host OS gives no transactional guarantees: the process can die at any
//! instant, widgets are recreated at will, and start/stop intents arrive from
//! a notification, a quick-toggle tile, boot and foreground screens at once.
//! Everything here exists to keep persisted user intent (desired state)
//! consistent with the live engine (actual state) under those conditions.
//!
//! The engine itself — protocol, crypto, reconnection — is an opaque
//! collaborator behind [`engine::EngineBinding`]; settings persistence is an
//! injected [`config::ConfigStore`]. Both are supplied by the platform layer.

pub mod adapters;
pub mod boot;
pub mod config;
pub mod controller;
pub mod engine;
pub mod events;
pub mod logging;
pub mod network;

pub use adapters::{NotificationAdapter, NotificationHost, TileAdapter, TileHost, TileSnapshot};
pub use boot::BootReconciler;
pub use config::{ConfigError, ConfigStore, MemoryStore, StartConfig};
pub use controller::{DaemonController, LifecycleState, WakeSource, WAKE_SAFETY_TIMEOUT};
pub use engine::{EngineBinding, EngineStartError, TerminationHandler};
pub use events::{EventBus, LifecycleEvent, LifecycleObserver};
pub use logging::{BufferLayer, LogBuffer};
pub use network::NetworkObserver;
