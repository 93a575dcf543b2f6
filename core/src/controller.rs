//! Daemon lifecycle controller.
//!
//! Owns the `Stopped -> Starting -> Active -> Stopping -> Stopped` state
//! machine and keeps persisted user intent (desired state) consistent with
//! the live engine (actual state) across process death, OS kills and
//! concurrent triggers. Public operations are expected from a single control
//! thread and serialize on an internal mutex; the blocking engine launch runs
//! on a dedicated background thread.
//!
//! The blocking engine call is not preemptible: `stop()` asks the engine
//! binding to terminate itself and unwinds the session immediately, and a
//! generation check makes the eventual return of the stale launch harmless.

use crate::config::{self, ConfigError, ConfigStore, StartConfig};
use crate::engine::EngineBinding;
use crate::events::{EventBus, LifecycleEvent};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Upper bound on the wake hold, enforced by the host even if `release` is
/// never reached.
pub const WAKE_SAFETY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// In-process control-flow state. Not persisted: reset to `Stopped` whenever
/// the controller is (re)constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Stopped => write!(f, "Stopped"),
            LifecycleState::Starting => write!(f, "Starting"),
            LifecycleState::Active => write!(f, "Active"),
            LifecycleState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Host mechanism preventing process suspension while the engine is starting
/// or active. Owned exclusively by the controller: acquired once per
/// `Starting` entry, released exactly once per exit to `Stopped`.
pub trait WakeSource: Send + Sync {
    /// Ask the host to keep the process scheduled. `timeout` bounds the hold
    /// independently of `release`.
    fn acquire(&self, timeout: Duration) -> Result<(), String>;
    fn release(&self);
}

struct Inner {
    lifecycle: LifecycleState,
    wake_held: bool,
    /// Bumped on every accepted start. A launch thread reports back with the
    /// generation it was spawned under, so a return that outlives its session
    /// can neither promote a stopped session nor kill a newer one.
    start_generation: u64,
}

/// The daemon lifecycle state machine.
pub struct DaemonController {
    store: Arc<dyn ConfigStore>,
    engine: Arc<dyn EngineBinding>,
    wake: Arc<dyn WakeSource>,
    bus: Arc<EventBus>,
    inner: Mutex<Inner>,
    /// Handle to the owning `Arc`, set at construction; launch threads and
    /// the termination handler upgrade it instead of keeping the controller
    /// alive themselves.
    self_weak: Mutex<Weak<DaemonController>>,
}

impl DaemonController {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        engine: Arc<dyn EngineBinding>,
        wake: Arc<dyn WakeSource>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            store,
            engine,
            wake,
            bus,
            inner: Mutex::new(Inner {
                lifecycle: LifecycleState::Stopped,
                wake_held: false,
                start_generation: 0,
            }),
            self_weak: Mutex::new(Weak::new()),
        });
        *controller.self_weak.lock() = Arc::downgrade(&controller);

        // Engine death is handled exactly like an explicit stop, except user
        // intent is preserved so a crash stays distinguishable from a stop.
        let weak = Arc::downgrade(&controller);
        controller
            .engine
            .set_termination_handler(Some(Arc::new(move || {
                if let Some(controller) = weak.upgrade() {
                    controller.handle_engine_exit();
                }
            })));

        controller
    }

    /// Record intent to run and launch the engine.
    ///
    /// A no-op unless the lifecycle is `Stopped`: at most one start is ever
    /// in flight. Config validation happens before any side effect; on
    /// `ConfigError` no state changes, no resource is acquired and no event
    /// is published.
    pub fn start(&self) -> Result<(), ConfigError> {
        {
            let inner = self.inner.lock();
            if inner.lifecycle != LifecycleState::Stopped {
                tracing::debug!("start ignored, lifecycle is {}", inner.lifecycle);
                return Ok(());
            }
        }

        let start_config = StartConfig::from_store(self.store.as_ref());
        start_config.validate()?;

        config::set_desired_running(self.store.as_ref(), true);

        let generation = {
            let mut inner = self.inner.lock();
            if inner.lifecycle != LifecycleState::Stopped {
                // lost the race to a concurrent start
                return Ok(());
            }
            inner.lifecycle = LifecycleState::Starting;
            inner.start_generation += 1;
            match self.wake.acquire(WAKE_SAFETY_TIMEOUT) {
                Ok(()) => inner.wake_held = true,
                Err(e) => tracing::warn!("wake acquire failed, continuing without: {}", e),
            }
            inner.start_generation
        };

        tracing::info!("starting engine (generation {})", generation);
        self.bus.publish(LifecycleEvent::Starting);
        self.spawn_engine_thread(start_config, generation);
        Ok(())
    }

    /// Record intent to stop and unwind to `Stopped`.
    ///
    /// Accepted from any state and idempotent; a `stop()` while already
    /// `Stopped` still re-emits `Stopped` so late subscribers converge.
    pub fn stop(&self) {
        config::set_desired_running(self.store.as_ref(), false);
        tracing::info!("stop requested");
        self.shutdown();
    }

    /// Engine-initiated termination. Same unwinding as `stop()`, but desired
    /// state is left untouched.
    pub fn handle_engine_exit(&self) {
        tracing::info!("engine terminated on its own");
        self.shutdown();
    }

    /// Live ground truth from the engine, for components that must not trust
    /// the last event they saw (e.g. UI resuming from background).
    pub fn query_actual(&self) -> bool {
        self.engine.is_running()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.lock().lifecycle
    }

    /// Persisted user intent.
    pub fn desired(&self) -> bool {
        config::desired_running(self.store.as_ref())
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn spawn_engine_thread(&self, start_config: StartConfig, generation: u64) {
        let Some(controller) = self.self_weak.lock().upgrade() else {
            return;
        };
        let spawned = std::thread::Builder::new()
            .name("ts-engine".to_string())
            .spawn(move || match controller.engine.start(&start_config) {
                Ok(()) => controller.on_engine_started(generation),
                Err(e) => {
                    tracing::error!("engine start failed: {}", e);
                    controller.on_engine_failed(generation);
                }
            });

        if let Err(e) = spawned {
            tracing::error!("failed to spawn engine thread: {}", e);
            self.shutdown();
        }
    }

    /// The blocking launch returned without error.
    fn on_engine_started(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.start_generation == generation && inner.lifecycle == LifecycleState::Starting {
            inner.lifecycle = LifecycleState::Active;
            drop(inner);
            tracing::info!("engine active");
            self.bus.publish(LifecycleEvent::Started);
            return;
        }

        // A stop raced the launch. If no newer session owns the engine, make
        // sure the late launch goes down with the old one.
        let ensure_down = matches!(
            inner.lifecycle,
            LifecycleState::Stopped | LifecycleState::Stopping
        );
        drop(inner);
        if ensure_down {
            tracing::debug!("late engine start after stop, shutting it down");
            self.engine.stop();
        }
    }

    /// The blocking launch returned an error.
    fn on_engine_failed(&self, generation: u64) {
        {
            let inner = self.inner.lock();
            if inner.start_generation != generation {
                // session already unwound or superseded
                return;
            }
        }
        self.shutdown();
    }

    /// Common unwinding for stop, start failure and engine death. Always
    /// lands on `Stopped` and always emits `Stopped`.
    fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.lifecycle != LifecycleState::Stopped {
                inner.lifecycle = LifecycleState::Stopping;
            }
        }

        self.engine.stop();

        let release = {
            let mut inner = self.inner.lock();
            inner.lifecycle = LifecycleState::Stopped;
            let held = inner.wake_held;
            inner.wake_held = false;
            held
        };
        if release {
            self.wake.release();
        }

        self.bus.publish(LifecycleEvent::Stopped);
    }
}
