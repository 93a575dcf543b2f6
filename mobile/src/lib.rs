// tailsocks-mobile — platform-facing facade over the core controller.
//
// The host's service, tile, toggle and boot-receiver classes are thin shims:
// every OS lifecycle callback lands here and becomes a call on the core
// controller. No lifecycle decisions are made on the platform side.

pub use tailsocks_core::*;

use std::sync::Arc;

/// Install the global tracing subscriber: human-readable output for the
/// platform log stream plus the in-memory ring the log screen reads.
///
/// Call once, before the service first starts. Subsequent calls fail.
pub fn init_logging(buffer: &LogBuffer) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(BufferLayer::new(buffer.clone()));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Entry point the host service delegates its callbacks to.
///
/// Owns the wiring: controller, event bus, boot reconciler. Adapter
/// attachment is separate because the host recreates widgets independently
/// of the service process.
pub struct ServiceAdapter {
    controller: Arc<DaemonController>,
    reconciler: BootReconciler,
}

impl ServiceAdapter {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        engine: Arc<dyn EngineBinding>,
        wake: Arc<dyn WakeSource>,
    ) -> Self {
        let controller = DaemonController::new(
            store.clone(),
            engine,
            wake,
            Arc::new(EventBus::new()),
        );
        let reconciler = BootReconciler::new(store, controller.clone());
        Self {
            controller,
            reconciler,
        }
    }

    pub fn controller(&self) -> &Arc<DaemonController> {
        &self.controller
    }

    /// Boot completed. Runs the one-shot reconciliation.
    pub fn on_boot_completed(&self) -> bool {
        self.reconciler.reconcile()
    }

    /// The OS recreated the service process (sticky restart after a kill).
    /// Same decision as boot: relaunch only if the user wanted background
    /// operation, otherwise drop the stale intent.
    pub fn on_create(&self) {
        if self.controller.query_actual() {
            return;
        }
        self.reconciler.reconcile();
    }

    /// An explicit start command arrived (notification action, foreground
    /// screen, tile trampoline).
    pub fn on_start_command(&self) -> Result<(), ConfigError> {
        self.controller.start()
    }

    /// An explicit stop command arrived.
    pub fn on_stop_command(&self) {
        self.controller.stop();
    }

    /// Quick-tile tap. Keyed on actual state, not intent: if the engine is
    /// really running this is a stop, otherwise a start attempt.
    pub fn toggle(&self) -> Result<(), ConfigError> {
        if self.controller.query_actual() {
            self.controller.stop();
            Ok(())
        } else {
            self.controller.start()
        }
    }

    /// Wire the persistent notification. Renders immediately.
    pub fn attach_notification(&self, host: Arc<dyn NotificationHost>) -> Arc<NotificationAdapter> {
        NotificationAdapter::attach(self.controller.clone(), host)
    }

    /// Wire the quick-toggle tile. Renders immediately.
    pub fn attach_tile(&self, host: Arc<dyn TileHost>) -> Arc<TileAdapter> {
        TileAdapter::attach(self.controller.clone(), host)
    }

    /// Wire the connectivity annotator.
    pub fn attach_network_observer(
        &self,
        notifications: Arc<dyn NotificationHost>,
    ) -> Arc<NetworkObserver> {
        NetworkObserver::new(self.controller.clone(), notifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tailsocks_core::config::keys;

    struct FakeEngine {
        running: AtomicBool,
        start_calls: AtomicUsize,
        handler: Mutex<Option<TerminationHandler>>,
    }

    impl FakeEngine {
        fn new() -> Self {
            Self {
                running: AtomicBool::new(false),
                start_calls: AtomicUsize::new(0),
                handler: Mutex::new(None),
            }
        }
    }

    impl EngineBinding for FakeEngine {
        fn start(&self, _config: &StartConfig) -> Result<(), EngineStartError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn set_termination_handler(&self, handler: Option<TerminationHandler>) {
            *self.handler.lock() = handler;
        }
    }

    struct NoopWake;

    impl WakeSource for NoopWake {
        fn acquire(&self, _timeout: Duration) -> Result<(), String> {
            Ok(())
        }

        fn release(&self) {}
    }

    fn adapter() -> (Arc<MemoryStore>, Arc<FakeEngine>, ServiceAdapter) {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(FakeEngine::new());
        let adapter = ServiceAdapter::new(store.clone(), engine.clone(), Arc::new(NoopWake));
        (store, engine, adapter)
    }

    fn wait_until(predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_stop_commands() {
        let (store, _engine, adapter) = adapter();
        store.set_string(keys::AUTH_KEY, "tskey-test");

        adapter.on_start_command().unwrap();
        assert!(wait_until(|| {
            adapter.controller().lifecycle() == LifecycleState::Active
        }));

        adapter.on_stop_command();
        assert_eq!(adapter.controller().lifecycle(), LifecycleState::Stopped);
        assert!(!adapter.controller().desired());
    }

    #[test]
    fn test_toggle_follows_actual_state() {
        let (store, engine, adapter) = adapter();
        store.set_string(keys::AUTH_KEY, "tskey-test");

        adapter.toggle().unwrap();
        assert!(wait_until(|| adapter.controller().query_actual()));
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 1);

        adapter.toggle().unwrap();
        assert!(!adapter.controller().query_actual());
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_create_relaunches_after_process_death() {
        let (store, engine, adapter) = adapter();
        store.set_string(keys::AUTH_KEY, "tskey-test");
        // the previous process died while the user wanted background operation
        store.set_bool(keys::DESIRED_RUNNING, true);
        store.set_bool(keys::FORCE_BACKGROUND, true);

        adapter.on_create();
        assert!(wait_until(|| {
            adapter.controller().lifecycle() == LifecycleState::Active
        }));
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_create_clears_stale_intent_without_force_background() {
        let (store, engine, adapter) = adapter();
        store.set_string(keys::AUTH_KEY, "tskey-test");
        store.set_bool(keys::DESIRED_RUNNING, true);

        adapter.on_create();
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 0);
        assert!(!adapter.controller().desired());
    }

    #[test]
    fn test_on_create_leaves_running_engine_alone() {
        let (store, engine, adapter) = adapter();
        store.set_string(keys::AUTH_KEY, "tskey-test");

        adapter.on_start_command().unwrap();
        assert!(wait_until(|| adapter.controller().query_actual()));

        adapter.on_create();
        assert_eq!(engine.start_calls.load(Ordering::SeqCst), 1);
        assert!(adapter.controller().desired());
    }

    #[test]
    fn test_boot_receiver_path() {
        let (store, _engine, adapter) = adapter();
        store.set_string(keys::AUTH_KEY, "tskey-test");
        store.set_bool(keys::DESIRED_RUNNING, true);
        store.set_bool(keys::FORCE_BACKGROUND, true);

        assert!(adapter.on_boot_completed());
        assert!(wait_until(|| {
            adapter.controller().lifecycle() == LifecycleState::Active
        }));
    }

    #[test]
    fn test_log_buffer_wiring() {
        // not using the global subscriber here so tests stay independent
        let buffer = LogBuffer::new(16);
        buffer.push("engine active".to_string());
        assert!(buffer.get().contains("engine active"));
    }
}
