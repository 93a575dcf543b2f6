//! Boot-time reconciliation of persisted intent.
//!
//! Runs once per boot (and again whenever the host recreates the service
//! process after an OS kill). Resolves divergence between what the user
//! wanted and what is actually running: either relaunch the engine or drop
//! the stale intent, never retry forever.

use crate::config::{self, keys, ConfigStore, StartConfig};
use crate::controller::DaemonController;
use std::sync::Arc;

pub struct BootReconciler {
    store: Arc<dyn ConfigStore>,
    controller: Arc<DaemonController>,
}

impl BootReconciler {
    pub fn new(store: Arc<dyn ConfigStore>, controller: Arc<DaemonController>) -> Self {
        Self { store, controller }
    }

    /// Reconcile desired state with reality. Returns true when a start was
    /// issued.
    ///
    /// A start happens only when the user wanted the engine running, asked
    /// for it to survive in the background, and the persisted configuration
    /// would pass validation. In every other case the stale intent is cleared
    /// so an incomplete setup cannot cause a failed start attempt on every
    /// subsequent boot.
    pub fn reconcile(&self) -> bool {
        if !config::desired_running(self.store.as_ref()) {
            return false;
        }

        let force_background = self
            .store
            .get_bool(keys::FORCE_BACKGROUND)
            .unwrap_or(false);
        if !force_background {
            tracing::info!("desired state set but background start disabled, clearing");
            config::set_desired_running(self.store.as_ref(), false);
            return false;
        }

        if let Err(e) = StartConfig::from_store(self.store.as_ref()).validate() {
            tracing::warn!("cannot reconcile, configuration incomplete: {}", e);
            config::set_desired_running(self.store.as_ref(), false);
            return false;
        }

        match self.controller.start() {
            Ok(()) => {
                tracing::info!("boot reconciliation relaunched the engine");
                true
            }
            Err(e) => {
                tracing::warn!("boot start rejected: {}", e);
                config::set_desired_running(self.store.as_ref(), false);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::controller::{LifecycleState, WakeSource};
    use crate::engine::{EngineBinding, EngineStartError, TerminationHandler};
    use crate::events::EventBus;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

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

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: Arc<FakeEngine>,
        controller: Arc<DaemonController>,
        reconciler: BootReconciler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(FakeEngine::new());
        let controller = DaemonController::new(
            store.clone(),
            engine.clone(),
            Arc::new(NoopWake),
            Arc::new(EventBus::new()),
        );
        let reconciler = BootReconciler::new(store.clone(), controller.clone());
        Fixture {
            store,
            engine,
            controller,
            reconciler,
        }
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
    fn test_reconcile_starts_when_everything_lines_up() {
        let f = fixture();
        f.store.set_bool(keys::DESIRED_RUNNING, true);
        f.store.set_bool(keys::FORCE_BACKGROUND, true);
        f.store.set_string(keys::AUTH_KEY, "tskey-test");

        assert!(f.reconciler.reconcile());
        assert!(wait_until(|| f.controller.lifecycle() == LifecycleState::Active));
        assert!(f.controller.desired());
    }

    #[test]
    fn test_reconcile_clears_desired_without_force_background() {
        let f = fixture();
        f.store.set_bool(keys::DESIRED_RUNNING, true);
        f.store.set_string(keys::AUTH_KEY, "tskey-test");

        assert!(!f.reconciler.reconcile());
        assert_eq!(f.engine.start_calls.load(Ordering::SeqCst), 0);
        assert!(!f.controller.desired());
    }

    #[test]
    fn test_reconcile_clears_desired_on_incomplete_config() {
        let f = fixture();
        f.store.set_bool(keys::DESIRED_RUNNING, true);
        f.store.set_bool(keys::FORCE_BACKGROUND, true);
        // no auth key persisted

        assert!(!f.reconciler.reconcile());
        assert_eq!(f.engine.start_calls.load(Ordering::SeqCst), 0);
        assert!(!f.controller.desired());
        assert_eq!(f.controller.lifecycle(), LifecycleState::Stopped);
    }

    #[test]
    fn test_reconcile_without_desire_does_nothing() {
        let f = fixture();
        f.store.set_bool(keys::FORCE_BACKGROUND, true);
        f.store.set_string(keys::AUTH_KEY, "tskey-test");

        assert!(!f.reconciler.reconcile());
        assert_eq!(f.engine.start_calls.load(Ordering::SeqCst), 0);
        assert!(!f.controller.desired());
    }

    #[test]
    fn test_reconcile_is_idempotent_once_running() {
        let f = fixture();
        f.store.set_bool(keys::DESIRED_RUNNING, true);
        f.store.set_bool(keys::FORCE_BACKGROUND, true);
        f.store.set_string(keys::AUTH_KEY, "tskey-test");

        assert!(f.reconciler.reconcile());
        assert!(wait_until(|| f.controller.lifecycle() == LifecycleState::Active));

        // a second pass (service recreated while the engine survived) issues
        // a no-op start and must not clear intent
        f.reconciler.reconcile();
        assert_eq!(f.engine.start_calls.load(Ordering::SeqCst), 1);
        assert!(f.controller.desired());
    }
}
