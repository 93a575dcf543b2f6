//! Engine binding contract.
//!
//! The network engine is an opaque native daemon supplied by the host build;
//! this crate never reimplements its protocol or cryptography. The controller
//! needs exactly four things from it: a blocking start, an idempotent stop, a
//! side-effect-free liveness query, and a termination handler fired when the
//! engine exits on its own.

use crate::config::StartConfig;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the native start call.
#[derive(Debug, Error, Clone)]
pub enum EngineStartError {
    #[error("Engine start failed: {0}")]
    StartFailed(String),
    #[error("Engine terminated: {0}")]
    Terminated(String),
}

/// Handler invoked at most once per `start()` call, asynchronously, when the
/// engine exits without being asked to.
pub type TerminationHandler = Arc<dyn Fn() + Send + Sync>;

/// Opaque handle to the native engine process.
pub trait EngineBinding: Send + Sync {
    /// Launch the engine with the given options. Returning `Ok` means the
    /// launch did not fail synchronously; the engine keeps running until
    /// `stop()` or its own death, reported through the termination handler.
    fn start(&self, config: &StartConfig) -> Result<(), EngineStartError>;

    /// Ask the engine to terminate. Safe to call at any time, from any
    /// thread, whether or not the engine is running.
    fn stop(&self);

    /// Ground truth for "is it actually running". No side effects.
    fn is_running(&self) -> bool;

    /// Install (or clear) the termination handler. The controller owns this
    /// registration; platform glue must not overwrite it.
    fn set_termination_handler(&self, handler: Option<TerminationHandler>);
}
