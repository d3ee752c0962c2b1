//! Handler pipeline types.
//!
//! Handlers are plain function values held in an ordered list per task and
//! invoked synchronously by the scheduler in registration order — no hidden
//! concurrency within one event's handler chain, which keeps delivery order
//! deterministic and testable. A failing handler marks the event failed but
//! never stops later handlers or later events.

use std::sync::Arc;

use thiserror::Error;

use rowstream_core::CapturedEvent;

/// Error returned by a change handler. Recorded against the event and
/// counted in metrics; never propagated past the scheduler.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A downstream consumer callback, invoked once per captured event.
pub type ChangeHandler =
    Arc<dyn Fn(&CapturedEvent) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// Wrap a closure as a [`ChangeHandler`].
pub fn handler<F>(f: F) -> ChangeHandler
where
    F: Fn(&CapturedEvent) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}
