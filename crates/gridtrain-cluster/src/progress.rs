//! Progress reporting and operator interruption
//!
//! The queue-watch loop runs for minutes at a time; callers observe it
//! through a [`Reporter`] and stop it through a [`CancelFlag`] wired to
//! whatever signal handling the frontend uses.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sink for progress events of type `E`.
pub trait Reporter<E>: Send + Sync {
    fn report(&self, event: E);
}

impl<E> Reporter<E> for () {
    fn report(&self, _event: E) {}
}

impl<E: Send> Reporter<E> for std::sync::mpsc::Sender<E> {
    fn report(&self, event: E) {
        let _ = self.send(event);
    }
}

/// Cooperative stop flag shared between a watch loop and a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
