//! Observer list fired when the server's client set changes.

use std::sync::{Arc, Mutex, PoisonError};

/// A registered observer. Context is whatever the closure captures.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Mutex-guarded callback list.
///
/// The lock only covers list mutation. [`ChangeNotifier::notify`] calls a
/// snapshot of the list with the lock released, so a callback may register
/// further callbacks or take its own time without blocking registration.
#[derive(Default)]
pub struct ChangeNotifier {
    callbacks: Mutex<Vec<ChangeCallback>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback registered at the time of the call.
    pub fn notify(&self) {
        let snapshot: Vec<ChangeCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in snapshot {
            callback();
        }
    }
}
