use std::sync::{Mutex, PoisonError};

/// Serializes every transaction against one physical link.
///
/// Acquisition blocks without a timeout, so a wedged transaction stalls all
/// other callers until its own I/O timeout fires. Not re-entrant: calling
/// `with_exclusive_access` from inside the closure deadlocks.
#[derive(Debug, Default)]
pub struct LinkGuard {
    lock: Mutex<()>,
}

impl LinkGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exclusive_access<T>(&self, f: impl FnOnce() -> T) -> T {
        // A panic inside a previous holder leaves nothing half-written behind
        // the unit mutex, so a poisoned lock is still usable.
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
