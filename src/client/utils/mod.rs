pub mod inflight;
pub mod session_store;
pub mod validation;

use std::sync::{Mutex, MutexGuard};

// client state behind these locks stays consistent between statements, so a
// poisoned guard is still usable
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
