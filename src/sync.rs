#[cfg(feature = "loom")]
pub(crate) use loom::sync;

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync;

pub(crate) use sync::Mutex;
pub(crate) use sync::MutexGuard;

/// Locks `mutex`, recovering the guard if a previous holder panicked. Handlers never run under a
/// queue lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
