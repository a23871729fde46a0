//! Cross-thread execution primitives

pub mod synchro;

pub use synchro::{channel, Engager, Synchro, SynchroError, SynchroToken};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
