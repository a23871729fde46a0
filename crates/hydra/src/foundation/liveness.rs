//! Cooperative liveness flags
//!
//! Loops check a liveness flag once per iteration and unwind when it drops.
//! Nothing is ever preempted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared boolean that signals a loop (or a whole family of loops) to stop.
#[derive(Debug, Clone)]
pub struct Liveness {
    flag: Arc<AtomicBool>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    /// Create a new flag in the alive state
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether loops observing this flag should keep running
    pub fn is_alive(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Signal every observer to stop at its next iteration
    pub fn kill(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Whether two handles observe the same flag
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_is_shared_between_clones() {
        let liveness = Liveness::new();
        let observer = liveness.clone();
        assert!(observer.is_alive());

        liveness.kill();
        assert!(!observer.is_alive());
        assert!(observer.same_as(&liveness));
        assert!(!observer.same_as(&Liveness::new()));
    }
}
