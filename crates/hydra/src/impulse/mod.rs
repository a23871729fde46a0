//! Impulses: the per-frame side of a window
//!
//! An [`Engine`] beats at a fixed frequency. Every registered system gets a
//! [`Context`] for each beat its [`Potential`] accepts; window systems turn
//! that into a frame advance on their actor thread, where the window's
//! [`Impulsable`] runs.

pub mod engine;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use engine::{Engine, SystemHandle};

/// Timing information for one beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// Beat counter, starting at 1
    pub beat: u64,
    /// When the beat was produced
    pub moment: Instant,
    /// Nominal time between beats
    pub period: Duration,
}

impl Context {
    /// Context for a beat produced right now
    pub fn new(beat: u64, period: Duration) -> Self {
        Self {
            beat,
            moment: Instant::now(),
            period,
        }
    }
}

/// Predicate deciding whether a system fires on a given beat
pub type Potential = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Fire on every beat
pub fn always() -> Potential {
    Arc::new(|_: &Context| true)
}

/// Fire on every `n`th beat
pub fn every(n: u64) -> Potential {
    let n = n.max(1);
    Arc::new(move |ctx: &Context| ctx.beat % n == 0)
}

/// Wrap an arbitrary predicate
pub fn when<F>(predicate: F) -> Potential
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    Arc::new(predicate)
}

/// Application-supplied per-frame behavior of a window
///
/// Every method runs on the window's actor thread with its rendering context
/// current. `initialize` runs once when the behavior is attached, `impulse`
/// once per frame advance (followed by a buffer swap), and `cleanup` once
/// when the window shuts down.
pub trait Impulsable: Send + 'static {
    /// One-time setup, before the first frame
    fn initialize(&mut self) {}

    /// Render one frame
    fn impulse(&mut self, ctx: &Context);

    /// One-time teardown, after the last frame
    fn cleanup(&mut self) {}
}

impl<F> Impulsable for F
where
    F: FnMut(&Context) + Send + 'static,
{
    fn impulse(&mut self, ctx: &Context) {
        self(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_fires_on_multiples() {
        let potential = every(3);
        let fired: Vec<u64> = (1..=9)
            .filter(|beat| potential(&Context::new(*beat, Duration::ZERO)))
            .collect();
        assert_eq!(fired, vec![3, 6, 9]);
    }

    #[test]
    fn test_every_zero_behaves_like_always() {
        let potential = every(0);
        assert!(potential(&Context::new(5, Duration::ZERO)));
    }

    #[test]
    fn test_closures_are_impulsable() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let frames = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&frames);
        let mut counter = move |ctx: &Context| {
            seen.fetch_add(ctx.beat, Ordering::SeqCst);
        };

        Impulsable::initialize(&mut counter);
        Impulsable::impulse(&mut counter, &Context::new(1, Duration::ZERO));
        Impulsable::impulse(&mut counter, &Context::new(2, Duration::ZERO));
        Impulsable::cleanup(&mut counter);
        assert_eq!(frames.load(Ordering::SeqCst), 3);
    }
}
