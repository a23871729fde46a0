//! Fixed-frequency impulse engine
//!
//! One clock thread produces beats; each system has its own worker thread
//! with a single-slot mailbox. A worker that is still busy with the previous
//! beat simply misses the next one, so a slow window drops frames instead of
//! building a backlog.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Sender, TrySendError};

use super::{Context, Potential};
use crate::foundation::{next_id, Liveness};
use crate::sync::lock;

struct Slot {
    id: u64,
    alive: Arc<AtomicBool>,
    beats: Sender<Context>,
}

struct EngineInner {
    liveness: Liveness,
    period: Duration,
    beat: AtomicU64,
    systems: Mutex<Vec<Slot>>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

/// Beat source driving every registered system
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Handle to one registered system
#[derive(Debug, Clone)]
pub struct SystemHandle {
    id: u64,
    alive: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
}

impl SystemHandle {
    /// Process-unique system id
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether the system still receives beats
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Retire the system; its worker exits at the next beat
    pub fn stop(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Whether beats are currently ignored
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Ignore beats until unmuted
    pub fn mute(&self) {
        self.muted.store(true, Ordering::Release);
    }

    /// Resume reacting to beats
    pub fn unmute(&self) {
        self.muted.store(false, Ordering::Release);
    }
}

impl Engine {
    /// Create an engine beating at `frequency_hz` with its own liveness flag
    pub fn new(frequency_hz: u32) -> Self {
        Self::with_liveness(frequency_hz, Liveness::new())
    }

    /// Create an engine whose clock stops when `liveness` is killed
    pub fn with_liveness(frequency_hz: u32, liveness: Liveness) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(frequency_hz.max(1)));
        Self {
            inner: Arc::new(EngineInner {
                liveness,
                period,
                beat: AtomicU64::new(0),
                systems: Mutex::new(Vec::new()),
                clock: Mutex::new(None),
            }),
        }
    }

    /// Liveness flag observed by the clock and every system
    pub fn liveness(&self) -> &Liveness {
        &self.inner.liveness
    }

    /// Nominal time between beats
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Number of beats produced so far
    pub fn beats(&self) -> u64 {
        self.inner.beat.load(Ordering::Acquire)
    }

    /// Number of systems still registered
    pub fn system_count(&self) -> usize {
        let mut systems = lock(&self.inner.systems);
        systems.retain(|slot| slot.alive.load(Ordering::Acquire));
        systems.len()
    }

    /// Register a system that runs `action` on every beat `potential` accepts
    pub fn add_system<F>(&self, potential: Potential, muted: bool, action: F) -> io::Result<SystemHandle>
    where
        F: FnMut(&Context) + Send + 'static,
    {
        self.attach_system(Arc::new(AtomicBool::new(true)), potential, muted, action)
    }

    /// Register a system whose liveness is the given flag
    pub(crate) fn attach_system<F>(
        &self,
        alive: Arc<AtomicBool>,
        potential: Potential,
        muted: bool,
        mut action: F,
    ) -> io::Result<SystemHandle>
    where
        F: FnMut(&Context) + Send + 'static,
    {
        let id = next_id();
        let (beats, mailbox) = bounded::<Context>(1);
        let handle = SystemHandle {
            id,
            alive: Arc::clone(&alive),
            muted: Arc::new(AtomicBool::new(muted)),
        };

        let liveness = self.inner.liveness.clone();
        let worker_alive = Arc::clone(&alive);
        let worker_muted = Arc::clone(&handle.muted);
        thread::Builder::new()
            .name(format!("hydra-system-{id}"))
            .spawn(move || {
                for ctx in mailbox.iter() {
                    if !liveness.is_alive() || !worker_alive.load(Ordering::Acquire) {
                        break;
                    }
                    if worker_muted.load(Ordering::Acquire) || !potential(&ctx) {
                        continue;
                    }
                    action(&ctx);
                }
                log::trace!("system [{id}] retired");
            })?;

        lock(&self.inner.systems).push(Slot { id, alive, beats });
        log::debug!("system [{id}] registered{}", if muted { " (muted)" } else { "" });
        Ok(handle)
    }

    /// Produce one beat immediately and hand it to every live system
    pub fn tick(&self) -> Context {
        let beat = self.inner.beat.fetch_add(1, Ordering::AcqRel) + 1;
        let ctx = Context::new(beat, self.inner.period);

        let mut systems = lock(&self.inner.systems);
        systems.retain(|slot| slot.alive.load(Ordering::Acquire));
        for slot in systems.iter() {
            match slot.beats.try_send(ctx) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => log::trace!("system [{}] busy, beat {beat} skipped", slot.id),
                Err(TrySendError::Disconnected(_)) => slot.alive.store(false, Ordering::Release),
            }
        }
        ctx
    }

    /// Start the clock thread; does nothing if it is already running
    pub fn spark(&self) -> io::Result<()> {
        let mut clock = lock(&self.inner.clock);
        if clock.is_some() {
            return Ok(());
        }

        let engine = self.clone();
        *clock = Some(thread::Builder::new().name("hydra-clock".to_string()).spawn(move || {
            log::info!("engine sparked at {:?} per beat", engine.inner.period);
            let mut next = Instant::now();
            while engine.inner.liveness.is_alive() {
                engine.tick();
                next += engine.inner.period;
                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                } else {
                    next = now;
                }
            }
            log::info!("engine stopped after {} beats", engine.beats());
        })?);
        Ok(())
    }

    /// Kill the liveness flag, wait for the clock and release every system
    pub fn stop(&self) {
        self.inner.liveness.kill();
        let clock = lock(&self.inner.clock).take();
        if let Some(clock) = clock {
            if clock.thread().id() != thread::current().id() && clock.join().is_err() {
                log::error!("engine clock panicked");
            }
        }
        lock(&self.inner.systems).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impulse::{always, every};
    use std::sync::atomic::AtomicUsize;

    fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn test_sparked_engine_drives_systems() {
        let engine = Engine::new(500);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        engine
            .add_system(always(), false, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        engine.spark().unwrap();
        assert!(wait_until(Duration::from_secs(5), || count.load(Ordering::SeqCst) >= 5));
        engine.stop();
        assert!(!engine.liveness().is_alive());
    }

    #[test]
    fn test_potential_filters_beats() {
        let engine = Engine::new(60);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        engine
            .add_system(every(2), false, move |ctx| log.lock().unwrap().push(ctx.beat))
            .unwrap();

        for _ in 0..4 {
            engine.tick();
            // Single-slot mailbox: let the worker take each beat.
            thread::sleep(Duration::from_millis(20));
        }
        assert!(wait_until(Duration::from_secs(2), || seen.lock().unwrap().len() == 2));
        assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_muted_system_ignores_beats_until_unmuted() {
        let engine = Engine::new(60);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = engine
            .add_system(always(), true, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        engine.tick();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        handle.unmute();
        assert!(!handle.is_muted());
        engine.tick();
        assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_stopped_system_is_pruned() {
        let engine = Engine::new(60);
        let handle = engine.add_system(always(), false, |_| {}).unwrap();
        assert_eq!(engine.system_count(), 1);

        handle.stop();
        engine.tick();
        assert_eq!(engine.system_count(), 0);
        assert!(!handle.is_alive());
    }
}
