//! Backend driver
//!
//! A [`Driver`] owns one native windowing backend on a dedicated thread. Any
//! thread may create windows through it; the work that has to touch the
//! backend is sent over the driver's synchronization channel and executed
//! there.
//!
//! ```text
//!   Inactive ──activate──► Initializing ──► Running ──stop / no windows──► Draining ──► Inactive
//!      ▲                                                                              │
//!      └──────────────────────────── re-activation ◄──────────────────────────────────┘
//! ```
//!
//! Each activation is a fresh session: new channel, new backend instance,
//! new loop thread. Nothing survives a deactivation except the driver's
//! configuration and factory.

pub mod registry;
mod run;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver};
use thiserror::Error;

use crate::backend::{Backend, BackendError, Wake, WindowMode, WindowSpec};
use crate::config::HydraConfig;
use crate::foundation::{next_id, Liveness, Position, Size};
use crate::impulse::{Context, Engine, Potential};
use crate::sync::{self, lock, Synchro, SynchroError};
use crate::window::{request_destroy, Actor, Head, WindowHandle, WindowId, WindowShared, WindowState};

pub use registry::Registry;

/// Driver errors
#[derive(Error, Debug)]
pub enum DriverError {
    /// The native backend failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Work could not be delivered to (or completed by) an owner thread
    #[error("synchronization failed: {0}")]
    Synchro(#[from] SynchroError),

    /// The driver is shutting down and refuses new windows
    #[error("driver is not running")]
    Inactive,

    /// An owner thread could not be started
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Driver lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No loop thread, no backend
    Inactive,
    /// Loop thread started, backend coming up
    Initializing,
    /// Engaging work and pumping events
    Running,
    /// Waiting for remaining windows to be destroyed before teardown
    Draining,
}

type Factory<B> = Box<dyn Fn() -> Result<B, BackendError> + Send + Sync>;

pub(crate) struct DriverInner<B: Backend> {
    factory: Factory<B>,
    config: HydraConfig,
    liveness: Liveness,
    registry: Registry<B::Event>,
    state: Mutex<DriverState>,
    session: Mutex<Option<Session<B>>>,
    activation: Mutex<()>,
}

impl<B: Backend> DriverInner<B> {
    fn set_state(&self, next: DriverState) {
        let mut state = lock(&self.state);
        if *state != next {
            log::debug!("driver {:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}

/// One activation of the driver loop
struct Session<B: Backend> {
    synchro: Synchro<B>,
    waker: Arc<dyn Wake>,
    running: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    finished: Receiver<()>,
}

impl<B: Backend> Session<B> {
    fn link(&self) -> Link<B> {
        Link {
            synchro: self.synchro.clone(),
            waker: Arc::clone(&self.waker),
            running: Arc::clone(&self.running),
        }
    }
}

/// What callers need from the current session
struct Link<B: Backend> {
    synchro: Synchro<B>,
    waker: Arc<dyn Wake>,
    running: Arc<AtomicBool>,
}

/// Owner of one native windowing backend and every window created through it
pub struct Driver<B: Backend> {
    inner: Arc<DriverInner<B>>,
}

impl<B: Backend> Clone for Driver<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> Driver<B> {
    /// Create an inactive driver with its own liveness flag
    ///
    /// `factory` runs on the driver thread at every activation.
    pub fn new<F>(factory: F, config: HydraConfig) -> Self
    where
        F: Fn() -> Result<B, BackendError> + Send + Sync + 'static,
    {
        Self::with_liveness(factory, config, Liveness::new())
    }

    /// Create an inactive driver whose loops also stop when `liveness` is killed
    pub fn with_liveness<F>(factory: F, config: HydraConfig, liveness: Liveness) -> Self
    where
        F: Fn() -> Result<B, BackendError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DriverInner {
                factory: Box::new(factory),
                config,
                liveness,
                registry: Registry::default(),
                state: Mutex::new(DriverState::Inactive),
                session: Mutex::new(None),
                activation: Mutex::new(()),
            }),
        }
    }

    /// Driver configuration
    pub fn config(&self) -> &HydraConfig {
        &self.inner.config
    }

    /// Liveness flag shared by the driver loop and every window actor
    pub fn liveness(&self) -> &Liveness {
        &self.inner.liveness
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        *lock(&self.inner.state)
    }

    /// Whether a loop thread is up and accepting work
    pub fn is_active(&self) -> bool {
        lock(&self.inner.session)
            .as_ref()
            .is_some_and(|session| session.live.load(Ordering::Acquire) && session.running.load(Ordering::Acquire))
    }

    /// Registry of windows that have not finished their destroy sequence
    pub fn registry(&self) -> &Registry<B::Event> {
        &self.inner.registry
    }

    /// Number of registered windows
    pub fn window_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Ids of registered windows
    pub fn window_ids(&self) -> Vec<WindowId> {
        self.inner.registry.ids()
    }

    /// Bring the backend up if it is not running
    ///
    /// Safe to call from any thread, any number of times: only a call that
    /// finds the driver inactive starts a loop, and it returns once the
    /// backend has finished initializing.
    pub fn activate(&self) -> Result<(), DriverError> {
        self.link().map(drop)
    }

    fn link(&self) -> Result<Link<B>, DriverError> {
        if let Some(link) = self.current_link()? {
            return Ok(link);
        }
        // One activation at a time; the session lock is never held while waiting.
        let _activation = lock(&self.inner.activation);
        if let Some(link) = self.current_link()? {
            return Ok(link);
        }

        // A finished session must be fully torn down before a new backend starts.
        let stale = lock(&self.inner.session)
            .as_mut()
            .map(|session| (session.thread.take(), session.finished.clone()));
        if let Some((thread, finished)) = stale {
            if thread.is_some_and(|thread| thread.join().is_err()) {
                log::error!("driver loop panicked");
            }
            // Disconnects once the loop thread has returned, whoever joined it.
            let _ = finished.recv();
        }

        self.inner.set_state(DriverState::Initializing);
        let (synchro, token) = sync::channel::<B>();
        let running = Arc::new(AtomicBool::new(true));
        let live = Arc::new(AtomicBool::new(true));
        let (handoff, ready) = bounded(1);
        let (done, finished) = bounded::<()>(0);

        let inner = Arc::clone(&self.inner);
        let loop_running = Arc::clone(&running);
        let loop_live = Arc::clone(&live);
        let spawned = thread::Builder::new().name("hydra-driver".to_string()).spawn(move || {
            let _done = done;
            run::drive(&inner, token, &loop_running, &loop_live, &handoff);
        });
        let mut thread = match spawned {
            Ok(thread) => Some(thread),
            Err(err) => {
                self.inner.set_state(DriverState::Inactive);
                return Err(err.into());
            }
        };

        match ready.recv() {
            Ok(Ok(waker)) => {
                let current = Session {
                    synchro,
                    waker,
                    running,
                    live,
                    thread,
                    finished,
                };
                let link = current.link();
                *lock(&self.inner.session) = Some(current);
                Ok(link)
            }
            Ok(Err(err)) => {
                if let Some(thread) = thread.take() {
                    let _ = thread.join();
                }
                Err(err.into())
            }
            Err(_) => {
                if let Some(thread) = thread.take() {
                    let _ = thread.join();
                }
                self.inner.set_state(DriverState::Inactive);
                Err(DriverError::Inactive)
            }
        }
    }

    /// Link to the running session, if there is one
    ///
    /// Code running on a loop that is shutting down cannot bring up its
    /// successor, since that would wait for its own thread to exit.
    fn current_link(&self) -> Result<Option<Link<B>>, DriverError> {
        let session = lock(&self.inner.session);
        match session.as_ref() {
            Some(current) if current.live.load(Ordering::Acquire) => Ok(Some(current.link())),
            Some(current) if current.synchro.is_owner_thread() => Err(DriverError::Inactive),
            _ => Ok(None),
        }
    }

    /// Ask the loop to exit
    ///
    /// The loop notices at its next iteration, drains remaining windows and
    /// tears the backend down. Does nothing when no loop is running.
    pub fn stop(&self) {
        if let Some(session) = lock(&self.inner.session).as_ref() {
            if session.live.load(Ordering::Acquire) && session.running.swap(false, Ordering::AcqRel) {
                log::debug!("driver stop requested");
                session.waker.wake(None);
            }
        }
    }

    /// Wait for the current loop thread to exit
    pub fn join(&self) {
        let thread = lock(&self.inner.session)
            .as_mut()
            .and_then(|session| session.thread.take());
        if let Some(thread) = thread {
            if thread.join().is_err() {
                log::error!("driver loop panicked");
            }
        }
    }

    /// Run `work` on the driver thread with the backend, activating if needed
    pub fn send<R, F>(&self, work: F) -> Result<R, DriverError>
    where
        F: FnOnce(&mut B) -> R + Send + 'static,
        R: Send + 'static,
    {
        Ok(self.link()?.synchro.send(work)?)
    }

    /// True once every window is gone
    ///
    /// When it reports true it has also stopped the loop and given the
    /// backend the configured grace period to settle, so it can serve
    /// directly as a shutdown condition.
    pub fn has_no_windows(&self) -> bool {
        if !self.inner.registry.is_empty() {
            return false;
        }
        self.stop();
        thread::sleep(self.inner.config.no_windows_grace());
        true
    }

    /// [`has_no_windows`](Self::has_no_windows) as an engine potential
    pub fn no_windows_potential(&self) -> Potential {
        let driver = self.clone();
        Arc::new(move |_: &Context| driver.has_no_windows())
    }

    /// Create a window and start its actor
    ///
    /// The window's frames are driven by a system registered on `engine`
    /// with the given potential. The handle is returned as soon as the actor
    /// thread is started; its context becomes current shortly after.
    pub fn create_window(
        &self,
        engine: &Engine,
        title: &str,
        size: Option<Size>,
        position: Option<Position>,
        potential: Potential,
        muted: bool,
    ) -> Result<WindowHandle<B>, DriverError> {
        let spec = WindowSpec {
            title: title.to_string(),
            size: size.unwrap_or(self.inner.config.default_size),
            position,
            mode: WindowMode::Windowed,
        };
        self.spawn_window(engine, spec, potential, muted)
    }

    /// Create a fullscreen window on the primary display and start its actor
    pub fn create_fullscreen_window(
        &self,
        engine: &Engine,
        title: &str,
        potential: Potential,
        muted: bool,
    ) -> Result<WindowHandle<B>, DriverError> {
        let spec = WindowSpec {
            title: title.to_string(),
            size: self.inner.config.default_size,
            position: None,
            mode: WindowMode::Fullscreen,
        };
        self.spawn_window(engine, spec, potential, muted)
    }

    fn spawn_window(
        &self,
        engine: &Engine,
        spec: WindowSpec,
        potential: Potential,
        muted: bool,
    ) -> Result<WindowHandle<B>, DriverError> {
        let link = self.link()?;
        let id = next_id();
        let (head_synchro, token) = sync::channel::<Head>();
        let mode = spec.mode;

        // Creation and registration happen together on the driver thread.
        let registry = self.inner.registry.clone();
        let running = Arc::clone(&link.running);
        let actor_synchro = head_synchro.clone();
        let (shared, surface) = link.synchro.send(move |backend: &mut B| {
            if !running.load(Ordering::Acquire) {
                return Err(DriverError::Inactive);
            }
            let (native, surface) = backend.create_window(&spec)?;
            let shared = Arc::new(WindowShared::new(id, native, spec.title, actor_synchro));
            registry.insert(Arc::clone(&shared));
            Ok((shared, surface))
        })??;
        drop(head_synchro);

        log::info!(
            "{}window {} created",
            if mode == WindowMode::Fullscreen { "fullscreen " } else { "" },
            shared.label()
        );

        let actor = Actor::<B> {
            shared: Arc::clone(&shared),
            head: Head::new(surface, shared.label()),
            token,
            driver: link.synchro.clone(),
            waker: Arc::clone(&link.waker),
            registry: self.inner.registry.clone(),
            liveness: self.inner.liveness.clone(),
            idle_cap: self.inner.config.idle_cap(),
        };
        if let Err(err) = actor.spawn() {
            log::error!("window {}: failed to start actor: {err}", shared.label());
            shared.stop();
            shared.transition(WindowState::Stopping);
            request_destroy(&shared, &link.synchro, link.waker.as_ref(), &self.inner.registry);
            return Err(err.into());
        }

        let window = Arc::clone(&shared);
        let liveness = self.inner.liveness.clone();
        let system = engine.attach_system(shared.alive_flag(), potential, muted, move |ctx| {
            if liveness.is_alive() && window.is_alive() {
                if let Err(err) = window.advance(*ctx) {
                    log::trace!("window {} skipped a frame: {err}", window.label());
                }
            }
        });
        match system {
            Ok(system) => Ok(WindowHandle::new(shared, Some(system))),
            Err(err) => {
                shared.stop();
                shared.nudge();
                Err(err.into())
            }
        }
    }
}
