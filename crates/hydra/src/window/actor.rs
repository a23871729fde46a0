//! Window actor loop

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::state::{WindowShared, WindowState};
use crate::backend::{Backend, Surface, Wake, WakeMarker};
use crate::driver::Registry;
use crate::foundation::Liveness;
use crate::impulse::{Context, Impulsable};
use crate::sync::{Synchro, SynchroToken};

/// Actor-thread state every frame advance runs against
pub(crate) struct Head {
    surface: Box<dyn Surface>,
    impulsable: Option<Box<dyn Impulsable>>,
    label: String,
}

impl Head {
    pub(crate) fn new(surface: Box<dyn Surface>, label: &str) -> Self {
        Self {
            surface,
            impulsable: None,
            label: label.to_string(),
        }
    }

    /// Install the per-frame behavior; the first one wins
    pub(crate) fn attach(&mut self, mut impulsable: Box<dyn Impulsable>) -> bool {
        if self.impulsable.is_some() {
            log::warn!("window {} already has an impulsable, ignoring", self.label);
            return false;
        }
        log::debug!("window {} provided an impulsable", self.label);
        impulsable.initialize();
        self.impulsable = Some(impulsable);
        true
    }

    /// Run one frame and present it; without a behavior this is a no-op
    pub(crate) fn advance(&mut self, ctx: &Context) -> bool {
        let Some(impulsable) = self.impulsable.as_mut() else {
            return false;
        };
        impulsable.impulse(ctx);
        self.surface.swap_buffers();
        true
    }

    fn shutdown(&mut self) {
        if let Some(mut impulsable) = self.impulsable.take() {
            impulsable.cleanup();
        }
        self.surface.release();
    }
}

pub(crate) struct Actor<B: Backend> {
    pub(crate) shared: Arc<WindowShared<B::Event>>,
    pub(crate) head: Head,
    pub(crate) token: SynchroToken<Head>,
    pub(crate) driver: Synchro<B>,
    pub(crate) waker: Arc<dyn Wake>,
    pub(crate) registry: Registry<B::Event>,
    pub(crate) liveness: Liveness,
    pub(crate) idle_cap: Duration,
}

impl<B: Backend> Actor<B> {
    /// Start the actor on its own thread
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("hydra-window-{}", self.shared.id()))
            .spawn(move || self.run())
    }

    fn run(self) {
        let Self {
            shared,
            mut head,
            token,
            driver,
            waker,
            registry,
            liveness,
            idle_cap,
        } = self;
        let mut engager = token.bind();

        match head.surface.make_current() {
            Ok(info) => {
                log::info!("window {} initialized with {info}", shared.label());
                shared.transition(WindowState::Initialized);
                shared.transition(WindowState::Running);
            }
            Err(err) => {
                log::error!("window {} cannot start: {err}", shared.label());
                shared.stop();
            }
        }

        // The exclusion lock is held only while work runs, never while idle.
        while liveness.is_alive() && shared.is_alive() && !head.surface.should_close() {
            if engager.ready_timeout(idle_cap) {
                let _exclusive = shared.exclusion();
                engager.engage_once(&mut head);
            }
        }

        shared.stop();
        shared.transition(WindowState::Stopping);
        head.shutdown();

        // Frames still queued are abandoned; their senders get an error.
        drop(engager);
        drop(head);

        request_destroy(&shared, &driver, waker.as_ref(), &registry);
    }
}

/// Hand native destruction to the driver thread without waiting for it
///
/// Registry removal happens on the driver thread right after the native
/// destroy, so a registered window is always one that still exists.
pub(crate) fn request_destroy<B: Backend>(
    shared: &Arc<WindowShared<B::Event>>,
    driver: &Synchro<B>,
    waker: &dyn Wake,
    registry: &Registry<B::Event>,
) {
    let marker = WakeMarker {
        window: shared.id(),
        native: shared.native(),
    };
    let window = Arc::clone(shared);
    let entries = registry.clone();

    let posted = driver.post(move |backend: &mut B| {
        backend.destroy_window(window.native());
        entries.remove(window.id());
        window.transition(WindowState::Destroyed);
        log::info!("window {} cleaned up", window.label());
    });

    match posted {
        Ok(()) => waker.wake(Some(marker)),
        Err(_) => {
            log::warn!("window {}: backend already stopped, skipping native destroy", shared.label());
            registry.remove(shared.id());
            shared.transition(WindowState::Destroyed);
        }
    }
}
