//! Window lifecycle state shared between the actor, the driver and handles

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::actor::Head;
use crate::backend::NativeId;
use crate::impulse::{Context, Impulsable};
use crate::sync::{lock, Synchro, SynchroError};

/// Process-unique window identity; never reused while the process runs
pub type WindowId = u64;

/// Raw-event callback attached to a window; runs on the driver thread
pub type EventHandler<E> = Box<dyn FnMut(&E) + Send>;

/// Window lifecycle states, in the only order they can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WindowState {
    /// Native window exists and is registered; actor thread starting
    Created,
    /// Rendering context is current on the actor thread
    Initialized,
    /// Actor loop is engaging frames
    Running,
    /// Actor loop has exited; cleanup and destruction are underway
    Stopping,
    /// Native window destroyed and removed from the registry
    Destroyed,
}

pub(crate) struct WindowShared<E> {
    id: WindowId,
    native: NativeId,
    title: String,
    label: String,
    alive: Arc<AtomicBool>,
    state: Mutex<WindowState>,
    changed: Condvar,
    frames: AtomicU64,
    exclusion: Mutex<()>,
    handler: Mutex<Option<EventHandler<E>>>,
    handler_epoch: AtomicU64,
    synchro: Synchro<Head>,
}

impl<E> WindowShared<E> {
    pub(crate) fn new(id: WindowId, native: NativeId, title: String, synchro: Synchro<Head>) -> Self {
        Self {
            id,
            native,
            title,
            label: format!("[{native}.{id}]"),
            alive: Arc::new(AtomicBool::new(true)),
            state: Mutex::new(WindowState::Created),
            changed: Condvar::new(),
            frames: AtomicU64::new(0),
            exclusion: Mutex::new(()),
            handler: Mutex::new(None),
            handler_epoch: AtomicU64::new(0),
            synchro,
        }
    }

    pub(crate) const fn id(&self) -> WindowId {
        self.id
    }

    pub(crate) const fn native(&self) -> NativeId {
        self.native
    }

    pub(crate) fn title(&self) -> &str {
        &self.title
    }

    /// `[native.id]`, the form every log line uses
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Flip the liveness flag; the actor notices at its next iteration
    pub(crate) fn stop(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            log::debug!("window {} stopping", self.label);
        }
    }

    /// Queue a no-op so an idle actor loop cycles promptly
    pub(crate) fn nudge(&self) {
        if self.synchro.post(|_: &mut Head| {}).is_err() {
            log::trace!("window {} already exited", self.label);
        }
    }

    pub(crate) fn state(&self) -> WindowState {
        *lock(&self.state)
    }

    /// Move forward to `next`; backward moves are ignored
    pub(crate) fn transition(&self, next: WindowState) {
        let mut state = lock(&self.state);
        if next > *state {
            log::debug!("window {} {:?} -> {:?}", self.label, *state, next);
            *state = next;
            self.changed.notify_all();
        }
    }

    /// Block until the state reaches `target` or the timeout passes
    pub(crate) fn wait_for(&self, target: WindowState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        while *state < target {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = match self.changed.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    pub(crate) fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub(crate) fn exclusion(&self) -> MutexGuard<'_, ()> {
        lock(&self.exclusion)
    }

    pub(crate) fn set_handler(&self, handler: Option<EventHandler<E>>) {
        let mut slot = lock(&self.handler);
        self.handler_epoch.fetch_add(1, Ordering::AcqRel);
        *slot = handler;
    }

    /// Deliver a raw event to the attached handler, if any
    ///
    /// The handler runs with the slot unlocked, so it may replace or clear
    /// itself. It goes back only if nothing was installed while it ran.
    pub(crate) fn dispatch(&self, event: &E) {
        let (taken, epoch) = {
            let mut slot = lock(&self.handler);
            (slot.take(), self.handler_epoch.load(Ordering::Acquire))
        };
        let Some(mut handler) = taken else {
            return;
        };
        handler(event);

        let mut slot = lock(&self.handler);
        if slot.is_none() && self.handler_epoch.load(Ordering::Acquire) == epoch {
            *slot = Some(handler);
        }
    }

    pub(crate) fn attach(&self, impulsable: Box<dyn Impulsable>) -> Result<bool, SynchroError> {
        self.synchro.send(move |head: &mut Head| head.attach(impulsable))
    }

    /// Submit one frame advance and wait for it; returns whether a frame was drawn
    pub(crate) fn advance(&self, ctx: Context) -> Result<bool, SynchroError> {
        let drawn = self.synchro.send(move |head: &mut Head| head.advance(&ctx))?;
        if drawn {
            self.frames.fetch_add(1, Ordering::AcqRel);
        }
        Ok(drawn)
    }
}
