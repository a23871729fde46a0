//! High-level window handle for applications
//!
//! A [`WindowHandle`] is a cheap, cloneable reference to a window actor. It
//! never touches the native window itself: everything that needs the
//! rendering context is marshaled onto the actor thread.

use std::fmt;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use super::state::{WindowShared, WindowState};
use super::WindowId;
use crate::backend::{Backend, NativeId};
use crate::impulse::{Context, Impulsable, SystemHandle};
use crate::sync::SynchroError;

/// Application-facing reference to a window actor
pub struct WindowHandle<B: Backend> {
    shared: Arc<WindowShared<B::Event>>,
    system: Option<SystemHandle>,
}

impl<B: Backend> Clone for WindowHandle<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            system: self.system.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for WindowHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowHandle")
            .field("id", &self.shared.id())
            .field("native", &self.shared.native())
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> WindowHandle<B> {
    pub(crate) const fn new(shared: Arc<WindowShared<B::Event>>, system: Option<SystemHandle>) -> Self {
        Self { shared, system }
    }

    /// Process-unique window id (the registry key)
    pub fn id(&self) -> WindowId {
        self.shared.id()
    }

    /// Backend-assigned window id
    pub fn native_id(&self) -> NativeId {
        self.shared.native()
    }

    /// Title the window was created with
    pub fn title(&self) -> &str {
        self.shared.title()
    }

    /// Current lifecycle state
    pub fn state(&self) -> WindowState {
        self.shared.state()
    }

    /// Whether the actor has not been asked to stop
    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Ask the actor to stop; it cleans up and destroys the window on its own
    pub fn stop(&self) {
        self.shared.stop();
        self.shared.nudge();
    }

    /// Frame-scheduling system registered for this window
    pub const fn system(&self) -> Option<&SystemHandle> {
        self.system.as_ref()
    }

    /// Attach the per-frame behavior
    ///
    /// `initialize()` runs on the actor thread before this returns. Only the
    /// first behavior is kept; later calls return `Ok(false)`.
    pub fn set_impulsable<I: Impulsable>(&self, impulsable: I) -> Result<bool, SynchroError> {
        self.shared.attach(Box::new(impulsable))
    }

    /// Advance one frame on the actor thread and wait for it
    ///
    /// Returns `Ok(false)` when no behavior is attached yet; nothing is drawn
    /// or swapped in that case.
    pub fn impulse(&self, ctx: &Context) -> Result<bool, SynchroError> {
        self.shared.advance(*ctx)
    }

    /// Receive every raw backend event, replacing any previous handler
    ///
    /// The handler runs on the driver thread between event polls. It must not
    /// block: while it runs no window of this driver is created or destroyed
    /// and no native event is pumped. It may call [`on_event`](Self::on_event)
    /// or [`clear_event_handler`](Self::clear_event_handler) on its own window.
    pub fn on_event<F>(&self, handler: F)
    where
        F: FnMut(&B::Event) + Send + 'static,
    {
        self.shared.set_handler(Some(Box::new(handler)));
    }

    /// Detach the event handler
    pub fn clear_event_handler(&self) {
        self.shared.set_handler(None);
    }

    /// Hold the actor's exclusion lock; no frame runs while the guard lives
    ///
    /// Must not be called from inside a frame of the same window.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.shared.exclusion()
    }

    /// Frames drawn so far
    pub fn frames(&self) -> u64 {
        self.shared.frames()
    }

    /// Block until the window reaches `state` (or a later one)
    pub fn wait_for(&self, state: WindowState, timeout: Duration) -> bool {
        self.shared.wait_for(state, timeout)
    }
}
