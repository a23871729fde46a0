//! Native windowing backend contract
//!
//! The driver loop owns exactly one [`Backend`] on its own thread and is the
//! only code that ever calls into it. Each window's rendering context is
//! split off as a [`Surface`] and handed to that window's actor thread, which
//! becomes the only thread touching it. Destruction goes back through the
//! driver.
//!
//! ```text
//!   driver thread                     actor thread (one per window)
//!   ─────────────                     ─────────────────────────────
//!   Backend::create_window ──Surface──► make_current / swap_buffers
//!   Backend::poll_events                should_close / release
//!   Backend::destroy_window ◄── destroy request (posted, never direct)
//! ```

pub mod headless;
#[cfg(feature = "glfw")]
pub mod glfw;
#[cfg(any(feature = "glfw", feature = "sdl2"))]
mod gl_loader;
#[cfg(feature = "sdl2")]
pub mod sdl2;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::foundation::{Position, Size};

pub use headless::{HeadlessBackend, HeadlessControl, HeadlessEvent};

/// Backend-assigned window identifier, used to correlate native events
pub type NativeId = u64;

/// Backend errors
///
/// Every variant is fatal for the resource it concerns; nothing retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The windowing subsystem could not start
    #[error("backend initialization failed: {0}")]
    InitializationFailed(String),

    /// The native window could not be created
    #[error("window creation failed: {0}")]
    WindowCreation(String),

    /// The rendering context could not be made current or loaded
    #[error("context error: {0}")]
    Context(String),
}

/// Windowed or fullscreen presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    /// Decorated, resizable window
    #[default]
    Windowed,
    /// Fullscreen on the primary display
    Fullscreen,
}

/// Everything a backend needs to create one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Title bar text
    pub title: String,
    /// Client-area size; defaults are applied before the backend sees it
    pub size: Size,
    /// Initial position, or wherever the window system chooses
    pub position: Option<Position>,
    /// Presentation mode
    pub mode: WindowMode,
}

/// Description of a context that was just made current
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    /// `GL_VERSION` as reported by the driver, e.g. `OpenGL ES 3.1 Mesa 24.0.5`
    pub version: String,
}

impl fmt::Display for ContextInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Synthetic destruction marker: a window identity and its native sub-identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeMarker {
    /// Process-unique window id
    pub window: u64,
    /// Backend-assigned window id
    pub native: NativeId,
}

/// What the driver loop must do about an event, beyond broadcasting it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing; handlers only
    None,
    /// The user asked the given native window to close
    Close(NativeId),
    /// The user asked every window to close
    QuitAll,
    /// A synthetic wake-up injected through [`Wake::wake`]
    Woken(WakeMarker),
}

/// One polled event: the raw native event plus its meaning to the driver
#[derive(Debug, Clone)]
pub struct BackendEvent<E> {
    /// Raw event delivered to every registered window's handler
    pub raw: E,
    /// Lifecycle signal carried by the event
    pub signal: Signal,
}

impl<E> BackendEvent<E> {
    /// Event with no lifecycle meaning
    pub const fn plain(raw: E) -> Self {
        Self {
            raw,
            signal: Signal::None,
        }
    }
}

/// Explicit wake operation on a backend's event pump
///
/// Callable from any thread. Backends whose poll can block must make the next
/// poll return promptly; backends that never block may treat it as a hint.
pub trait Wake: Send + Sync {
    /// Nudge the event pump, optionally announcing a pending destruction
    fn wake(&self, marker: Option<WakeMarker>);
}

/// Rendering context of one native window, owned by that window's actor thread
pub trait Surface: Send {
    /// Make the context current on the calling thread
    fn make_current(&mut self) -> Result<ContextInfo, BackendError>;

    /// Present the back buffer
    fn swap_buffers(&mut self);

    /// Whether the window system asked this window to close
    fn should_close(&self) -> bool;

    /// Detach the context from the calling thread before destruction
    fn release(&mut self) {}
}

/// Native windowing subsystem, owned by the driver thread
///
/// Instances are produced by a factory closure that runs on the driver thread
/// at every activation; dropping or [`terminate`](Self::terminate)-ing one tears
/// the subsystem down.
pub trait Backend: 'static {
    /// Raw event type broadcast to window event handlers
    type Event: Send + 'static;

    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Create a native window and split off its rendering context
    fn create_window(&mut self, spec: &WindowSpec) -> Result<(NativeId, Box<dyn Surface>), BackendError>;

    /// Destroy a native window; unknown ids are ignored
    fn destroy_window(&mut self, native: NativeId);

    /// Drain every event that is pending right now
    fn poll_events(&mut self) -> Vec<BackendEvent<Self::Event>>;

    /// Handle for waking this backend's event pump from other threads
    fn waker(&self) -> Arc<dyn Wake>;

    /// Shut the subsystem down
    fn terminate(self)
    where
        Self: Sized,
    {
    }
}
