//! Window actors
//!
//! Every window is an actor: a dedicated OS thread that owns the window's
//! rendering context for its whole life and runs whatever arrives on its
//! synchronization channel.
//!
//! ```text
//!   Created ──► Initialized ──► Running ──► Stopping ──► Destroyed
//!      │             │                          ▲
//!      └─────────────┴── context failure ───────┘
//! ```
//!
//! - **`state`**: lifecycle states and the state shared with the driver
//! - **`actor`**: the actor loop and its exit sequence
//! - **`handle`**: application-facing [`WindowHandle`]

mod actor;
mod handle;
mod state;

pub use handle::WindowHandle;
pub use state::{EventHandler, WindowId, WindowState};

pub(crate) use actor::{request_destroy, Actor, Head};
pub(crate) use state::WindowShared;
