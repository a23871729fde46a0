//! # Hydra
//!
//! Multi-window management where every window is an actor.
//!
//! Native windowing libraries insist that some calls happen on one specific
//! thread, and graphics contexts may only be current on one thread at a time.
//! Hydra gives each concern its own owner:
//!
//! - **Driver**: one thread per backend that creates and destroys native
//!   windows and pumps native events
//! - **Window actors**: one thread per window that keeps its context current
//!   and runs frame callbacks
//! - **Synchronization channels**: the only way other threads get work onto
//!   either of them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hydra::prelude::*;
//! use hydra::backend::headless::HeadlessControl;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HydraConfig::default();
//!     let control = HeadlessControl::new();
//!     let driver = Driver::new(control.factory(), config.clone());
//!     let engine = Engine::new(config.frequency_hz);
//!
//!     let window = driver.create_window(&engine, "main", None, None, always(), false)?;
//!     window.set_impulsable(|ctx: &Context| {
//!         // Render one frame
//!         let _ = ctx.beat;
//!     })?;
//!
//!     engine.spark()?;
//!     while !driver.has_no_windows() {
//!         std::thread::sleep(config.beat_period());
//!     }
//!     engine.stop();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod backend;
pub mod config;
pub mod driver;
pub mod foundation;
pub mod impulse;
pub mod sync;
pub mod window;

/// Common imports for hydra users
pub mod prelude {
    pub use crate::{
        backend::{Backend, BackendError, Surface, Wake, WindowMode, WindowSpec},
        config::{Config, ConfigError, GlVersion, HydraConfig},
        driver::{Driver, DriverError, DriverState, Registry},
        foundation::{Liveness, Position, Size},
        impulse::{always, every, when, Context, Engine, Impulsable, Potential, SystemHandle},
        sync::{channel, Synchro, SynchroError},
        window::{WindowHandle, WindowId, WindowState},
    };
}
