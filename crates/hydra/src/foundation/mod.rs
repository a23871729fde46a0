//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Process-unique identifiers
//! - Liveness flags
//! - Window geometry
//! - Logging utilities

pub mod ids;
pub mod liveness;
pub mod geometry;
pub mod logging;

pub use geometry::{Position, Size};
pub use ids::next_id;
pub use liveness::Liveness;
