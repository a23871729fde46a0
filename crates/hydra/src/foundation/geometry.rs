//! Window geometry

use serde::{Deserialize, Serialize};

/// Window client-area size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Size {
    /// Create a new size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Size {
    /// 640x480, used whenever a window is created without an explicit size
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// Window position in screen coordinates (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset
    pub x: i32,
    /// Vertical offset
    pub y: i32,
}

impl Position {
    /// Create a new position
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}
