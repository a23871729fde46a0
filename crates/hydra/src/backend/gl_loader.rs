//! OpenGL entry points for native backends
//!
//! Bindings are loaded through the backend's proc-address lookup every time
//! a context becomes current on an actor thread, then `GL_VERSION` is read
//! back from the driver.

#![allow(unsafe_code)]

use std::ffi::{c_void, CStr};

use super::{BackendError, ContextInfo};

/// Load the GL bindings for the context current on this thread and report its version
pub(crate) fn load<F>(lookup: F) -> Result<ContextInfo, BackendError>
where
    F: FnMut(&'static str) -> *const c_void,
{
    gl::load_with(lookup);
    if !gl::GetString::is_loaded() || !gl::Viewport::is_loaded() {
        return Err(BackendError::Context("OpenGL entry points could not be loaded".to_string()));
    }

    // SAFETY: glGetString is loaded and a context is current on this thread.
    let raw = unsafe { gl::GetString(gl::VERSION) };
    if raw.is_null() {
        return Err(BackendError::Context("GL_VERSION is unavailable".to_string()));
    }
    // SAFETY: GL_VERSION is a static NUL-terminated string owned by the GL driver.
    let version = unsafe { CStr::from_ptr(raw.cast()) };
    Ok(ContextInfo {
        version: version.to_string_lossy().into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_points_are_a_context_error() {
        let result = load(|_| std::ptr::null());
        assert!(matches!(result, Err(BackendError::Context(_))));
    }
}
