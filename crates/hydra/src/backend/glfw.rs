//! GLFW backend
//!
//! Windows get an OpenGL (ES) context through EGL with the version from
//! [`GlVersion`](crate::config::GlVersion). GLFW polling never blocks, so
//! waking is a no-op here: the driver loop already cycles at least once per
//! idle cap.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::ptr;
use std::sync::Arc;

use ::glfw::{
    Action, ClientApiHint, Context as _, ContextCreationApi, GlfwReceiver, Key, OpenGlProfileHint,
    PRenderContext, PWindow, WindowEvent, WindowHint,
};

use super::{
    gl_loader, Backend, BackendError, BackendEvent, ContextInfo, NativeId, Signal, Surface, Wake,
    WakeMarker, WindowMode, WindowSpec,
};
use crate::config::HydraConfig;

/// Raw GLFW event tagged with the window it was delivered to
#[derive(Debug, Clone)]
pub struct GlfwEvent {
    /// Receiving window
    pub native: NativeId,
    /// Event as reported by GLFW
    pub event: WindowEvent,
}

struct NativeWindow {
    // Dropping the window destroys it.
    _window: PWindow,
    events: GlfwReceiver<(f64, WindowEvent)>,
}

/// [`Backend`] on top of GLFW
pub struct GlfwBackend {
    glfw: ::glfw::Glfw,
    quit_on_escape: bool,
    next_native: NativeId,
    windows: HashMap<NativeId, NativeWindow>,
}

impl GlfwBackend {
    /// Initialize GLFW on the calling thread and install the context hints
    pub fn init(config: &HydraConfig) -> Result<Self, BackendError> {
        let mut glfw = ::glfw::init(::glfw::fail_on_errors)
            .map_err(|err| BackendError::InitializationFailed(format!("GLFW: {err:?}")))?;

        let gl = config.gl;
        glfw.window_hint(WindowHint::ContextCreationApi(ContextCreationApi::Egl));
        glfw.window_hint(WindowHint::ContextVersion(gl.major, gl.minor));
        if gl.core {
            glfw.window_hint(WindowHint::OpenGlProfile(OpenGlProfileHint::Core));
        } else {
            glfw.window_hint(WindowHint::ClientApi(ClientApiHint::OpenGlEs));
            glfw.window_hint(WindowHint::OpenGlProfile(OpenGlProfileHint::Any));
        }

        Ok(Self {
            glfw,
            quit_on_escape: config.quit_on_escape,
            next_native: 0,
            windows: HashMap::new(),
        })
    }

    /// Factory suitable for [`Driver::new`](crate::driver::Driver::new)
    pub fn factory(config: HydraConfig) -> impl Fn() -> Result<Self, BackendError> + Send + Sync + 'static {
        move || Self::init(&config)
    }

    fn translate(&self, native: NativeId, event: WindowEvent) -> BackendEvent<GlfwEvent> {
        let signal = match event {
            WindowEvent::Close => Signal::Close(native),
            WindowEvent::Key(Key::Escape, _, Action::Press, _) if self.quit_on_escape => Signal::QuitAll,
            _ => Signal::None,
        };
        BackendEvent {
            raw: GlfwEvent { native, event },
            signal,
        }
    }
}

impl Backend for GlfwBackend {
    type Event = GlfwEvent;

    fn name(&self) -> &'static str {
        "glfw"
    }

    fn create_window(&mut self, spec: &WindowSpec) -> Result<(NativeId, Box<dyn Surface>), BackendError> {
        let glfw = &mut self.glfw;
        let (width, height) = (spec.size.width, spec.size.height);

        // Positioned windows start hidden so they appear where they belong.
        glfw.window_hint(WindowHint::Visible(spec.position.is_none()));
        let created = match spec.mode {
            WindowMode::Windowed => glfw.create_window(width, height, &spec.title, ::glfw::WindowMode::Windowed),
            WindowMode::Fullscreen => glfw.with_primary_monitor(|glfw, monitor| {
                let mode = monitor.map_or(::glfw::WindowMode::Windowed, |monitor| ::glfw::WindowMode::FullScreen(monitor));
                glfw.create_window(width, height, &spec.title, mode)
            }),
        };
        glfw.window_hint(WindowHint::Visible(true));

        let (mut window, events) =
            created.ok_or_else(|| BackendError::WindowCreation(format!("GLFW refused '{}'", spec.title)))?;
        if let Some(position) = spec.position {
            window.set_pos(position.x, position.y);
            window.show();
        }
        window.set_close_polling(true);
        window.set_key_polling(true);
        window.set_size_polling(true);
        window.set_framebuffer_size_polling(true);

        self.next_native += 1;
        let native = self.next_native;
        let surface = GlfwSurface {
            context: window.render_context(),
        };
        self.windows.insert(native, NativeWindow { _window: window, events });
        Ok((native, Box::new(surface)))
    }

    fn destroy_window(&mut self, native: NativeId) {
        if self.windows.remove(&native).is_none() {
            log::trace!("glfw: window {native} already destroyed");
        }
    }

    fn poll_events(&mut self) -> Vec<BackendEvent<GlfwEvent>> {
        self.glfw.poll_events();
        let mut polled = Vec::new();
        for (native, entry) in &self.windows {
            for (_, event) in ::glfw::flush_messages(&entry.events) {
                polled.push((*native, event));
            }
        }
        polled
            .into_iter()
            .map(|(native, event)| self.translate(native, event))
            .collect()
    }

    fn waker(&self) -> Arc<dyn Wake> {
        Arc::new(GlfwWaker)
    }

    fn terminate(mut self) {
        let remaining = self.windows.len();
        if remaining > 0 {
            log::warn!("glfw: destroying {remaining} windows at termination");
        }
        self.windows.clear();
        // GLFW terminates when the last `Glfw` handle drops.
    }
}

struct GlfwWaker;

impl Wake for GlfwWaker {
    fn wake(&self, marker: Option<WakeMarker>) {
        if let Some(marker) = marker {
            log::trace!("glfw: wake for window [{}.{}]", marker.native, marker.window);
        }
    }
}

/// Entry point lookup for the context current on the calling thread
fn proc_address(name: &'static str) -> *const c_void {
    let Ok(name) = CString::new(name) else {
        return ptr::null();
    };
    // SAFETY: only called from `make_current`, after this thread made its context current.
    unsafe { ::glfw::ffi::glfwGetProcAddress(name.as_ptr()) as *const c_void }
}

struct GlfwSurface {
    context: PRenderContext,
}

impl Surface for GlfwSurface {
    fn make_current(&mut self) -> Result<ContextInfo, BackendError> {
        self.context.make_current();
        if !self.context.is_current() {
            return Err(BackendError::Context("context could not be made current".to_string()));
        }
        gl_loader::load(proc_address)
    }

    fn swap_buffers(&mut self) {
        self.context.swap_buffers();
    }

    fn should_close(&self) -> bool {
        self.context.should_close()
    }

    fn release(&mut self) {
        ::glfw::make_context_current(None);
    }
}
