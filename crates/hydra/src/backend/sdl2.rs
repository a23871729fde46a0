//! SDL2 backend
//!
//! Windows are created on the driver thread with the OpenGL flag. Each
//! window's context is created lazily on its actor thread, the first time
//! the actor makes it current, with vsync on. Wake-ups are pushed into the
//! SDL event queue as custom events, so a destruction request always reaches
//! the next poll.
//!
//! SDL's safe wrappers are confined to the thread that initialized SDL. The
//! per-window GL calls made from actor threads go through `sdl2::sys`.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::ptr;
use std::sync::{Arc, Mutex};

use ::sdl2::event::{Event, EventSender, WindowEvent};
use ::sdl2::keyboard::Keycode;
use ::sdl2::video::{GLProfile, Window};
use ::sdl2::{sys, EventPump, EventSubsystem, Sdl, VideoSubsystem};

use super::{
    gl_loader, Backend, BackendError, BackendEvent, ContextInfo, NativeId, Signal, Surface, Wake,
    WakeMarker, WindowMode, WindowSpec,
};
use crate::config::HydraConfig;
use crate::sync::lock;

/// Raw SDL event as delivered to window handlers
#[derive(Debug, Clone, PartialEq)]
pub enum SdlEvent {
    /// Window manager event for one window
    Window {
        /// SDL window id
        native: NativeId,
        /// What happened
        event: WindowEvent,
    },
    /// Key pressed
    KeyDown {
        /// Window with keyboard focus
        native: NativeId,
        /// Virtual key, if SDL could map it
        keycode: Option<Keycode>,
        /// Auto-repeat
        repeat: bool,
    },
    /// Key released
    KeyUp {
        /// Window with keyboard focus
        native: NativeId,
        /// Virtual key, if SDL could map it
        keycode: Option<Keycode>,
    },
    /// Pointer moved inside a window
    MouseMotion {
        /// Window under the pointer
        native: NativeId,
        /// Horizontal position in window coordinates
        x: i32,
        /// Vertical position in window coordinates
        y: i32,
    },
    /// The application was asked to quit
    Quit,
    /// Wake-up pushed through the backend's waker
    Wake(Option<WakeMarker>),
    /// Any other event, in SDL's debug notation
    Other(String),
}

/// Payload of the custom event pushed by [`SdlWaker`]
struct WakeEvent(Option<WakeMarker>);

struct NativeWindow {
    window: Window,
    // False once the native window is gone; surfaces check it under the lock.
    valid: Arc<Mutex<bool>>,
}

/// [`Backend`] on top of SDL2
pub struct SdlBackend {
    // Windows drop before the subsystems they belong to.
    windows: HashMap<NativeId, NativeWindow>,
    pump: EventPump,
    events: EventSubsystem,
    video: VideoSubsystem,
    _sdl: Sdl,
    quit_on_escape: bool,
}

fn init_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::InitializationFailed(format!("SDL: {err}"))
}

impl SdlBackend {
    /// Initialize SDL video on the calling thread and set the context attributes
    pub fn init(config: &HydraConfig) -> Result<Self, BackendError> {
        let sdl = ::sdl2::init().map_err(init_error)?;
        let video = sdl.video().map_err(init_error)?;
        let events = sdl.event().map_err(init_error)?;

        let gl = config.gl;
        let attributes = video.gl_attr();
        attributes.set_context_version(
            u8::try_from(gl.major).unwrap_or(u8::MAX),
            u8::try_from(gl.minor).unwrap_or(u8::MAX),
        );
        attributes.set_context_profile(if gl.core { GLProfile::Core } else { GLProfile::GLES });
        attributes.set_double_buffer(true);
        attributes.set_depth_size(24);

        events.register_custom_event::<WakeEvent>().map_err(init_error)?;
        let pump = sdl.event_pump().map_err(init_error)?;
        log::debug!("sdl2: video driver {}", video.current_video_driver());

        Ok(Self {
            windows: HashMap::new(),
            pump,
            events,
            video,
            _sdl: sdl,
            quit_on_escape: config.quit_on_escape,
        })
    }

    /// Factory suitable for [`Driver::new`](crate::driver::Driver::new)
    pub fn factory(config: HydraConfig) -> impl Fn() -> Result<Self, BackendError> + Send + Sync + 'static {
        move || Self::init(&config)
    }
}

/// Map an SDL event to its handler form and driver signal
fn translate(event: Event, quit_on_escape: bool) -> BackendEvent<SdlEvent> {
    let (raw, signal) = match event {
        Event::Window { window_id, win_event, .. } => {
            let native = NativeId::from(window_id);
            let signal = if win_event == WindowEvent::Close {
                Signal::Close(native)
            } else {
                Signal::None
            };
            (SdlEvent::Window { native, event: win_event }, signal)
        }
        Event::KeyDown {
            window_id,
            keycode,
            repeat,
            ..
        } => {
            let signal = if keycode == Some(Keycode::Escape) && quit_on_escape {
                Signal::QuitAll
            } else {
                Signal::None
            };
            let native = NativeId::from(window_id);
            (SdlEvent::KeyDown { native, keycode, repeat }, signal)
        }
        Event::KeyUp { window_id, keycode, .. } => (
            SdlEvent::KeyUp {
                native: NativeId::from(window_id),
                keycode,
            },
            Signal::None,
        ),
        Event::MouseMotion { window_id, x, y, .. } => (
            SdlEvent::MouseMotion {
                native: NativeId::from(window_id),
                x,
                y,
            },
            Signal::None,
        ),
        Event::Quit { .. } => (SdlEvent::Quit, Signal::None),
        other => match other.as_user_event_type::<WakeEvent>() {
            Some(WakeEvent(marker)) => (SdlEvent::Wake(marker), marker.map_or(Signal::None, Signal::Woken)),
            None => (SdlEvent::Other(format!("{other:?}")), Signal::None),
        },
    };
    BackendEvent { raw, signal }
}

impl Backend for SdlBackend {
    type Event = SdlEvent;

    fn name(&self) -> &'static str {
        "sdl2"
    }

    fn create_window(&mut self, spec: &WindowSpec) -> Result<(NativeId, Box<dyn Surface>), BackendError> {
        let mut builder = self.video.window(&spec.title, spec.size.width, spec.size.height);
        builder.opengl().resizable();
        match (spec.mode, spec.position) {
            (WindowMode::Fullscreen, _) => {
                builder.fullscreen_desktop();
            }
            (WindowMode::Windowed, Some(position)) => {
                builder.position(position.x, position.y);
            }
            (WindowMode::Windowed, None) => {}
        }
        let window = builder
            .build()
            .map_err(|err| BackendError::WindowCreation(format!("SDL refused '{}': {err}", spec.title)))?;

        let native = NativeId::from(window.id());
        let valid = Arc::new(Mutex::new(true));
        let surface = SdlSurface {
            window: window.raw(),
            context: ptr::null_mut(),
            valid: Arc::clone(&valid),
        };
        self.windows.insert(native, NativeWindow { window, valid });
        Ok((native, Box::new(surface)))
    }

    fn destroy_window(&mut self, native: NativeId) {
        match self.windows.remove(&native) {
            Some(entry) => {
                let mut valid = lock(&entry.valid);
                *valid = false;
                drop(entry.window);
            }
            None => log::trace!("sdl2: window {native} already destroyed"),
        }
    }

    fn poll_events(&mut self) -> Vec<BackendEvent<SdlEvent>> {
        let polled: Vec<Event> = self.pump.poll_iter().collect();
        polled
            .into_iter()
            .map(|event| translate(event, self.quit_on_escape))
            .collect()
    }

    fn waker(&self) -> Arc<dyn Wake> {
        Arc::new(SdlWaker {
            sender: self.events.event_sender(),
        })
    }

    fn terminate(mut self) {
        let natives: Vec<NativeId> = self.windows.keys().copied().collect();
        if !natives.is_empty() {
            log::warn!("sdl2: destroying {} windows at termination", natives.len());
        }
        for native in natives {
            self.destroy_window(native);
        }
        // SDL quits when the last subsystem handle drops.
    }
}

struct SdlWaker {
    sender: EventSender,
}

impl Wake for SdlWaker {
    fn wake(&self, marker: Option<WakeMarker>) {
        if let Err(err) = self.sender.push_custom_event(WakeEvent(marker)) {
            log::trace!("sdl2: wake not delivered: {err}");
        }
    }
}

/// Entry point lookup for the context current on the calling thread
fn proc_address(name: &'static str) -> *const c_void {
    let Ok(name) = CString::new(name) else {
        return ptr::null();
    };
    // SAFETY: `name` is NUL-terminated and outlives the call.
    unsafe { sys::SDL_GL_GetProcAddress(name.as_ptr()) as *const c_void }
}

/// GL context of one SDL window, driven from the window's actor thread
struct SdlSurface {
    window: *mut sys::SDL_Window,
    context: sys::SDL_GLContext,
    valid: Arc<Mutex<bool>>,
}

// SAFETY: the pointers are only dereferenced by SDL while `valid` is locked and
// true, and the destroying side flips it under the same lock. The context is
// created, used and deleted on the single actor thread that owns the surface.
unsafe impl Send for SdlSurface {}

impl Surface for SdlSurface {
    fn make_current(&mut self) -> Result<ContextInfo, BackendError> {
        let valid = lock(&self.valid);
        if !*valid {
            return Err(BackendError::Context("window is already destroyed".to_string()));
        }
        if self.context.is_null() {
            // SAFETY: the window is alive while `valid` is held.
            self.context = unsafe { sys::SDL_GL_CreateContext(self.window) };
            if self.context.is_null() {
                return Err(BackendError::Context(::sdl2::get_error()));
            }
        }
        // SAFETY: both handles are alive while `valid` is held.
        if unsafe { sys::SDL_GL_MakeCurrent(self.window, self.context) } != 0 {
            return Err(BackendError::Context(::sdl2::get_error()));
        }
        // SAFETY: a context is current on this thread.
        if unsafe { sys::SDL_GL_SetSwapInterval(1) } != 0 {
            log::debug!("sdl2: vsync unavailable: {}", ::sdl2::get_error());
        }
        drop(valid);
        gl_loader::load(proc_address)
    }

    fn swap_buffers(&mut self) {
        let valid = lock(&self.valid);
        if *valid && !self.context.is_null() {
            // SAFETY: the window is alive while `valid` is held.
            unsafe { sys::SDL_GL_SwapWindow(self.window) };
        }
    }

    fn should_close(&self) -> bool {
        // Close requests arrive as window events and stop the actor through the driver.
        false
    }

    fn release(&mut self) {
        if self.context.is_null() {
            return;
        }
        let valid = lock(&self.valid);
        // SAFETY: the context was created on this thread and is deleted once.
        unsafe {
            if *valid {
                sys::SDL_GL_MakeCurrent(self.window, ptr::null_mut());
            }
            sys::SDL_GL_DeleteContext(self.context);
        }
        self.context = ptr::null_mut();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_close_signals_that_window() {
        let event = Event::Window {
            timestamp: 0,
            window_id: 7,
            win_event: WindowEvent::Close,
        };
        let translated = translate(event, true);
        assert_eq!(translated.signal, Signal::Close(7));
        assert_eq!(
            translated.raw,
            SdlEvent::Window {
                native: 7,
                event: WindowEvent::Close
            }
        );
    }

    #[test]
    fn test_other_window_events_carry_no_signal() {
        let event = Event::Window {
            timestamp: 0,
            window_id: 7,
            win_event: WindowEvent::Resized(800, 600),
        };
        assert_eq!(translate(event, true).signal, Signal::None);
        assert_eq!(translate(Event::Quit { timestamp: 0 }, true).raw, SdlEvent::Quit);
    }
}
