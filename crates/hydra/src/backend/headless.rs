//! Headless backend
//!
//! A display-free backend for CI machines, servers and tests. Windows are
//! bookkeeping entries, buffer swaps are counters and events come from a
//! scripted queue fed through [`HeadlessControl`]. Every entry point checks
//! that it is called from the thread that is supposed to own it and counts
//! violations, so affinity bugs show up as numbers instead of crashes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use super::{
    Backend, BackendError, BackendEvent, ContextInfo, NativeId, Signal, Surface, Wake, WakeMarker,
    WindowSpec,
};
use crate::sync::lock;

/// Scripted native event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessEvent {
    /// The user clicked the close button of a window
    Close(NativeId),
    /// The user asked to quit everything
    QuitAll,
    /// Arbitrary input addressed to a window
    Input {
        /// Target window
        native: NativeId,
        /// Opaque payload
        payload: String,
    },
    /// Synthetic wake-up injected through [`Wake::wake`]
    Wake(Option<WakeMarker>),
}

#[derive(Debug, Default)]
struct SurfaceState {
    swaps: AtomicU64,
    should_close: AtomicBool,
    destroyed: AtomicBool,
    current: Mutex<Option<ThreadId>>,
}

#[derive(Debug, Default)]
struct ControlState {
    inits: AtomicUsize,
    terminates: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    wakes: AtomicUsize,
    violations: AtomicUsize,
    fail_init: AtomicBool,
    fail_context: AtomicBool,
    fail_window: AtomicBool,
    queue: Mutex<VecDeque<HeadlessEvent>>,
    markers: Mutex<Vec<WakeMarker>>,
    surfaces: Mutex<HashMap<NativeId, Arc<SurfaceState>>>,
    specs: Mutex<HashMap<NativeId, WindowSpec>>,
    destroyed_on: Mutex<Vec<ThreadId>>,
}

/// Remote control and inspection handle for headless backends
///
/// Cheap to clone; every backend built from [`factory`](Self::factory) reports
/// into the same counters.
#[derive(Debug, Clone, Default)]
pub struct HeadlessControl {
    state: Arc<ControlState>,
}

impl HeadlessControl {
    /// Create a fresh control handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory suitable for [`Driver::new`](crate::driver::Driver::new)
    pub fn factory(&self) -> impl Fn() -> Result<HeadlessBackend, BackendError> + Send + Sync + 'static {
        let control = self.clone();
        move || HeadlessBackend::start(control.clone())
    }

    /// Queue a raw event for the next poll
    pub fn push(&self, event: HeadlessEvent) {
        lock(&self.state.queue).push_back(event);
    }

    /// Queue a close-button event for a window
    pub fn close(&self, native: NativeId) {
        self.push(HeadlessEvent::Close(native));
    }

    /// Raise the window-system close flag that the window's own loop polls
    pub fn request_close(&self, native: NativeId) {
        if let Some(surface) = lock(&self.state.surfaces).get(&native) {
            surface.should_close.store(true, Ordering::Release);
        }
    }

    /// Make the next backend start fail
    pub fn fail_next_init(&self) {
        self.state.fail_init.store(true, Ordering::Release);
    }

    /// Make the next `make_current` fail
    pub fn fail_next_context(&self) {
        self.state.fail_context.store(true, Ordering::Release);
    }

    /// Make the next window creation fail
    pub fn fail_next_window(&self) {
        self.state.fail_window.store(true, Ordering::Release);
    }

    /// Number of successful backend starts
    pub fn init_count(&self) -> usize {
        self.state.inits.load(Ordering::Acquire)
    }

    /// Number of backend shutdowns
    pub fn terminate_count(&self) -> usize {
        self.state.terminates.load(Ordering::Acquire)
    }

    /// Number of windows created
    pub fn created_count(&self) -> usize {
        self.state.created.load(Ordering::Acquire)
    }

    /// Number of windows destroyed
    pub fn destroyed_count(&self) -> usize {
        self.state.destroyed.load(Ordering::Acquire)
    }

    /// Number of wake-ups requested
    pub fn wake_count(&self) -> usize {
        self.state.wakes.load(Ordering::Acquire)
    }

    /// Destruction markers received through wake-ups, in arrival order
    pub fn wake_markers(&self) -> Vec<WakeMarker> {
        lock(&self.state.markers).clone()
    }

    /// Calls made from a thread that does not own the resource
    pub fn affinity_violations(&self) -> usize {
        self.state.violations.load(Ordering::Acquire)
    }

    /// Buffer swaps performed by a window
    pub fn swaps(&self, native: NativeId) -> u64 {
        lock(&self.state.surfaces)
            .get(&native)
            .map_or(0, |surface| surface.swaps.load(Ordering::Acquire))
    }

    /// Spec a window was created with
    pub fn spec_of(&self, native: NativeId) -> Option<WindowSpec> {
        lock(&self.state.specs).get(&native).cloned()
    }

    /// Whether a window has been destroyed
    pub fn is_destroyed(&self, native: NativeId) -> bool {
        lock(&self.state.surfaces)
            .get(&native)
            .is_some_and(|surface| surface.destroyed.load(Ordering::Acquire))
    }

    /// Threads that destroyed windows, in destruction order
    pub fn destroyed_on(&self) -> Vec<ThreadId> {
        lock(&self.state.destroyed_on).clone()
    }

    fn violation(&self, what: &str) {
        log::error!("headless: {what} called from a thread that does not own it");
        self.state.violations.fetch_add(1, Ordering::AcqRel);
    }
}

/// Display-free [`Backend`]
pub struct HeadlessBackend {
    control: HeadlessControl,
    owner: ThreadId,
    next_native: NativeId,
    live: HashSet<NativeId>,
}

impl HeadlessBackend {
    /// Start a backend on the calling thread
    pub fn start(control: HeadlessControl) -> Result<Self, BackendError> {
        if control.state.fail_init.swap(false, Ordering::AcqRel) {
            return Err(BackendError::InitializationFailed("scripted failure".to_string()));
        }
        control.state.inits.fetch_add(1, Ordering::AcqRel);

        Ok(Self {
            control,
            owner: thread::current().id(),
            next_native: 0,
            live: HashSet::new(),
        })
    }

    fn check_owner(&self, what: &str) {
        if thread::current().id() != self.owner {
            self.control.violation(what);
        }
    }
}

impl Backend for HeadlessBackend {
    type Event = HeadlessEvent;

    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_window(&mut self, spec: &WindowSpec) -> Result<(NativeId, Box<dyn Surface>), BackendError> {
        self.check_owner("create_window");
        if self.control.state.fail_window.swap(false, Ordering::AcqRel) {
            return Err(BackendError::WindowCreation(format!("scripted failure for '{}'", spec.title)));
        }

        self.next_native += 1;
        let native = self.next_native;
        let state = Arc::new(SurfaceState::default());
        lock(&self.control.state.surfaces).insert(native, Arc::clone(&state));
        lock(&self.control.state.specs).insert(native, spec.clone());
        self.live.insert(native);
        self.control.state.created.fetch_add(1, Ordering::AcqRel);

        log::trace!(
            "headless: created window {native} '{}' {}x{}",
            spec.title,
            spec.size.width,
            spec.size.height
        );
        Ok((
            native,
            Box::new(HeadlessSurface {
                native,
                state,
                control: self.control.clone(),
            }),
        ))
    }

    fn destroy_window(&mut self, native: NativeId) {
        self.check_owner("destroy_window");
        if !self.live.remove(&native) {
            return;
        }
        if let Some(surface) = lock(&self.control.state.surfaces).get(&native) {
            surface.destroyed.store(true, Ordering::Release);
        }
        lock(&self.control.state.destroyed_on).push(thread::current().id());
        self.control.state.destroyed.fetch_add(1, Ordering::AcqRel);
    }

    fn poll_events(&mut self) -> Vec<BackendEvent<HeadlessEvent>> {
        self.check_owner("poll_events");
        lock(&self.control.state.queue)
            .drain(..)
            .map(|raw| {
                let signal = match &raw {
                    HeadlessEvent::Close(native) => Signal::Close(*native),
                    HeadlessEvent::QuitAll => Signal::QuitAll,
                    HeadlessEvent::Wake(Some(marker)) => Signal::Woken(*marker),
                    HeadlessEvent::Input { .. } | HeadlessEvent::Wake(None) => Signal::None,
                };
                BackendEvent { raw, signal }
            })
            .collect()
    }

    fn waker(&self) -> Arc<dyn Wake> {
        Arc::new(HeadlessWaker {
            control: self.control.clone(),
        })
    }

    fn terminate(mut self) {
        self.check_owner("terminate");
        let remaining: Vec<_> = self.live.iter().copied().collect();
        for native in remaining {
            self.destroy_window(native);
        }
        self.control.state.terminates.fetch_add(1, Ordering::AcqRel);
    }
}

struct HeadlessWaker {
    control: HeadlessControl,
}

impl Wake for HeadlessWaker {
    fn wake(&self, marker: Option<WakeMarker>) {
        self.control.state.wakes.fetch_add(1, Ordering::AcqRel);
        if let Some(marker) = marker {
            lock(&self.control.state.markers).push(marker);
        }
        self.control.push(HeadlessEvent::Wake(marker));
    }
}

struct HeadlessSurface {
    native: NativeId,
    state: Arc<SurfaceState>,
    control: HeadlessControl,
}

impl Surface for HeadlessSurface {
    fn make_current(&mut self) -> Result<ContextInfo, BackendError> {
        if self.control.state.fail_context.swap(false, Ordering::AcqRel) {
            return Err(BackendError::Context(format!("scripted failure for window {}", self.native)));
        }
        *lock(&self.state.current) = Some(thread::current().id());
        Ok(ContextInfo {
            version: "headless 1.0".to_string(),
        })
    }

    fn swap_buffers(&mut self) {
        let current = *lock(&self.state.current);
        if current != Some(thread::current().id()) || self.state.destroyed.load(Ordering::Acquire) {
            self.control.violation("swap_buffers");
        }
        self.state.swaps.fetch_add(1, Ordering::AcqRel);
    }

    fn should_close(&self) -> bool {
        self.state.should_close.load(Ordering::Acquire)
    }

    fn release(&mut self) {
        *lock(&self.state.current) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::Size;

    fn spec(title: &str) -> WindowSpec {
        WindowSpec {
            title: title.to_string(),
            size: Size::default(),
            position: None,
            mode: crate::backend::WindowMode::Windowed,
        }
    }

    #[test]
    fn test_scripted_events_carry_signals() {
        let control = HeadlessControl::new();
        let mut backend = HeadlessBackend::start(control.clone()).unwrap();
        let (native, _surface) = backend.create_window(&spec("a")).unwrap();

        control.close(native);
        control.push(HeadlessEvent::QuitAll);
        control.push(HeadlessEvent::Input { native, payload: "key".to_string() });

        let signals: Vec<_> = backend.poll_events().into_iter().map(|e| e.signal).collect();
        assert_eq!(signals, vec![Signal::Close(native), Signal::QuitAll, Signal::None]);
        assert!(backend.poll_events().is_empty());
    }

    #[test]
    fn test_wake_injects_marker_event() {
        let control = HeadlessControl::new();
        let mut backend = HeadlessBackend::start(control.clone()).unwrap();
        let marker = WakeMarker { window: 7, native: 3 };

        backend.waker().wake(Some(marker));

        assert_eq!(control.wake_count(), 1);
        assert_eq!(control.wake_markers(), vec![marker]);
        let events = backend.poll_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signal, Signal::Woken(marker));
    }

    #[test]
    fn test_swap_from_foreign_thread_is_a_violation() {
        let control = HeadlessControl::new();
        let mut backend = HeadlessBackend::start(control.clone()).unwrap();
        let (native, mut surface) = backend.create_window(&spec("a")).unwrap();

        surface.make_current().unwrap();
        surface.swap_buffers();
        assert_eq!(control.affinity_violations(), 0);

        thread::spawn(move || surface.swap_buffers()).join().unwrap();
        assert_eq!(control.affinity_violations(), 1);
        assert_eq!(control.swaps(native), 2);
    }

    #[test]
    fn test_terminate_destroys_remaining_windows() {
        let control = HeadlessControl::new();
        let mut backend = HeadlessBackend::start(control.clone()).unwrap();
        let (first, _a) = backend.create_window(&spec("a")).unwrap();
        let (second, _b) = backend.create_window(&spec("b")).unwrap();
        assert_ne!(first, second);

        backend.destroy_window(first);
        backend.destroy_window(first);
        assert_eq!(control.destroyed_count(), 1);

        backend.terminate();
        assert_eq!(control.destroyed_count(), 2);
        assert!(control.is_destroyed(second));
        assert_eq!(control.terminate_count(), 1);
    }

    #[test]
    fn test_scripted_failures_fire_once() {
        let control = HeadlessControl::new();
        control.fail_next_init();
        assert!(HeadlessBackend::start(control.clone()).is_err());

        let mut backend = HeadlessBackend::start(control.clone()).unwrap();
        control.fail_next_window();
        assert!(matches!(backend.create_window(&spec("x")), Err(BackendError::WindowCreation(_))));
        assert!(backend.create_window(&spec("x")).is_ok());
        assert_eq!(control.init_count(), 1);
    }
}
