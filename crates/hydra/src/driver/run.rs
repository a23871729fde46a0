//! Driver loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::Sender;

use super::{DriverInner, DriverState};
use crate::backend::{Backend, BackendError, BackendEvent, Signal, Wake};
use crate::sync::{Engager, SynchroToken};

type Handoff = Sender<Result<Arc<dyn Wake>, BackendError>>;

/// Body of the driver thread for one session
pub(super) fn drive<B: Backend>(
    inner: &Arc<DriverInner<B>>,
    token: SynchroToken<B>,
    running: &AtomicBool,
    live: &AtomicBool,
    handoff: &Handoff,
) {
    let mut engager = token.bind();
    let mut backend = match (inner.factory)() {
        Ok(backend) => backend,
        Err(err) => {
            log::error!("backend initialization failed: {err}");
            live.store(false, Ordering::Release);
            running.store(false, Ordering::Release);
            inner.set_state(DriverState::Inactive);
            let _ = handoff.send(Err(err));
            return;
        }
    };

    log::info!("{} backend initialized", backend.name());
    inner.set_state(DriverState::Running);
    let _ = handoff.send(Ok(backend.waker()));

    let idle_cap = inner.config.idle_cap();
    while running.load(Ordering::Acquire) && inner.liveness.is_alive() {
        if engager.engage_timeout(&mut backend, idle_cap).is_err() {
            break;
        }
        for event in backend.poll_events() {
            dispatch(inner, event);
        }
    }

    live.store(false, Ordering::Release);
    running.store(false, Ordering::Release);
    inner.set_state(DriverState::Draining);
    drain(inner, &mut engager, &mut backend);

    // Destroy requests arriving from now on take the fallback path.
    drop(engager);
    log::info!("{} backend terminating", backend.name());
    backend.terminate();
    inner.registry.clear();
    inner.set_state(DriverState::Inactive);
}

fn dispatch<B: Backend>(inner: &DriverInner<B>, event: BackendEvent<B::Event>) {
    inner.registry.broadcast(&event.raw);
    match event.signal {
        Signal::None => {}
        Signal::Close(native) => {
            if let Some(window) = inner.registry.find_native(native) {
                log::info!("window {} close requested", window.label());
                window.stop();
                window.nudge();
            }
        }
        Signal::QuitAll => {
            let windows = inner.registry.snapshot();
            log::info!("quit requested, stopping {} windows", windows.len());
            for window in windows {
                window.stop();
                window.nudge();
            }
        }
        Signal::Woken(marker) => log::trace!("woken by window [{}.{}]", marker.native, marker.window),
    }
}

/// Stop every remaining window and serve their destroy requests
fn drain<B: Backend>(inner: &DriverInner<B>, engager: &mut Engager<B>, backend: &mut B) {
    let windows = inner.registry.snapshot();
    if windows.is_empty() {
        // Requests posted by windows that already left the registry.
        while engager.engage_once(backend) {}
        return;
    }

    log::info!("draining {} windows", windows.len());
    for window in &windows {
        window.stop();
        window.nudge();
    }

    let idle_cap = inner.config.idle_cap();
    let deadline = Instant::now() + inner.config.drain_timeout();
    while !inner.registry.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::warn!("{} windows still registered after drain timeout", inner.registry.len());
            break;
        }
        if engager.engage_timeout(backend, idle_cap.min(remaining)).is_err() {
            break;
        }
        for event in backend.poll_events() {
            dispatch(inner, event);
        }
    }
    while engager.engage_once(backend) {}
}
