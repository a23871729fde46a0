//! Hydra demo application
//!
//! Opens two windows driven by one impulse engine, logs their frame rates and
//! exits once every window has closed. Runs headless by default (the windows
//! are closed by a script); build with `--features glfw` or `--features sdl2`
//! for real windows and close them by hand or with Escape.
//!
//! Usage: `hydra_demo [config.toml|config.ron]`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use hydra::foundation::logging;
use hydra::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("window setup: {0}")]
    Synchro(#[from] SynchroError),

    #[error("engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Stand-in renderer: counts the frames it was asked to draw
struct Pulse {
    title: String,
    frames: Arc<AtomicU64>,
}

impl Impulsable for Pulse {
    fn initialize(&mut self) {
        log::info!("{} ready", self.title);
    }

    fn impulse(&mut self, _ctx: &Context) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    fn cleanup(&mut self) {
        log::info!("{} drew {} frames", self.title, self.frames.load(Ordering::Relaxed));
    }
}

fn run<B: Backend>(
    driver: &Driver<B>,
    config: &HydraConfig,
    script: impl FnOnce(&[WindowHandle<B>]),
) -> Result<(), DemoError> {
    let engine = Engine::new(config.frequency_hz);
    let layout = [
        ("hydra - left", Position::new(100, 100)),
        ("hydra - right", Position::new(800, 100)),
    ];

    let mut windows = Vec::new();
    let mut counters = Vec::new();
    for (title, position) in layout {
        let window = driver.create_window(&engine, title, None, Some(position), always(), false)?;
        let frames = Arc::new(AtomicU64::new(0));
        window.set_impulsable(Pulse {
            title: title.to_string(),
            frames: Arc::clone(&frames),
        })?;
        counters.push((title, frames, 0_u64));
        windows.push(window);
    }

    // Once a second, report how many frames each window drew since the last report.
    engine.add_system(every(u64::from(config.frequency_hz)), false, move |_ctx: &Context| {
        for (title, frames, last) in &mut counters {
            let now = frames.load(Ordering::Relaxed);
            log::info!("{title}: {} fps", now - *last);
            *last = now;
        }
    })?;

    engine.spark()?;
    script(&windows);

    while !driver.has_no_windows() {
        thread::sleep(config.beat_period());
    }
    engine.stop();
    driver.join();
    Ok(())
}

#[cfg(not(any(feature = "glfw", feature = "sdl2")))]
fn launch(config: &HydraConfig) -> Result<(), DemoError> {
    use std::time::Duration;

    use hydra::backend::{HeadlessBackend, HeadlessControl, HeadlessEvent};

    let control = HeadlessControl::new();
    let driver = Driver::new(control.factory(), config.clone());
    run(&driver, config, |windows: &[WindowHandle<HeadlessBackend>]| {
        let first = windows.first().map(WindowHandle::native_id);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(2));
            if let Some(native) = first {
                log::info!("closing window {native}");
                control.close(native);
            }
            thread::sleep(Duration::from_secs(1));
            log::info!("quitting");
            control.push(HeadlessEvent::QuitAll);
        });
    })
}

#[cfg(feature = "glfw")]
fn launch(config: &HydraConfig) -> Result<(), DemoError> {
    use hydra::backend::glfw::GlfwBackend;

    let driver = Driver::new(GlfwBackend::factory(config.clone()), config.clone());
    run(&driver, config, |_| log::info!("close the windows (or press Escape) to exit"))
}

#[cfg(all(feature = "sdl2", not(feature = "glfw")))]
fn launch(config: &HydraConfig) -> Result<(), DemoError> {
    use hydra::backend::sdl2::SdlBackend;

    let driver = Driver::new(SdlBackend::factory(config.clone()), config.clone());
    run(&driver, config, |_| log::info!("close the windows (or press Escape) to exit"))
}

fn main() -> Result<(), DemoError> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => HydraConfig::load_from_file(&path)?,
        None => HydraConfig::default(),
    };
    log::info!("starting hydra demo at {} Hz", config.frequency_hz);

    launch(&config)?;
    log::info!("all windows closed");
    Ok(())
}
