//! Capture-render loop.
//!
//! A dedicated thread grabs the capture region, rescales it to the display
//! size, converts it to RGB and hands it to the frame slot, pacing itself
//! with an [`FpsController`]. The loop is cancelled cooperatively through a
//! running flag checked at the top of every iteration.

use crate::capture::{CaptureError, ScreenSource, SourceFactory};
use crate::config::{Interpolation, MagnifierConfig};
use crate::fps::FpsController;
use crate::frame::{Frame, FrameSender};
use crate::gpu::{probe_scaler, GpuScaler};
use crate::monitor::{CaptureRegion, MonitorLayout};
use crate::resample::{resize_cpu, strip_alpha, to_display_order};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long `stop` waits for the capture thread before abandoning it
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Immutable parameters of one loop instance
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub capture_size: u32,
    pub display_size: u32,
    pub target_fps: u32,
    pub interpolation: Interpolation,
    pub monitor_index: u32,
    pub use_gpu: bool,
}

impl From<&MagnifierConfig> for LoopSettings {
    fn from(config: &MagnifierConfig) -> Self {
        LoopSettings {
            capture_size: config.capture_size.max(1),
            display_size: config.display_size.max(1),
            target_fps: config.target_fps.max(1),
            interpolation: config.interpolation,
            monitor_index: config.monitor_index,
            use_gpu: config.use_gpu,
        }
    }
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    /// Disconnects when the thread exits
    exited: Receiver<()>,
}

pub struct CaptureLoop {
    settings: LoopSettings,
    region: CaptureRegion,
    source_factory: SourceFactory,
    sink: FrameSender,
    worker: Option<Worker>,
}

impl CaptureLoop {
    /// Derive the capture region from the layout. A missing monitor index
    /// falls back to monitor 1; an empty layout is an error.
    pub fn new(
        settings: LoopSettings,
        layout: &MonitorLayout,
        source_factory: SourceFactory,
        sink: FrameSender,
    ) -> Result<Self, CaptureError> {
        let monitor = layout
            .resolve(settings.monitor_index)
            .ok_or(CaptureError::NoMonitor)?;
        let region = CaptureRegion::centered(&monitor, settings.capture_size);

        info!(
            "Capture region {}x{} at ({}, {}) on monitor {:?}",
            region.width, region.height, region.left, region.top, monitor
        );

        Ok(Self {
            settings,
            region,
            source_factory,
            sink,
            worker: None,
        })
    }

    pub fn region(&self) -> CaptureRegion {
        self.region
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn state(&self) -> LoopState {
        match &self.worker {
            Some(worker) if !worker.handle.is_finished() => LoopState::Running,
            _ => LoopState::Stopped,
        }
    }

    /// Spawn the capture thread unless one is already running.
    /// Returns whether a new thread was started.
    pub fn start(&mut self) -> std::io::Result<bool> {
        if self.state() == LoopState::Running {
            return Ok(false);
        }
        // Reap a thread that ended on its own
        if let Some(dead) = self.worker.take() {
            let _ = dead.handle.join();
        }

        let running = Arc::new(AtomicBool::new(true));
        let (exited_tx, exited) = bounded::<()>(0);

        let ctx = WorkerContext {
            settings: self.settings.clone(),
            region: self.region,
            source_factory: Arc::clone(&self.source_factory),
            sink: self.sink.clone(),
            running: Arc::clone(&running),
        };

        let handle = thread::Builder::new()
            .name("magnifier-capture".to_string())
            .spawn(move || {
                let _exit_guard = exited_tx;
                ctx.run();
            })?;

        self.worker = Some(Worker {
            running,
            handle,
            exited,
        });
        info!("Capture loop started");
        Ok(true)
    }

    /// Signal the thread to exit and wait up to [`STOP_TIMEOUT`] for it
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.running.store(false, Ordering::Release);

        match worker.exited.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Capture thread panicked");
                }
                info!("Capture loop stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture thread did not exit within {:?}, abandoning it",
                    STOP_TIMEOUT
                );
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    settings: LoopSettings,
    region: CaptureRegion,
    source_factory: SourceFactory,
    sink: FrameSender,
    running: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run(self) {
        let mut source = match (self.source_factory)() {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to open screen source: {}", e);
                return;
            }
        };

        let mut gpu = if self.settings.use_gpu {
            match probe_scaler(
                (self.region.width, self.region.height),
                self.settings.display_size,
                self.settings.interpolation,
            ) {
                Ok(scaler) => {
                    info!("GPU scaling enabled");
                    Some(scaler)
                }
                Err(e) => {
                    info!("GPU scaling unavailable, using CPU: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut fps = FpsController::new(self.settings.target_fps);

        while self.running.load(Ordering::Acquire) {
            let started = Instant::now();

            let frame = match render_frame(
                source.as_mut(),
                &self.region,
                self.settings.display_size,
                self.settings.interpolation,
                gpu.as_deref_mut().map(|g| g as &mut dyn GpuScaler),
            ) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Capture iteration failed, stopping loop: {}", e);
                    break;
                }
            };
            self.sink.deliver(frame);

            if let Some(pause) = fps.finish_frame(started.elapsed()) {
                thread::sleep(pause);
            }
        }

        debug!("Capture thread exiting at {} fps", fps.current_fps());
    }
}

/// One iteration: grab, drop alpha, rescale, reorder channels.
/// A GPU failure falls back to the CPU for this frame only.
pub fn render_frame(
    source: &mut dyn ScreenSource,
    region: &CaptureRegion,
    display_size: u32,
    interpolation: Interpolation,
    gpu: Option<&mut dyn GpuScaler>,
) -> Result<Frame, CaptureError> {
    let raw = source.grab(region)?;
    let order = raw.order;
    let captured = strip_alpha(&raw)?;

    let zoomed = match gpu {
        Some(scaler) => match scaler.resize(&captured) {
            Ok(image) => image,
            Err(e) => {
                debug!("GPU resize failed, using CPU for this frame: {}", e);
                resize_cpu(&captured, display_size, interpolation)
            }
        },
        None => resize_cpu(&captured, display_size, interpolation),
    };

    Ok(Frame::new(to_display_order(zoomed, order)))
}
