//! End-to-end magnifier behaviour without a real window or screen:
//! stdin commands flow through the reader thread into a UI loop that owns the
//! controller, and frames flow from the capture thread back into it.

use aimlens_core::capture::{CaptureError, PixelOrder, RawCapture, ScreenSource, SourceFactory};
use aimlens_core::config::{load_config_from, Interpolation};
use aimlens_core::frame::FrameNotifier;
use aimlens_core::ipc::{read_commands, MagnifierCommand};
use aimlens_core::monitor::{CaptureRegion, MonitorGeometry, MonitorLayout};
use aimlens_core::platform::{NativeHandle, PlatformError, PlatformWindowCapabilities};
use aimlens_core::{LoopState, MagnifierConfig, MagnifierController, MagnifierSurface, WindowVisibility};
use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::io::{self, BufReader, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Shared {
    presented: AtomicUsize,
    last_size: Mutex<Option<(u32, u32)>>,
    visibility: Mutex<Vec<bool>>,
}

struct RecordingSurface(Arc<Shared>);

impl MagnifierSurface for RecordingSurface {
    fn set_position(&mut self, _x: i32, _y: i32) {}

    fn set_visible(&mut self, visible: bool) {
        self.0.visibility.lock().push(visible);
    }

    fn raise(&mut self) {}

    fn present(&mut self, _pixels: &[u32], width: u32, height: u32) {
        *self.0.last_size.lock() = Some((width, height));
        self.0.presented.fetch_add(1, Ordering::SeqCst);
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        None
    }
}

struct NoCapabilities;

impl PlatformWindowCapabilities for NoCapabilities {
    fn apply_click_through(&self, _handle: NativeHandle) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn exclude_from_capture(&self, _handle: NativeHandle) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

/// Gradient BGRA screen
struct GradientSource(Vec<u8>);

impl ScreenSource for GradientSource {
    fn grab(&mut self, region: &CaptureRegion) -> Result<RawCapture<'_>, CaptureError> {
        self.0.clear();
        for y in 0..region.height {
            for x in 0..region.width {
                self.0.extend_from_slice(&[x as u8, y as u8, 0x40, 0xff]);
            }
        }
        Ok(RawCapture {
            width: region.width,
            height: region.height,
            channels: 4,
            order: PixelOrder::Bgr,
            data: &self.0,
        })
    }
}

fn gradient_factory() -> SourceFactory {
    Arc::new(|| Ok(Box::new(GradientSource(Vec::new())) as Box<dyn ScreenSource>))
}

fn layout() -> MonitorLayout {
    MonitorLayout::new(vec![
        MonitorGeometry::new(0, 0, 1920, 1080),
        MonitorGeometry::new(1920, 0, 1920, 1080),
    ])
}

/// Blocking byte stream fed chunk by chunk, like a child's stdin pipe
struct PipeReader {
    chunks: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.pending.len() {
            match self.chunks.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

enum UiEvent {
    Command(MagnifierCommand),
    FrameReady,
}

#[test]
fn show_hide_quit_over_pipe() {
    let shared = Arc::new(Shared::default());
    let (ui_tx, ui_rx) = unbounded::<UiEvent>();

    let frame_tx = ui_tx.clone();
    let notify: FrameNotifier = Arc::new(move || {
        let _ = frame_tx.send(UiEvent::FrameReady);
    });

    let config = MagnifierConfig {
        capture_size: 24,
        display_size: 48,
        target_fps: 120,
        ..MagnifierConfig::default()
    };
    let mut controller = MagnifierController::new(
        config,
        &layout(),
        RecordingSurface(Arc::clone(&shared)),
        NoCapabilities,
        gradient_factory(),
        Some(notify),
    )
    .unwrap();

    let (wire_tx, wire_rx) = unbounded::<Vec<u8>>();
    let reader = thread::spawn(move || {
        let pipe = BufReader::new(PipeReader {
            chunks: wire_rx,
            pending: Vec::new(),
            pos: 0,
        });
        read_commands(pipe, move |cmd| ui_tx.send(UiEvent::Command(cmd)).is_ok())
    });

    let watcher = Arc::clone(&shared);
    let writer = thread::spawn(move || {
        wire_tx.send(b"show\n".to_vec()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while watcher.presented.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "no frame shown after 'show'");
            thread::sleep(Duration::from_millis(5));
        }
        wire_tx.send(b"hide\n".to_vec()).unwrap();
        thread::sleep(Duration::from_millis(100));
        wire_tx.send(b"quit\n".to_vec()).unwrap();
    });

    let mut transitions = Vec::new();
    let mut presented_at_hide = None;
    loop {
        let event = ui_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("UI loop stalled");
        match event {
            UiEvent::Command(MagnifierCommand::Show) => {
                controller.show_magnifier();
                transitions.push(controller.visibility());
            }
            UiEvent::Command(MagnifierCommand::Hide) => {
                controller.hide_magnifier();
                transitions.push(controller.visibility());
                presented_at_hide = Some(shared.presented.load(Ordering::SeqCst));
            }
            UiEvent::Command(MagnifierCommand::Quit) => {
                controller.close();
                break;
            }
            UiEvent::FrameReady => {
                controller.pump_frames();
            }
        }
    }

    writer.join().unwrap();
    reader.join().unwrap().unwrap();

    assert_eq!(transitions, vec![WindowVisibility::Visible, WindowVisibility::Hidden]);
    assert_eq!(*shared.visibility.lock(), vec![true, false, false]);
    assert_eq!(controller.loop_state(), LoopState::Stopped);
    assert!(controller.is_closed());

    let at_hide = presented_at_hide.unwrap();
    assert!(at_hide >= 1);
    assert_eq!(shared.presented.load(Ordering::SeqCst), at_hide);
    assert_eq!(*shared.last_size.lock(), Some((48, 48)));
}

#[test]
fn frames_follow_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "magnifier": {
                "capture_size": 33,
                "display_size": 70,
                "interpolation": "Cubic",
                "monitor_index": 7,
                "use_cuda": true
            },
            "hotkeys": "not a table"
        }"#,
    )
    .unwrap();

    let config = load_config_from(&path);
    assert_eq!(config.magnifier.interpolation, Interpolation::Cubic);
    assert!(config.magnifier.use_gpu);
    assert_eq!(config.hotkeys.magnifier, "f2");

    let shared = Arc::new(Shared::default());
    let mut controller = MagnifierController::new(
        config.magnifier,
        &layout(),
        RecordingSurface(Arc::clone(&shared)),
        NoCapabilities,
        gradient_factory(),
        None,
    )
    .unwrap();

    controller.show_magnifier();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !controller.pump_frames() {
        assert!(Instant::now() < deadline, "no frame from capture loop");
        thread::sleep(Duration::from_millis(5));
    }
    controller.toggle();

    assert_eq!(*shared.last_size.lock(), Some((70, 70)));
    assert_eq!(controller.loop_state(), LoopState::Stopped);
}
