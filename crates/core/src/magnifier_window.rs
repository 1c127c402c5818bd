//! Magnifier window controller.
//!
//! Couples one on-screen surface to one [`CaptureLoop`]: the loop only runs
//! while the window is meant to be visible. Every method must be called from
//! the thread that owns the window; frames and commands produced elsewhere
//! reach it through channels.

use crate::capture::{CaptureError, SourceFactory};
use crate::capture_loop::{CaptureLoop, LoopSettings, LoopState};
use crate::config::MagnifierConfig;
use crate::frame::{frame_slot, Frame, FrameNotifier, FrameReceiver};
use crate::monitor::{window_origin, MonitorGeometry, MonitorLayout};
use crate::platform::{NativeHandle, PlatformError, PlatformWindowCapabilities};
use crate::resample::pack_xrgb;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Delay between the first show and the first styling pass
pub const STYLE_DELAY: Duration = Duration::from_millis(100);
/// Delay between the first styling pass and the click-through reapplication
pub const STYLE_REAPPLY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowVisibility {
    Hidden,
    Visible,
}

/// The window operations the controller needs
pub trait MagnifierSurface {
    fn set_position(&mut self, x: i32, y: i32);
    fn set_visible(&mut self, visible: bool);
    fn raise(&mut self);
    /// Replace the window content with `0x00RRGGBB` pixels
    fn present(&mut self, pixels: &[u32], width: u32, height: u32);
    fn native_handle(&self) -> Option<NativeHandle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Styling {
    NotScheduled,
    Apply { at: Instant },
    Reapply { at: Instant },
    Done,
}

pub struct MagnifierController<S, P> {
    config: MagnifierConfig,
    monitor: MonitorGeometry,
    surface: Option<S>,
    capabilities: P,
    capture: CaptureLoop,
    frames: FrameReceiver,
    visibility: WindowVisibility,
    styling: Styling,
    pixels: Vec<u32>,
    pixel_size: (u32, u32),
}

impl<S, P> MagnifierController<S, P>
where
    S: MagnifierSurface,
    P: PlatformWindowCapabilities,
{
    /// Build the loop for `config` and place the (hidden) window.
    ///
    /// `notify` runs on the capture thread after every frame; use it to wake
    /// the UI event loop so it calls [`Self::pump_frames`].
    pub fn new(
        config: MagnifierConfig,
        layout: &MonitorLayout,
        surface: S,
        capabilities: P,
        source_factory: SourceFactory,
        notify: Option<FrameNotifier>,
    ) -> Result<Self, CaptureError> {
        let monitor = layout
            .resolve(config.monitor_index)
            .ok_or(CaptureError::NoMonitor)?;
        let (sender, frames) = frame_slot(notify);
        let capture = CaptureLoop::new(LoopSettings::from(&config), layout, source_factory, sender)?;

        let mut controller = Self {
            config,
            monitor,
            surface: Some(surface),
            capabilities,
            capture,
            frames,
            visibility: WindowVisibility::Hidden,
            styling: Styling::NotScheduled,
            pixels: Vec::new(),
            pixel_size: (0, 0),
        };
        controller.position();
        Ok(controller)
    }

    /// Center the window on its monitor plus the configured offset.
    /// Returns the top-left corner.
    pub fn position(&mut self) -> (i32, i32) {
        let (x, y) = window_origin(
            &self.monitor,
            self.config.display_size,
            self.config.offset_x,
            self.config.offset_y,
        );
        if let Some(surface) = self.surface.as_mut() {
            surface.set_position(x, y);
        }
        (x, y)
    }

    pub fn config(&self) -> &MagnifierConfig {
        &self.config
    }

    pub fn visibility(&self) -> WindowVisibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == WindowVisibility::Visible
    }

    pub fn loop_state(&self) -> LoopState {
        self.capture.state()
    }

    pub fn is_closed(&self) -> bool {
        self.surface.is_none()
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn show_magnifier(&mut self) {
        if self.is_visible() {
            return;
        }
        let Some(surface) = self.surface.as_mut() else {
            return;
        };

        if let Err(e) = self.capture.start() {
            error!("Failed to start capture thread: {}", e);
        }
        surface.set_visible(true);
        surface.raise();

        if self.styling == Styling::NotScheduled {
            self.styling = Styling::Apply {
                at: Instant::now() + STYLE_DELAY,
            };
        }
        self.visibility = WindowVisibility::Visible;
        info!("Magnifier shown");
    }

    pub fn hide_magnifier(&mut self) {
        if !self.is_visible() {
            return;
        }
        self.capture.stop();
        // Anything captured before the stop must not show up later
        self.frames.clear();
        if let Some(surface) = self.surface.as_mut() {
            surface.set_visible(false);
        }
        self.visibility = WindowVisibility::Hidden;
        info!("Magnifier hidden");
    }

    pub fn toggle(&mut self) {
        if self.is_visible() {
            self.hide_magnifier();
        } else {
            self.show_magnifier();
        }
    }

    /// Display the newest pending frame, if any. Returns whether one was shown.
    pub fn pump_frames(&mut self) -> bool {
        match self.frames.take() {
            Some(frame) => self.on_frame(frame),
            None => false,
        }
    }

    /// Replace the window content with `frame`.
    /// Empty frames and frames arriving while hidden are dropped.
    pub fn on_frame(&mut self, frame: Frame) -> bool {
        if frame.is_empty() || !self.is_visible() {
            return false;
        }
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };

        pack_xrgb(frame.as_rgb(), &mut self.pixels);
        self.pixel_size = (frame.width(), frame.height());
        surface.present(&self.pixels, frame.width(), frame.height());
        true
    }

    /// Present the last frame again, e.g. after the window was exposed
    pub fn redraw(&mut self) {
        let (width, height) = self.pixel_size;
        if width == 0 || height == 0 {
            return;
        }
        if let Some(surface) = self.surface.as_mut() {
            surface.present(&self.pixels, width, height);
        }
    }

    /// When [`Self::poll_timers`] next has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.styling {
            Styling::Apply { at } | Styling::Reapply { at } => Some(at),
            Styling::NotScheduled | Styling::Done => None,
        }
    }

    /// Run the delayed click-through and capture-exclusion passes that are due
    pub fn poll_timers(&mut self, now: Instant) {
        if matches!(self.styling, Styling::NotScheduled | Styling::Done) {
            return;
        }
        let Some(handle) = self.surface.as_ref().and_then(|s| s.native_handle()) else {
            info!("Magnifier window has no native handle, window stays interactive");
            self.styling = Styling::Done;
            return;
        };

        if let Styling::Apply { at } = self.styling {
            if now < at {
                return;
            }
            report("click-through", self.capabilities.apply_click_through(handle));
            report("capture exclusion", self.capabilities.exclude_from_capture(handle));
            self.styling = Styling::Reapply {
                at: at + STYLE_REAPPLY_DELAY,
            };
        }

        if let Styling::Reapply { at } = self.styling {
            if now < at {
                return;
            }
            report("click-through", self.capabilities.apply_click_through(handle));
            self.styling = Styling::Done;
        }
    }

    /// Stop the loop and release the window. Safe to call more than once.
    pub fn close(&mut self) {
        let Some(mut surface) = self.surface.take() else {
            return;
        };
        self.capture.stop();
        self.frames.clear();
        surface.set_visible(false);
        self.visibility = WindowVisibility::Hidden;
        self.styling = Styling::Done;
        debug!("Magnifier window closed");
    }
}

fn report(what: &str, result: Result<(), PlatformError>) {
    match result {
        Ok(()) => debug!("Applied {}", what),
        Err(PlatformError::Unsupported) => {
            info!("{} not available here, window stays interactive", what)
        }
        Err(e) => warn!("Failed to apply {}: {}", what, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelOrder, RawCapture, ScreenSource};
    use crate::monitor::CaptureRegion;
    use image::{Rgb, RgbImage};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct SurfaceLog {
        no_handle: bool,
        position: Option<(i32, i32)>,
        visible: bool,
        raised: usize,
        presented: Vec<(u32, u32, u32)>,
    }

    struct FakeSurface(Rc<RefCell<SurfaceLog>>);

    impl MagnifierSurface for FakeSurface {
        fn set_position(&mut self, x: i32, y: i32) {
            self.0.borrow_mut().position = Some((x, y));
        }
        fn set_visible(&mut self, visible: bool) {
            self.0.borrow_mut().visible = visible;
        }
        fn raise(&mut self) {
            self.0.borrow_mut().raised += 1;
        }
        fn present(&mut self, pixels: &[u32], width: u32, height: u32) {
            self.0.borrow_mut().presented.push((width, height, pixels[0]));
        }
        fn native_handle(&self) -> Option<NativeHandle> {
            if self.0.borrow().no_handle {
                None
            } else {
                Some(NativeHandle(42))
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeCaps(Rc<RefCell<Vec<&'static str>>>);

    impl PlatformWindowCapabilities for FakeCaps {
        fn apply_click_through(&self, _handle: NativeHandle) -> Result<(), PlatformError> {
            self.0.borrow_mut().push("click-through");
            Ok(())
        }
        fn exclude_from_capture(&self, _handle: NativeHandle) -> Result<(), PlatformError> {
            self.0.borrow_mut().push("exclude");
            Err(PlatformError::Unsupported)
        }
    }

    struct BlankSource(Vec<u8>);

    impl ScreenSource for BlankSource {
        fn grab(&mut self, region: &CaptureRegion) -> Result<RawCapture<'_>, CaptureError> {
            self.0 = vec![0; (region.width * region.height * 3) as usize];
            Ok(RawCapture {
                width: region.width,
                height: region.height,
                channels: 3,
                order: PixelOrder::Rgb,
                data: &self.0,
            })
        }
    }

    /// Fails every grab from the `fail_from`-th on, counting all grabs
    struct FlakySource {
        buffer: Vec<u8>,
        grabs: usize,
        fail_from: usize,
        total: Arc<AtomicUsize>,
    }

    impl ScreenSource for FlakySource {
        fn grab(&mut self, region: &CaptureRegion) -> Result<RawCapture<'_>, CaptureError> {
            self.grabs += 1;
            self.total.fetch_add(1, Ordering::SeqCst);
            if self.grabs >= self.fail_from {
                return Err(CaptureError::Os("display lost".to_string()));
            }
            self.buffer = vec![0x80; (region.width * region.height * 3) as usize];
            Ok(RawCapture {
                width: region.width,
                height: region.height,
                channels: 3,
                order: PixelOrder::Rgb,
                data: &self.buffer,
            })
        }
    }

    fn blank_factory() -> SourceFactory {
        Arc::new(|| Ok(Box::new(BlankSource(Vec::new())) as Box<dyn ScreenSource>))
    }

    fn controller() -> (
        MagnifierController<FakeSurface, FakeCaps>,
        Rc<RefCell<SurfaceLog>>,
        FakeCaps,
    ) {
        controller_with(blank_factory(), SurfaceLog::default())
    }

    fn controller_with(
        factory: SourceFactory,
        surface: SurfaceLog,
    ) -> (
        MagnifierController<FakeSurface, FakeCaps>,
        Rc<RefCell<SurfaceLog>>,
        FakeCaps,
    ) {
        let log = Rc::new(RefCell::new(surface));
        let caps = FakeCaps::default();
        let layout = MonitorLayout::new(vec![
            MonitorGeometry::new(0, 0, 1920, 1080),
            MonitorGeometry::new(1920, 0, 2560, 1440),
        ]);
        let config = MagnifierConfig {
            capture_size: 10,
            display_size: 20,
            target_fps: 30,
            monitor_index: 2,
            offset_x: 5,
            offset_y: -5,
            ..MagnifierConfig::default()
        };
        let controller = MagnifierController::new(
            config,
            &layout,
            FakeSurface(Rc::clone(&log)),
            caps.clone(),
            factory,
            None,
        )
        .unwrap();
        (controller, log, caps)
    }

    fn frame(value: u8) -> Frame {
        Frame::new(RgbImage::from_pixel(20, 20, Rgb([value, 0, 0])))
    }

    #[test]
    fn test_positioned_on_target_monitor_at_construction() {
        let (_controller, log, _) = controller();
        assert_eq!(log.borrow().position, Some((1920 + 1280 - 10 + 5, 720 - 10 - 5)));
        assert!(!log.borrow().visible);
    }

    #[test]
    fn test_show_twice_runs_one_loop() {
        let (mut controller, log, _) = controller();
        controller.show_magnifier();
        controller.show_magnifier();

        assert_eq!(controller.visibility(), WindowVisibility::Visible);
        assert_eq!(controller.loop_state(), LoopState::Running);
        assert_eq!(log.borrow().raised, 1);
        controller.close();
    }

    #[test]
    fn test_toggle_round_trip() {
        let (mut controller, log, _) = controller();
        assert_eq!(controller.loop_state(), LoopState::Stopped);

        controller.toggle();
        assert!(log.borrow().visible);
        controller.toggle();

        assert_eq!(controller.visibility(), WindowVisibility::Hidden);
        assert_eq!(controller.loop_state(), LoopState::Stopped);
        assert!(!log.borrow().visible);
    }

    #[test]
    fn test_frames_ignored_while_hidden_or_empty() {
        let (mut controller, log, _) = controller();
        assert!(!controller.on_frame(frame(1)));

        controller.show_magnifier();
        assert!(!controller.on_frame(Frame::new(RgbImage::new(0, 0))));
        assert!(controller.on_frame(frame(0xab)));
        controller.hide_magnifier();

        assert!(!controller.pump_frames());
        assert_eq!(log.borrow().presented, vec![(20, 20, 0x00ab_0000)]);
    }

    #[test]
    fn test_styling_runs_once_then_reapplies_click_through() {
        let (mut controller, _log, caps) = controller();
        let start = Instant::now();
        controller.poll_timers(start + Duration::from_secs(5));
        assert!(caps.0.borrow().is_empty());

        controller.show_magnifier();
        let first = controller.next_deadline().unwrap();
        controller.poll_timers(first - Duration::from_millis(1));
        assert!(caps.0.borrow().is_empty());

        controller.poll_timers(first);
        assert_eq!(*caps.0.borrow(), vec!["click-through", "exclude"]);

        let second = controller.next_deadline().unwrap();
        assert_eq!(second - first, STYLE_REAPPLY_DELAY);
        controller.poll_timers(second);
        assert_eq!(*caps.0.borrow(), vec!["click-through", "exclude", "click-through"]);
        assert!(controller.next_deadline().is_none());

        // A second show never schedules another pass
        controller.hide_magnifier();
        controller.show_magnifier();
        assert!(controller.next_deadline().is_none());
        controller.close();
    }

    #[test]
    fn test_missing_handle_ends_styling() {
        let surface = SurfaceLog {
            no_handle: true,
            ..SurfaceLog::default()
        };
        let (mut controller, _log, caps) = controller_with(blank_factory(), surface);
        controller.show_magnifier();
        assert!(controller.next_deadline().is_some());

        controller.poll_timers(Instant::now() + Duration::from_secs(60));
        assert!(controller.next_deadline().is_none());
        assert!(caps.0.borrow().is_empty());
        controller.close();
    }

    #[test]
    fn test_failed_grab_keeps_last_frame_until_next_show() {
        let total = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&total);
        let factory: SourceFactory = Arc::new(move || {
            Ok(Box::new(FlakySource {
                buffer: Vec::new(),
                grabs: 0,
                fail_from: 3,
                total: Arc::clone(&counter),
            }) as Box<dyn ScreenSource>)
        });
        let (mut controller, log, _) = controller_with(factory, SurfaceLog::default());

        controller.show_magnifier();
        let deadline = Instant::now() + Duration::from_secs(5);
        while controller.loop_state() == LoopState::Running {
            assert!(Instant::now() < deadline, "capture thread did not end");
            thread::sleep(Duration::from_millis(5));
        }
        // Two good grabs, then the failing one ended the thread
        assert_eq!(total.load(Ordering::SeqCst), 3);
        assert!(controller.pump_frames());

        // The window stays up with the last frame
        assert!(controller.is_visible());
        assert!(log.borrow().visible);
        controller.redraw();
        {
            let log = log.borrow();
            let shown = &log.presented;
            assert_eq!(shown.len(), 2);
            assert_eq!(shown[0], shown[1]);
            assert_eq!(shown[1], (20, 20, 0x0080_8080));
        }

        controller.hide_magnifier();
        controller.show_magnifier();
        let deadline = Instant::now() + Duration::from_secs(5);
        while total.load(Ordering::SeqCst) < 6 {
            assert!(Instant::now() < deadline, "loop was not restarted");
            thread::sleep(Duration::from_millis(5));
        }
        controller.close();
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut controller, log, _) = controller();
        controller.show_magnifier();
        controller.close();
        controller.close();

        assert!(controller.is_closed());
        assert_eq!(controller.loop_state(), LoopState::Stopped);
        assert!(!log.borrow().visible);

        controller.show_magnifier();
        assert_eq!(controller.visibility(), WindowVisibility::Hidden);
    }
}
