//! Crosshair overlay window
//!
//! A borderless always-on-top window centered on the primary monitor showing
//! the rasterized crosshair. On Windows the magenta background is keyed out
//! and the window ignores the mouse; elsewhere only the mouse part applies.

use aimlens_core::config::CrosshairConfig;
use aimlens_core::crosshair::{render_crosshair, CrosshairImage, CROSSHAIR_WINDOW, COLOUR_KEY};
use aimlens_core::monitor::MonitorGeometry;
use aimlens_core::platform::{apply_colour_key, NativeHandle, PlatformError};
use anyhow::{anyhow, Context as _, Result};
use softbuffer::{Context, Surface};
use std::num::NonZeroU32;
use std::rc::Rc;
use tracing::{debug, info, warn};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event_loop::EventLoopWindowTarget;
use winit::raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::{Window, WindowBuilder, WindowLevel};

pub struct CrosshairOverlay {
    window: Rc<Window>,
    surface: Surface<Rc<Window>, Rc<Window>>,
    image: CrosshairImage,
    alpha: u8,
    visible: bool,
}

impl CrosshairOverlay {
    /// Create the overlay hidden
    pub fn new<T>(target: &EventLoopWindowTarget<T>, config: &CrosshairConfig) -> Result<Self> {
        let builder = WindowBuilder::new()
            .with_title("AimLens Crosshair")
            .with_inner_size(PhysicalSize::new(CROSSHAIR_WINDOW, CROSSHAIR_WINDOW))
            .with_decorations(false)
            .with_resizable(false)
            .with_visible(false)
            .with_active(false)
            .with_window_level(WindowLevel::AlwaysOnTop);

        #[cfg(windows)]
        let builder = {
            use winit::platform::windows::WindowBuilderExtWindows;
            builder.with_skip_taskbar(true)
        };

        let window = Rc::new(
            builder
                .build(target)
                .context("Failed to create crosshair window")?,
        );

        let monitor = target
            .primary_monitor()
            .or_else(|| target.available_monitors().next());
        if let Some(monitor) = monitor {
            let position = monitor.position();
            let size = monitor.size();
            let geometry = MonitorGeometry::new(position.x, position.y, size.width, size.height);
            let (cx, cy) = geometry.center();
            let half = (CROSSHAIR_WINDOW / 2) as i32;
            window.set_outer_position(PhysicalPosition::new(cx - half, cy - half));
        } else {
            warn!("No monitor reported, crosshair left at the default position");
        }

        let context = Context::new(Rc::clone(&window))
            .map_err(|e| anyhow!("Failed to create softbuffer context: {}", e))?;
        let surface = Surface::new(&context, Rc::clone(&window))
            .map_err(|e| anyhow!("Failed to create softbuffer surface: {}", e))?;

        #[cfg(not(windows))]
        if let Err(e) = window.set_cursor_hittest(false) {
            debug!("Cursor hit-test cannot be disabled: {}", e);
        }

        let mut overlay = Self {
            window,
            surface,
            image: render_crosshair(config, CROSSHAIR_WINDOW),
            alpha: config.alpha,
            visible: false,
        };
        overlay.apply_styles();
        Ok(overlay)
    }

    pub fn show(&mut self) {
        self.visible = true;
        self.window.set_visible(true);
        self.redraw();
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.window.set_visible(false);
    }

    pub fn toggle(&mut self) {
        if self.visible {
            self.hide();
        } else {
            self.show();
        }
        info!("Crosshair {}", if self.visible { "shown" } else { "hidden" });
    }

    /// Re-render after a config change
    pub fn set_config(&mut self, config: &CrosshairConfig) {
        self.image = render_crosshair(config, CROSSHAIR_WINDOW);
        if self.alpha != config.alpha {
            self.alpha = config.alpha;
            self.apply_styles();
        }
        if self.visible {
            self.redraw();
        }
    }

    pub fn redraw(&mut self) {
        if let Err(e) = self.draw() {
            warn!("Failed to draw crosshair: {}", e);
        }
    }

    fn draw(&mut self) -> Result<()> {
        let side = NonZeroU32::new(self.image.size).context("empty crosshair image")?;
        self.surface
            .resize(side, side)
            .map_err(|e| anyhow!("resize failed: {}", e))?;

        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| anyhow!("buffer unavailable: {}", e))?;
        let len = buffer.len().min(self.image.pixels.len());
        buffer[..len].copy_from_slice(&self.image.pixels[..len]);
        buffer.present().map_err(|e| anyhow!("present failed: {}", e))
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        let handle = self.window.window_handle().ok()?;
        match handle.as_raw() {
            RawWindowHandle::Win32(win32) => Some(NativeHandle(win32.hwnd.get())),
            _ => None,
        }
    }

    fn apply_styles(&mut self) {
        let Some(handle) = self.native_handle() else {
            debug!("Crosshair window has no native handle, colour key skipped");
            return;
        };
        match apply_colour_key(handle, COLOUR_KEY, self.alpha) {
            Ok(()) => debug!("Crosshair colour key applied (alpha {})", self.alpha),
            Err(PlatformError::Unsupported) => {
                info!("Colour key not supported here, background stays visible")
            }
            Err(e) => warn!("Failed to apply crosshair colour key: {}", e),
        }
    }
}
