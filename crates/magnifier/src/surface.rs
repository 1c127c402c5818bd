//! winit window + softbuffer surface behind the controller's surface trait

use aimlens_core::platform::{bring_to_front, NativeHandle, PlatformError};
use aimlens_core::MagnifierSurface;
use anyhow::{anyhow, Result};
use softbuffer::{Context, Surface};
use std::num::NonZeroU32;
use std::rc::Rc;
use tracing::warn;
use winit::dpi::PhysicalPosition;
use winit::raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::Window;

pub struct WinitSurface {
    window: Rc<Window>,
    surface: Surface<Rc<Window>, Rc<Window>>,
    size: (u32, u32),
}

impl WinitSurface {
    pub fn new(window: Rc<Window>) -> Result<Self> {
        let context = Context::new(Rc::clone(&window))
            .map_err(|e| anyhow!("Failed to create softbuffer context: {}", e))?;
        let surface = Surface::new(&context, Rc::clone(&window))
            .map_err(|e| anyhow!("Failed to create softbuffer surface: {}", e))?;

        // On Windows the native styles handle this after the first show
        #[cfg(not(windows))]
        if let Err(e) = window.set_cursor_hittest(false) {
            tracing::debug!("Cursor hit-test cannot be disabled: {}", e);
        }

        Ok(Self {
            window,
            surface,
            size: (0, 0),
        })
    }

    fn draw(&mut self, pixels: &[u32], width: u32, height: u32) -> Result<()> {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return Ok(());
        };
        if self.size != (width, height) {
            self.surface
                .resize(w, h)
                .map_err(|e| anyhow!("resize failed: {}", e))?;
            self.size = (width, height);
        }

        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|e| anyhow!("buffer unavailable: {}", e))?;
        let len = buffer.len().min(pixels.len());
        buffer[..len].copy_from_slice(&pixels[..len]);
        buffer.present().map_err(|e| anyhow!("present failed: {}", e))
    }
}

impl MagnifierSurface for WinitSurface {
    fn set_position(&mut self, x: i32, y: i32) {
        self.window.set_outer_position(PhysicalPosition::new(x, y));
    }

    fn set_visible(&mut self, visible: bool) {
        self.window.set_visible(visible);
    }

    fn raise(&mut self) {
        let Some(handle) = self.native_handle() else {
            // Only the always-on-top level set at creation
            return;
        };
        match bring_to_front(handle) {
            Ok(()) | Err(PlatformError::Unsupported) => {}
            Err(e) => warn!("Failed to raise magnifier window: {}", e),
        }
    }

    fn present(&mut self, pixels: &[u32], width: u32, height: u32) {
        if let Err(e) = self.draw(pixels, width, height) {
            warn!("Failed to draw magnifier frame: {}", e);
        }
    }

    fn native_handle(&self) -> Option<NativeHandle> {
        let handle = self.window.window_handle().ok()?;
        match handle.as_raw() {
            RawWindowHandle::Win32(win32) => Some(NativeHandle(win32.hwnd.get())),
            _ => None,
        }
    }
}
