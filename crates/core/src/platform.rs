//! OS window tweaks the overlays need beyond what winit exposes:
//! click-through, exclusion from screen capture and colour-key transparency.

use thiserror::Error;

/// Raw top-level window handle (an `HWND` on Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub isize);

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("window capability not supported on this platform")]
    Unsupported,
    #[error("null window handle")]
    NullHandle,
    #[error("{0}")]
    Os(String),
}

/// Best-effort window capabilities. Failures are reported, never fatal.
pub trait PlatformWindowCapabilities {
    /// Let pointer input pass through the window
    fn apply_click_through(&self, handle: NativeHandle) -> Result<(), PlatformError>;

    /// Keep the window out of screen capture, including our own grabs
    fn exclude_from_capture(&self, handle: NativeHandle) -> Result<(), PlatformError>;
}

/// Capabilities of the running OS
pub fn native_capabilities() -> NativeCapabilities {
    NativeCapabilities
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCapabilities;

#[cfg(windows)]
mod win {
    use super::{NativeHandle, PlatformError};
    use tracing::debug;
    use windows::Win32::Foundation::{COLORREF, HWND};
    use windows::Win32::UI::WindowsAndMessaging::{
        GetWindowLongPtrW, SetLayeredWindowAttributes, SetWindowDisplayAffinity,
        SetWindowLongPtrW, SetWindowPos, GWL_EXSTYLE, HWND_TOP, HWND_TOPMOST, LWA_ALPHA, LWA_COLORKEY,
        SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER,
        WDA_EXCLUDEFROMCAPTURE, WDA_MONITOR, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
        WS_EX_TRANSPARENT,
    };

    fn hwnd(handle: NativeHandle) -> Result<HWND, PlatformError> {
        if handle.0 == 0 {
            return Err(PlatformError::NullHandle);
        }
        Ok(HWND(handle.0))
    }

    /// OR extra bits into the extended style. Returns false when they were
    /// already all set.
    unsafe fn add_ex_style(hwnd: HWND, bits: u32) -> bool {
        let current = GetWindowLongPtrW(hwnd, GWL_EXSTYLE) as u32;
        if current & bits == bits {
            return false;
        }
        SetWindowLongPtrW(hwnd, GWL_EXSTYLE, (current | bits) as isize);
        true
    }

    unsafe fn refresh_frame(hwnd: HWND) -> Result<(), PlatformError> {
        SetWindowPos(
            hwnd,
            HWND_TOP,
            0,
            0,
            0,
            0,
            SWP_FRAMECHANGED | SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
        )
        .map_err(|e| PlatformError::Os(format!("SetWindowPos failed: {}", e)))
    }

    pub fn click_through(handle: NativeHandle) -> Result<(), PlatformError> {
        let hwnd = hwnd(handle)?;
        unsafe {
            if !add_ex_style(hwnd, WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0) {
                return Ok(());
            }
            // A layered window stays invisible until its attributes are set
            SetLayeredWindowAttributes(hwnd, COLORREF(0), 255, LWA_ALPHA)
                .map_err(|e| PlatformError::Os(format!("SetLayeredWindowAttributes failed: {}", e)))?;
            refresh_frame(hwnd)?;
        }
        debug!("Click-through applied to {:?}", handle);
        Ok(())
    }

    pub fn exclude_from_capture(handle: NativeHandle) -> Result<(), PlatformError> {
        let hwnd = hwnd(handle)?;
        unsafe {
            if SetWindowDisplayAffinity(hwnd, WDA_EXCLUDEFROMCAPTURE).is_ok() {
                return Ok(());
            }
            // Before Windows 10 2004 only WDA_MONITOR exists
            SetWindowDisplayAffinity(hwnd, WDA_MONITOR)
                .map_err(|e| PlatformError::Os(format!("SetWindowDisplayAffinity failed: {}", e)))
        }
    }

    pub fn bring_to_front(handle: NativeHandle) -> Result<(), PlatformError> {
        let hwnd = hwnd(handle)?;
        unsafe {
            SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
            )
            .map_err(|e| PlatformError::Os(format!("SetWindowPos failed: {}", e)))
        }
    }

    pub fn colour_key(handle: NativeHandle, key: u32, alpha: u8) -> Result<(), PlatformError> {
        let hwnd = hwnd(handle)?;
        unsafe {
            add_ex_style(
                hwnd,
                WS_EX_LAYERED.0 | WS_EX_TRANSPARENT.0 | WS_EX_TOOLWINDOW.0 | WS_EX_NOACTIVATE.0,
            );
            // COLORREF is 0x00BBGGRR
            let (r, g, b) = ((key >> 16) & 0xff, (key >> 8) & 0xff, key & 0xff);
            SetLayeredWindowAttributes(
                hwnd,
                COLORREF(b << 16 | g << 8 | r),
                alpha,
                LWA_COLORKEY | LWA_ALPHA,
            )
            .map_err(|e| PlatformError::Os(format!("SetLayeredWindowAttributes failed: {}", e)))?;
            refresh_frame(hwnd)
        }
    }
}

impl PlatformWindowCapabilities for NativeCapabilities {
    fn apply_click_through(&self, handle: NativeHandle) -> Result<(), PlatformError> {
        #[cfg(windows)]
        {
            win::click_through(handle)
        }
        #[cfg(not(windows))]
        {
            let _ = handle;
            Err(PlatformError::Unsupported)
        }
    }

    fn exclude_from_capture(&self, handle: NativeHandle) -> Result<(), PlatformError> {
        #[cfg(windows)]
        {
            win::exclude_from_capture(handle)
        }
        #[cfg(not(windows))]
        {
            let _ = handle;
            Err(PlatformError::Unsupported)
        }
    }
}

/// Make every pixel equal to `key` (`0x00RRGGBB`) fully transparent, the rest
/// `alpha` opaque, and the window click-through
pub fn apply_colour_key(handle: NativeHandle, key: u32, alpha: u8) -> Result<(), PlatformError> {
    #[cfg(windows)]
    {
        win::colour_key(handle, key, alpha)
    }
    #[cfg(not(windows))]
    {
        let _ = (handle, key, alpha);
        Err(PlatformError::Unsupported)
    }
}

/// Move the window to the top of the topmost band without activating it
pub fn bring_to_front(handle: NativeHandle) -> Result<(), PlatformError> {
    #[cfg(windows)]
    {
        win::bring_to_front(handle)
    }
    #[cfg(not(windows))]
    {
        let _ = handle;
        Err(PlatformError::Unsupported)
    }
}

/// Opt into per-monitor DPI awareness so window and capture coordinates are
/// physical pixels. Must run before the first window is created.
pub fn enable_dpi_awareness() {
    #[cfg(windows)]
    unsafe {
        use windows::Win32::UI::HiDpi::{
            SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
        };
        if let Err(e) = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) {
            tracing::debug!("DPI awareness already set: {}", e);
        }
    }
}
