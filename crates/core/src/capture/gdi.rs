//! GDI screen grabbing (BitBlt from the desktop DC into a DIB)

use super::{CaptureError, PixelOrder, RawCapture, ScreenSource};
use crate::monitor::CaptureRegion;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT, DIB_RGB_COLORS,
    HBITMAP, HDC, HGDIOBJ, ROP_CODE, SRCCOPY,
};

/// Keeps the desktop DC, a memory DC and a bitmap sized to the region alive
/// across grabs.
pub struct GdiScreenSource {
    screen_dc: HDC,
    mem_dc: HDC,
    bitmap: Option<(HBITMAP, HGDIOBJ)>,
    size: (u32, u32),
    pixels: Vec<u8>,
}

impl GdiScreenSource {
    pub fn new() -> Result<Self, CaptureError> {
        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                return Err(CaptureError::Os("Failed to get screen DC".to_string()));
            }

            let mem_dc = CreateCompatibleDC(screen_dc);
            if mem_dc.is_invalid() {
                ReleaseDC(HWND::default(), screen_dc);
                return Err(CaptureError::Os("Failed to create memory DC".to_string()));
            }

            Ok(Self {
                screen_dc,
                mem_dc,
                bitmap: None,
                size: (0, 0),
                pixels: Vec::new(),
            })
        }
    }

    fn ensure_bitmap(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        if self.bitmap.is_some() && self.size == (width, height) {
            return Ok(());
        }
        self.release_bitmap();

        unsafe {
            let bitmap = CreateCompatibleBitmap(self.screen_dc, width as i32, height as i32);
            if bitmap.is_invalid() {
                return Err(CaptureError::Os("Failed to create bitmap".to_string()));
            }
            let previous = SelectObject(self.mem_dc, bitmap);
            self.bitmap = Some((bitmap, previous));
        }

        self.size = (width, height);
        self.pixels = vec![0u8; width as usize * height as usize * 4];
        Ok(())
    }

    fn release_bitmap(&mut self) {
        if let Some((bitmap, previous)) = self.bitmap.take() {
            unsafe {
                SelectObject(self.mem_dc, previous);
                let _ = DeleteObject(bitmap);
            }
        }
    }
}

impl ScreenSource for GdiScreenSource {
    fn grab(&mut self, region: &CaptureRegion) -> Result<RawCapture<'_>, CaptureError> {
        let (width, height) = (region.width, region.height);
        if width == 0 || height == 0 {
            return Err(CaptureError::EmptyRegion { width, height });
        }
        self.ensure_bitmap(width, height)?;
        let Some((bitmap, _)) = self.bitmap else {
            return Err(CaptureError::Os("Capture bitmap missing".to_string()));
        };

        unsafe {
            BitBlt(
                self.mem_dc,
                0,
                0,
                width as i32,
                height as i32,
                self.screen_dc,
                region.left,
                region.top,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            )
            .map_err(|e| CaptureError::Os(format!("BitBlt failed: {}", e)))?;

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    biHeight: -(height as i32), // Top-down
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0 as u32,
                    ..Default::default()
                },
                ..Default::default()
            };

            let lines = GetDIBits(
                self.mem_dc,
                bitmap,
                0,
                height,
                Some(self.pixels.as_mut_ptr() as *mut std::ffi::c_void),
                &mut bmi,
                DIB_RGB_COLORS,
            );
            if lines != height as i32 {
                return Err(CaptureError::Os(format!(
                    "GetDIBits copied {} of {} lines",
                    lines, height
                )));
            }
        }

        Ok(RawCapture {
            width,
            height,
            channels: 4,
            order: PixelOrder::Bgr,
            data: &self.pixels,
        })
    }
}

impl Drop for GdiScreenSource {
    fn drop(&mut self) {
        self.release_bitmap();
        unsafe {
            let _ = DeleteDC(self.mem_dc);
            ReleaseDC(HWND::default(), self.screen_dc);
        }
    }
}
