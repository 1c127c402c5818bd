//! Screen grabbing backends.
//!
//! A [`ScreenSource`] is created on the capture thread and lives there for the
//! whole lifetime of one capture loop, so implementations may keep
//! thread-affine OS handles and reuse their pixel buffer between grabs.

#[cfg(windows)]
mod gdi;

#[cfg(windows)]
pub use gdi::GdiScreenSource;

use crate::monitor::CaptureRegion;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture is not supported on this platform")]
    Unsupported,
    #[error("capture region {width}x{height} is empty")]
    EmptyRegion { width: u32, height: u32 },
    #[error("no monitor is attached")]
    NoMonitor,
    #[error("{0}")]
    Os(String),
    #[error("grabbed buffer has {actual} bytes, expected {expected}")]
    ShortBuffer { expected: usize, actual: usize },
}

/// Channel order of a raw grab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Bgr,
    Rgb,
}

/// Borrowed view over a source's pixel buffer.
///
/// Only valid until the next grab on the same source.
#[derive(Debug, Clone, Copy)]
pub struct RawCapture<'a> {
    pub width: u32,
    pub height: u32,
    /// 3 or 4; a fourth channel is alpha/padding
    pub channels: u8,
    pub order: PixelOrder,
    pub data: &'a [u8],
}

impl RawCapture<'_> {
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

pub trait ScreenSource {
    fn grab(&mut self, region: &CaptureRegion) -> Result<RawCapture<'_>, CaptureError>;
}

/// Builds a fresh source on the capture thread each time a loop starts
pub type SourceFactory =
    Arc<dyn Fn() -> Result<Box<dyn ScreenSource>, CaptureError> + Send + Sync>;

/// The native source for this platform
pub fn native_source_factory() -> SourceFactory {
    Arc::new(|| {
        #[cfg(windows)]
        {
            Ok(Box::new(GdiScreenSource::new()?) as Box<dyn ScreenSource>)
        }
        #[cfg(not(windows))]
        {
            Err(CaptureError::Unsupported)
        }
    })
}
