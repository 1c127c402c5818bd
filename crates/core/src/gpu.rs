//! Optional GPU scaling path.
//!
//! The scaler is probed once when a capture loop starts. A failure on a
//! single frame is reported to the caller, which resizes that frame on the
//! CPU instead; the scaler stays in use for the next frame.

#[cfg(feature = "gpu")]
mod wgpu_scaler;

use crate::config::Interpolation;
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no GPU adapter available")]
    Unavailable,
    #[error("GPU support was not compiled in")]
    NotCompiled,
    #[error("GPU device error: {0}")]
    Device(String),
    #[error("frame is {actual:?}, scaler was built for {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("GPU readback failed: {0}")]
    Readback(String),
}

/// Upload-resize-download scaler bound to fixed input and output sizes
pub trait GpuScaler {
    fn resize(&mut self, image: &RgbImage) -> Result<RgbImage, GpuError>;
}

/// Try to set up a GPU scaler for `source` → `display`×`display`
pub fn probe_scaler(
    source: (u32, u32),
    display: u32,
    interpolation: Interpolation,
) -> Result<Box<dyn GpuScaler>, GpuError> {
    #[cfg(feature = "gpu")]
    {
        let scaler = wgpu_scaler::WgpuScaler::new(source, display, interpolation)?;
        Ok(Box::new(scaler))
    }
    #[cfg(not(feature = "gpu"))]
    {
        let _ = (source, display, interpolation);
        Err(GpuError::NotCompiled)
    }
}
