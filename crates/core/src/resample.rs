//! CPU side of the frame pipeline: alpha removal, rescaling, channel order.

use crate::capture::{CaptureError, PixelOrder, RawCapture};
use crate::config::Interpolation;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::f32::consts::PI;

/// Half-width of the Lanczos window, in source pixels
const LANCZOS_RADIUS: i64 = 4;

impl Interpolation {
    /// Equivalent resampling filter of the `image` crate.
    /// `None` for Lanczos, which `image` only offers with a = 3.
    pub fn filter(&self) -> Option<FilterType> {
        match self {
            Interpolation::Nearest => Some(FilterType::Nearest),
            Interpolation::Linear => Some(FilterType::Triangle),
            Interpolation::Cubic => Some(FilterType::CatmullRom),
            Interpolation::Lanczos => None,
        }
    }
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-5 {
        return 1.0;
    }
    let px = PI * x;
    px.sin() / px
}

/// Lanczos kernel with a = 4, same as the GPU shader
pub fn lanczos4(x: f32) -> f32 {
    if x.abs() >= LANCZOS_RADIUS as f32 {
        return 0.0;
    }
    sinc(x) * sinc(x / LANCZOS_RADIUS as f32)
}

/// Source indices (edge-clamped) and normalized weights for every output
/// position along one axis. Eight taps centered on the pixel-center mapping.
fn lanczos4_taps(src_len: u32, dst_len: u32) -> Vec<([usize; 8], [f32; 8])> {
    let scale = src_len as f32 / dst_len as f32;
    let last = src_len as i64 - 1;

    (0..dst_len)
        .map(|d| {
            let s = (d as f32 + 0.5) * scale - 0.5;
            let base = s.floor() as i64;
            let mut indices = [0usize; 8];
            let mut weights = [0f32; 8];
            for (k, offset) in (1 - LANCZOS_RADIUS..=LANCZOS_RADIUS).enumerate() {
                let pos = base + offset;
                indices[k] = pos.clamp(0, last) as usize;
                weights[k] = lanczos4(s - pos as f32);
            }
            let total: f32 = weights.iter().sum();
            if total != 0.0 {
                weights.iter_mut().for_each(|w| *w /= total);
            }
            (indices, weights)
        })
        .collect()
}

/// Separable Lanczos-4: a horizontal pass into an f32 buffer, then vertical
fn resize_lanczos4(image: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let cols = lanczos4_taps(width, size);
    let rows = lanczos4_taps(height, size);
    let src = image.as_raw();
    let out_w = size as usize;
    let row_len = width as usize * 3;

    let mut horizontal = vec![0f32; height as usize * out_w * 3];
    for (y, row) in src.chunks_exact(row_len).enumerate() {
        for (x, (indices, weights)) in cols.iter().enumerate() {
            let out = &mut horizontal[(y * out_w + x) * 3..][..3];
            for (&i, &w) in indices.iter().zip(weights) {
                for c in 0..3 {
                    out[c] += row[i * 3 + c] as f32 * w;
                }
            }
        }
    }

    let mut resized = RgbImage::new(size, size);
    for (y, (indices, weights)) in rows.iter().enumerate() {
        for x in 0..out_w {
            let mut acc = [0f32; 3];
            for (&i, &w) in indices.iter().zip(weights) {
                let px = &horizontal[(i * out_w + x) * 3..][..3];
                for c in 0..3 {
                    acc[c] += px[c] * w;
                }
            }
            let px = acc.map(|v| v.round().clamp(0.0, 255.0) as u8);
            resized.put_pixel(x as u32, y as u32, Rgb(px));
        }
    }
    resized
}

/// Copy the first three channels of every pixel into a packed 3-channel image.
/// Channel order is left as captured.
pub fn strip_alpha(raw: &RawCapture<'_>) -> Result<RgbImage, CaptureError> {
    let expected = raw.expected_len();
    if raw.data.len() < expected {
        return Err(CaptureError::ShortBuffer {
            expected,
            actual: raw.data.len(),
        });
    }

    let stride = raw.channels as usize;
    let packed: Vec<u8> = if stride == 3 {
        raw.data[..expected].to_vec()
    } else {
        raw.data[..expected]
            .chunks_exact(stride)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    };

    RgbImage::from_raw(raw.width, raw.height, packed).ok_or(CaptureError::ShortBuffer {
        expected,
        actual: raw.data.len(),
    })
}

/// Rescale to `size`×`size` with the configured algorithm
pub fn resize_cpu(image: &RgbImage, size: u32, interpolation: Interpolation) -> RgbImage {
    if image.width() == size && image.height() == size {
        return image.clone();
    }
    match interpolation.filter() {
        Some(filter) => imageops::resize(image, size, size, filter),
        None => resize_lanczos4(image, size),
    }
}

/// Reorder channels in place so the result is RGB
pub fn to_display_order(mut image: RgbImage, order: PixelOrder) -> RgbImage {
    if order == PixelOrder::Bgr {
        for px in image.pixels_mut() {
            px.0.swap(0, 2);
        }
    }
    image
}

/// Pack an RGB buffer into `0x00RRGGBB` words for the display surface
pub fn pack_xrgb(rgb: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        rgb.chunks_exact(3)
            .map(|px| (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32),
    );
}
