//! Crosshair rasterizer.
//!
//! Draws the configured shape into a square `0x00RRGGBB` buffer. Pixels not
//! covered by the shape hold [`COLOUR_KEY`], which the overlay window makes
//! transparent.

use crate::config::{CrosshairConfig, CrosshairShape};

/// Side of the overlay window in pixels
pub const CROSSHAIR_WINDOW: u32 = 200;

/// Background colour treated as transparent (magenta)
pub const COLOUR_KEY: u32 = 0x00FF_00FF;

pub struct CrosshairImage {
    pub size: u32,
    pub pixels: Vec<u32>,
}

impl CrosshairImage {
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.size + x) as usize]
    }
}

/// Shape colour, moved off the key so it never turns transparent
pub fn shape_colour(config: &CrosshairConfig) -> u32 {
    let colour = (config.r as u32) << 16 | (config.g as u32) << 8 | config.b as u32;
    if colour == COLOUR_KEY {
        0x00FE_00FF
    } else {
        colour
    }
}

enum Primitive {
    /// Stroke of `width` along a segment
    Line { from: (f32, f32), to: (f32, f32), width: f32 },
    /// Filled disc
    Dot { radius: f32 },
    /// Circle outline of `width`
    Ring { radius: f32, width: f32 },
}

fn cross_arms(c: f32, gap: f32, size: f32, width: f32) -> [Primitive; 4] {
    [
        Primitive::Line { from: (c, c - gap - size), to: (c, c - gap), width },
        Primitive::Line { from: (c, c + gap), to: (c, c + gap + size), width },
        Primitive::Line { from: (c - gap - size, c), to: (c - gap, c), width },
        Primitive::Line { from: (c + gap, c), to: (c + gap + size, c), width },
    ]
}

fn primitives(config: &CrosshairConfig, c: f32) -> Vec<Primitive> {
    let size = config.size.max(0.0);
    let width = config.thickness.max(0.5);
    let gap = config.gap.max(0.0);
    let dot = Primitive::Dot { radius: config.dot_size.max(0.0) };

    match config.shape {
        CrosshairShape::Dot => vec![dot],
        CrosshairShape::Circle => vec![Primitive::Ring { radius: size.max(width), width }],
        CrosshairShape::CircleDot => {
            vec![Primitive::Ring { radius: size.max(width), width }, dot]
        }
        CrosshairShape::Cross => {
            let mut shapes: Vec<Primitive> = cross_arms(c, gap, size, width).into();
            shapes.push(dot);
            shapes
        }
        CrosshairShape::CrossNoDot => cross_arms(c, gap, size, width).into(),
        CrosshairShape::Chevron => vec![
            Primitive::Line { from: (c - size, c + size), to: (c, c), width },
            Primitive::Line { from: (c, c), to: (c + size, c + size), width },
        ],
    }
}

fn segment_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - qx).powi(2) + (p.1 - qy).powi(2)).sqrt()
}

fn covers(shape: &Primitive, p: (f32, f32), c: f32) -> bool {
    match *shape {
        Primitive::Line { from, to, width } => segment_distance(p, from, to) <= width / 2.0,
        Primitive::Dot { radius } => {
            radius > 0.0 && ((p.0 - c).powi(2) + (p.1 - c).powi(2)).sqrt() <= radius
        }
        Primitive::Ring { radius, width } => {
            let d = ((p.0 - c).powi(2) + (p.1 - c).powi(2)).sqrt();
            (d - radius).abs() <= width / 2.0
        }
    }
}

/// Rasterize the crosshair centered in a `size`×`size` buffer
pub fn render_crosshair(config: &CrosshairConfig, size: u32) -> CrosshairImage {
    let c = (size / 2) as f32;
    let colour = shape_colour(config);
    let shapes = primitives(config, c);

    let mut pixels = vec![COLOUR_KEY; (size * size) as usize];
    for y in 0..size {
        for x in 0..size {
            let p = (x as f32 + 0.5, y as f32 + 0.5);
            if shapes.iter().any(|shape| covers(shape, p, c)) {
                pixels[(y * size + x) as usize] = colour;
            }
        }
    }

    CrosshairImage { size, pixels }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(shape: CrosshairShape) -> CrosshairConfig {
        CrosshairConfig {
            shape,
            ..CrosshairConfig::default()
        }
    }

    const GREEN: u32 = 0x0000_FF00;

    #[test]
    fn test_cross_has_gap_and_dot() {
        let img = render_crosshair(&config(CrosshairShape::Cross), CROSSHAIR_WINDOW);
        // Center dot
        assert_eq!(img.pixel(100, 100), GREEN);
        // Inside the gap (gap 5, dot 2)
        assert_eq!(img.pixel(100, 96), COLOUR_KEY);
        // On the upper arm: y in [100-20, 100-5]
        assert_eq!(img.pixel(100, 88), GREEN);
        // Past the arm end
        assert_eq!(img.pixel(100, 76), COLOUR_KEY);
        // Corners stay transparent
        assert_eq!(img.pixel(0, 0), COLOUR_KEY);
    }

    #[test]
    fn test_cross_no_dot_leaves_center_clear() {
        let img = render_crosshair(&config(CrosshairShape::CrossNoDot), CROSSHAIR_WINDOW);
        assert_eq!(img.pixel(100, 100), COLOUR_KEY);
        assert_eq!(img.pixel(112, 100), GREEN);
    }

    #[test]
    fn test_circle_outline() {
        let img = render_crosshair(&config(CrosshairShape::Circle), CROSSHAIR_WINDOW);
        assert_eq!(img.pixel(100, 100), COLOUR_KEY);
        assert_eq!(img.pixel(114, 100), GREEN);
        assert_eq!(img.pixel(100, 85), GREEN);

        let img = render_crosshair(&config(CrosshairShape::CircleDot), CROSSHAIR_WINDOW);
        assert_eq!(img.pixel(100, 100), GREEN);
    }

    #[test]
    fn test_chevron_points_up() {
        let img = render_crosshair(&config(CrosshairShape::Chevron), CROSSHAIR_WINDOW);
        assert_eq!(img.pixel(95, 105), GREEN);
        assert_eq!(img.pixel(105, 105), GREEN);
        assert_eq!(img.pixel(100, 90), COLOUR_KEY);
    }

    #[test]
    fn test_key_coloured_crosshair_stays_visible() {
        let cfg = CrosshairConfig {
            r: 255,
            g: 0,
            b: 255,
            ..config(CrosshairShape::Dot)
        };
        let img = render_crosshair(&cfg, 50);
        assert_ne!(img.pixel(25, 25), COLOUR_KEY);
    }
}
