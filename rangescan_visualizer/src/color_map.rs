// THEORY:
// The color map turns a completed depth frame into a diagnostic false-color
// image. It is not a renderer: the goal is that near and far surfaces are easy
// to tell apart at a glance, and that the same frame always gives the same
// pixels.
//
// Key architectural principles:
// 1.  **Per-Frame Normalization**: The range used for coloring is the min and
//     max of the hit cells of *this* frame. No-hit cells never take part.
// 2.  **Squared, Inverted Ramp**: `t = (1 - (v - min) / (max - min))^2`, so the
//     nearest surface gets `t = 1` and the ramp spends more of its resolution
//     on the near field.
// 3.  **Two-Stage Blend**: `t` blends a "near" pair and a "far" pair, then
//     blends the two results, again by `t`.

use anyhow::Context;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use rangescan::DepthSnapshot;
use std::path::Path;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const YELLOW: Rgba<u8> = Rgba([255, 235, 4, 255]);
pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Min and max of the hit cells of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl DepthRange {
    /// `None` when no cell of the snapshot is a hit.
    pub fn from_snapshot(snapshot: &DepthSnapshot) -> Option<Self> {
        snapshot
            .samples()
            .iter()
            .filter_map(|s| s.distance())
            .fold(None, |range, d| match range {
                None => Some(DepthRange { min: d, max: d }),
                Some(DepthRange { min, max }) => Some(DepthRange {
                    min: min.min(d),
                    max: max.max(d),
                }),
            })
    }

    /// The squared, inverted ramp position of `value`. A flat range maps
    /// everything to 1.
    pub fn ramp(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        let normalized = if span > 0.0 {
            ((value - self.min) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let inverted = 1.0 - normalized;
        inverted * inverted
    }
}

/// Four endpoint colors and a background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthColorMap {
    pub near_from: Rgba<u8>,
    pub near_to: Rgba<u8>,
    pub far_from: Rgba<u8>,
    pub far_to: Rgba<u8>,
    /// Color of no-hit cells.
    pub background: Rgba<u8>,
}

impl Default for DepthColorMap {
    fn default() -> Self {
        Self {
            near_from: WHITE,
            near_to: YELLOW,
            far_from: RED,
            far_to: BLUE,
            background: BLACK,
        }
    }
}

impl DepthColorMap {
    pub fn color_for(&self, value: f32, range: &DepthRange) -> Rgba<u8> {
        let t = range.ramp(value);
        let near = lerp(self.near_from, self.near_to, t);
        let far = lerp(self.far_from, self.far_to, t);
        lerp(near, far, t)
    }

    /// Renders one image pixel per scan cell. Image row `y` is scan line `y`.
    pub fn render(&self, snapshot: &DepthSnapshot) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(snapshot.width(), snapshot.height(), self.background);
        let Some(range) = DepthRange::from_snapshot(snapshot) else {
            return image;
        };
        for (x, y, sample) in snapshot.iter() {
            if let Some(distance) = sample.distance() {
                image.put_pixel(x, y, self.color_for(distance, &range));
            }
        }
        image
    }
}

/// Component-wise `a + (b - a) * t`, rounded.
pub fn lerp(a: Rgba<u8>, b: Rgba<u8>, t: f32) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let mut out = [0u8; 4];
    for (i, channel) in out.iter_mut().enumerate() {
        let from = a.0[i] as f32;
        let to = b.0[i] as f32;
        *channel = (from + (to - from) * t).round() as u8;
    }
    Rgba(out)
}

/// Writes `image` as an RGBA PNG.
pub fn save_png(image: &RgbaImage, path: &Path) -> anyhow::Result<()> {
    let output = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let encoder = PngEncoder::new(std::io::BufWriter::new(output));
    encoder
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)
        .with_context(|| format!("encoding {}", path.display()))?;
    Ok(())
}
