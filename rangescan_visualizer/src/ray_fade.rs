// THEORY:
// `RayFadeTracker` is the on-screen echo of the scanner: every scanned ray
// lights up and then fades out over exactly one scan line's worth of time, so
// a viewer sees a short sweeping fan following the scan cursor.
//
// It is a pure observer. It learns about rays only through `PixelScan`
// events and is aged by its own `update` calls from the variable-step phase,
// so it never touches, or waits on, the scan engine.

use image::Rgba;
use nalgebra::Vector3;
use rangescan::{PixelScan, ScanCoordinate, ScanGeometry};
use std::collections::HashMap;
use std::time::Duration;

pub const RAY_START_COLOR: Rgba<u8> = Rgba([255, 128, 38, 255]);
pub const RAY_END_COLOR: Rgba<u8> = Rgba([255, 38, 128, 255]);

/// A ray that is still visible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveRay {
    pub coord: ScanCoordinate,
    /// Device-frame segment, clipped to the hit distance when there was one.
    pub segment: Vector3<f32>,
    /// 1 right after the scan, falling linearly to 0.
    pub alpha: f32,
    pub start_color: Rgba<u8>,
    pub end_color: Rgba<u8>,
}

#[derive(Debug, Clone, Copy)]
struct FadingRay {
    segment: Vector3<f32>,
    remaining: Duration,
}

pub struct RayFadeTracker {
    fade_time: Duration,
    rays: HashMap<ScanCoordinate, FadingRay>,
}

impl RayFadeTracker {
    pub fn new(fade_time: Duration) -> Self {
        Self {
            fade_time,
            rays: HashMap::new(),
        }
    }

    /// Fade time of one scan line: `width × pixel period`.
    pub fn for_geometry(geometry: &ScanGeometry) -> Self {
        Self::new(geometry.line_period())
    }

    /// Lights up (or re-lights) the ray of a scanned pixel.
    pub fn record(&mut self, event: &PixelScan) {
        let segment = match event.sample.distance() {
            Some(distance) => event.ray.normalize() * distance,
            None => event.ray,
        };
        self.rays.insert(
            event.coord,
            FadingRay {
                segment,
                remaining: self.fade_time,
            },
        );
    }

    /// Ages every ray by `delta` and drops the ones that ran out.
    pub fn update(&mut self, delta: Duration) {
        self.rays.retain(|_, ray| {
            ray.remaining = ray.remaining.saturating_sub(delta);
            !ray.remaining.is_zero()
        });
    }

    /// Visible rays in raster order.
    pub fn active_rays(&self) -> Vec<ActiveRay> {
        let fade = self.fade_time.as_secs_f32();
        let mut rays: Vec<ActiveRay> = self
            .rays
            .iter()
            .map(|(coord, ray)| {
                let alpha = if fade > 0.0 { ray.remaining.as_secs_f32() / fade } else { 0.0 };
                ActiveRay {
                    coord: *coord,
                    segment: ray.segment,
                    alpha,
                    start_color: with_alpha(RAY_START_COLOR, alpha),
                    end_color: with_alpha(RAY_END_COLOR, alpha),
                }
            })
            .collect();
        rays.sort_by_key(|ray| (ray.coord.y, ray.coord.x));
        rays
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn fade_time(&self) -> Duration {
        self.fade_time
    }
}

fn with_alpha(color: Rgba<u8>, alpha: f32) -> Rgba<u8> {
    let Rgba([r, g, b, a]) = color;
    Rgba([r, g, b, (a as f32 * alpha.clamp(0.0, 1.0)).round() as u8])
}
