// THEORY:
// `ScanGeometry` is the frozen description of the rangefinder: how many pixels a
// scan line has, how many lines make a frame, how wide the fan of rays is and how
// long the device dwells on a single pixel. Everything downstream (the pixel
// clock, the ray pattern, the depth buffer) reads from it and nothing writes to
// it after construction.
//
// Key architectural principles:
// 1.  **Fail Fast**: The ray pattern divides by the resolution and takes the
//     tangent of half the field of view. A zero resolution, a degenerate field
//     of view or a zero period can never produce a sensible scan, so they are
//     rejected here instead of surfacing as NaNs or a clock that never ticks.
// 2.  **Derived Once**: The vertical field of view and the per-axis angular
//     steps are computed in the constructor and cached.
// 3.  **Raster Addressing**: `ScanCoordinate` is the cursor through the buffer.
//     It only knows how to step in raster order and to tell its owner when a
//     frame has wrapped around.

use crate::config::ScanConfig;
use crate::error::{RangeScanError, Result};
use std::time::Duration;

/// Immutable geometry of the scanning device, derived from a [`ScanConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScanGeometry {
    /// Pixels per scan line.
    width: u32,
    /// Scan lines per frame.
    height: u32,
    horizontal_fov_deg: f32,
    /// `horizontal_fov * (height / width)`.
    vertical_fov_deg: f32,
    max_range: f32,
    pixel_period: Duration,
    /// `pixel_period * width * height`, checked at construction.
    frame_period: Duration,
    step_x: f32,
    step_y: f32,
    /// Lateral offset of column 0; the fan is centered on the forward axis.
    start_x: f32,
    /// Vertical offset of line 0; the scan only looks forward and down.
    start_y: f32,
}

impl ScanGeometry {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        if config.scan_line_width == 0 {
            return Err(RangeScanError::ZeroResolution { axis: "scan line width" });
        }
        if config.scan_line_count == 0 {
            return Err(RangeScanError::ZeroResolution { axis: "scan line count" });
        }

        let horizontal_fov_deg = config.horizontal_fov_deg;
        if !(horizontal_fov_deg > 0.0 && horizontal_fov_deg < 180.0) {
            return Err(RangeScanError::FieldOfView {
                axis: "horizontal",
                degrees: horizontal_fov_deg,
            });
        }

        let vertical_fov_deg =
            horizontal_fov_deg * (config.scan_line_count as f32 / config.scan_line_width as f32);
        if vertical_fov_deg >= 180.0 {
            return Err(RangeScanError::FieldOfView {
                axis: "vertical",
                degrees: vertical_fov_deg,
            });
        }

        let max_range = config.max_ray_cast_distance;
        if !(max_range > 0.0 && max_range.is_finite()) {
            return Err(RangeScanError::MaxRange(max_range));
        }

        // A period that rounds down to zero nanoseconds would spin the clock forever.
        let pixel_period = Duration::try_from_secs_f64(config.pixel_scan_period_secs)
            .map_err(|_| RangeScanError::ScanPeriod)?;
        if pixel_period.is_zero() {
            return Err(RangeScanError::ScanPeriod);
        }

        let width = config.scan_line_width;
        let height = config.scan_line_count;
        let frame_period = width
            .checked_mul(height)
            .and_then(|pixels| pixel_period.checked_mul(pixels))
            .ok_or(RangeScanError::Resolution { width, height })?;

        let step_x = (horizontal_fov_deg / 2.0).to_radians().tan() * max_range / width as f32;
        let step_y = (vertical_fov_deg / 2.0).to_radians().tan() * max_range / height as f32;

        Ok(Self {
            width,
            height,
            horizontal_fov_deg,
            vertical_fov_deg,
            max_range,
            pixel_period,
            frame_period,
            step_x,
            step_y,
            start_x: -0.5 * width as f32 * step_x,
            start_y: 0.0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells in one frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn horizontal_fov_deg(&self) -> f32 {
        self.horizontal_fov_deg
    }

    pub fn vertical_fov_deg(&self) -> f32 {
        self.vertical_fov_deg
    }

    pub fn max_range(&self) -> f32 {
        self.max_range
    }

    pub fn pixel_period(&self) -> Duration {
        self.pixel_period
    }

    /// Time needed to sweep one full frame.
    pub fn frame_period(&self) -> Duration {
        self.frame_period
    }

    pub fn contains(&self, coord: ScanCoordinate) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    /// Time needed to sweep one scan line.
    pub fn line_period(&self) -> Duration {
        self.pixel_period * self.width
    }

    pub fn step_x(&self) -> f32 {
        self.step_x
    }

    pub fn step_y(&self) -> f32 {
        self.step_y
    }

    pub fn start_x(&self) -> f32 {
        self.start_x
    }

    pub fn start_y(&self) -> f32 {
        self.start_y
    }
}

/// A cell address in the depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScanCoordinate {
    pub x: u32,
    pub y: u32,
}

impl ScanCoordinate {
    pub const ORIGIN: ScanCoordinate = ScanCoordinate { x: 0, y: 0 };

    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Flat raster index of this cell for a buffer `width` cells wide.
    pub fn index(&self, width: u32) -> usize {
        self.y as usize * width as usize + self.x as usize
    }

    /// Steps to the next cell in raster order.
    /// Returns `true` when the cursor wrapped back to the origin, i.e. a frame completed.
    pub fn advance(&mut self, geometry: &ScanGeometry) -> bool {
        self.x += 1;
        if self.x < geometry.width() {
            return false;
        }
        self.x = 0;
        self.y += 1;
        if self.y < geometry.height() {
            return false;
        }
        self.y = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: u32, height: u32) -> ScanConfig {
        ScanConfig {
            scan_line_width: width,
            scan_line_count: height,
            horizontal_fov_deg: 90.0,
            pixel_scan_period_secs: 0.1,
            max_ray_cast_distance: 10.0,
            ..ScanConfig::default()
        }
    }

    #[test]
    fn derives_vertical_fov_from_aspect_ratio() {
        let geometry = ScanGeometry::new(&config(4, 2)).unwrap();
        assert!((geometry.vertical_fov_deg() - 45.0).abs() < 1e-5);
        // tan(45°) * 10 / 4
        assert!((geometry.step_x() - 2.5).abs() < 1e-5);
        assert!((geometry.start_x() + 5.0).abs() < 1e-5);
        assert_eq!(geometry.start_y(), 0.0);
        assert_eq!(geometry.pixel_period(), Duration::from_millis(100));
        assert_eq!(geometry.frame_period(), Duration::from_millis(800));
    }

    #[test]
    fn rejects_zero_resolution() {
        assert!(matches!(
            ScanGeometry::new(&config(0, 2)),
            Err(RangeScanError::ZeroResolution { .. })
        ));
        assert!(matches!(
            ScanGeometry::new(&config(4, 0)),
            Err(RangeScanError::ZeroResolution { .. })
        ));
    }

    #[test]
    fn rejects_degenerate_fov_period_and_range() {
        let mut bad_fov = config(4, 2);
        bad_fov.horizontal_fov_deg = 0.0;
        assert!(matches!(ScanGeometry::new(&bad_fov), Err(RangeScanError::FieldOfView { .. })));

        // 120° on a frame twice as tall as wide would need a 240° vertical fan.
        let mut tall = config(2, 4);
        tall.horizontal_fov_deg = 120.0;
        assert!(matches!(ScanGeometry::new(&tall), Err(RangeScanError::FieldOfView { .. })));

        let mut bad_period = config(4, 2);
        bad_period.pixel_scan_period_secs = 0.0;
        assert!(matches!(ScanGeometry::new(&bad_period), Err(RangeScanError::ScanPeriod)));
        bad_period.pixel_scan_period_secs = -1.0;
        assert!(matches!(ScanGeometry::new(&bad_period), Err(RangeScanError::ScanPeriod)));

        let mut bad_range = config(4, 2);
        bad_range.max_ray_cast_distance = 0.0;
        assert!(matches!(ScanGeometry::new(&bad_range), Err(RangeScanError::MaxRange(_))));
    }

    #[test]
    fn rejects_resolutions_whose_frame_overflows() {
        // 70000 * 70000 does not fit in a u32 cell count.
        assert!(matches!(
            ScanGeometry::new(&config(70_000, 70_000)),
            Err(RangeScanError::Resolution { width: 70_000, height: 70_000 })
        ));

        let mut slow = config(65_536, 65_535);
        slow.pixel_scan_period_secs = 1.0e10;
        assert!(matches!(ScanGeometry::new(&slow), Err(RangeScanError::Resolution { .. })));

        let geometry = ScanGeometry::new(&config(4, 2)).unwrap();
        assert_eq!(geometry.line_period(), Duration::from_millis(400));
        assert!(geometry.contains(ScanCoordinate::new(3, 1)));
        assert!(!geometry.contains(ScanCoordinate::new(4, 0)));
        assert!(!geometry.contains(ScanCoordinate::new(0, 2)));
    }

    #[test]
    fn coordinate_walks_in_raster_order_and_reports_wrap() {
        let geometry = ScanGeometry::new(&config(3, 2)).unwrap();
        let mut coord = ScanCoordinate::ORIGIN;
        let mut visited = vec![coord];
        let mut wraps = 0;
        for _ in 0..6 {
            if coord.advance(&geometry) {
                wraps += 1;
            }
            visited.push(coord);
        }
        assert_eq!(wraps, 1);
        assert_eq!(visited.last(), Some(&ScanCoordinate::ORIGIN));
        for pair in visited[..6].windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(a.y < b.y || (a.y == b.y && a.x < b.x));
        }
        assert_eq!(ScanCoordinate::new(2, 1).index(3), 5);
    }
}
