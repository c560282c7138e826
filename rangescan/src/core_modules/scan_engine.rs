// THEORY:
// The `ScanEngine` is the rangefinder itself. It turns a stream of elapsed-time
// slices into a raster sweep of ray casts and publishes what it sees.
//
// Key architectural principles:
// 1.  **Fixed Pixel Rate**: Time goes through a `ScanClock`. `advance` loops for
//     as long as the clock releases ticks, so a caller handing over a large
//     delta gets every pixel it paid for in one call, and the leftover carries
//     into the next call.
// 2.  **Scan, Then Step**: Each tick scans the cell under the cursor and only
//     then moves the cursor. When the cursor wraps to the origin, the last cell
//     of the frame has already been written, so the frame is complete.
// 3.  **Exclusive Ownership**: The live `DepthBuffer` never leaves the engine.
//     Buffer-ready subscribers get a `DepthSnapshot`, which is a deep copy.
// 4.  **Synchronous Observers**: Subscribers register boxed closures in three
//     append-only lists (ball hits, pixel scans, buffer ready). They run in
//     registration order, inside the tick that produced the event, so every
//     ball hit of a step is delivered before that step's buffer-ready event.
//     Handlers cannot reach back into the engine, which rules out re-entrant
//     frame completion.

use crate::config::ScanConfig;
use crate::core_modules::depth_buffer::{DepthBuffer, DepthSample, DepthSnapshot};
use crate::core_modules::geometry::{ScanCoordinate, ScanGeometry};
use crate::core_modules::sampler::RangeSampler;
use crate::core_modules::scan_clock::ScanClock;
use crate::core_modules::scan_pattern::ScanPattern;
use crate::error::Result;
use nalgebra::{Isometry3, Point3, Vector3};
use std::time::Duration;
use tracing::{debug, trace};

/// Default tag prefix for objects that raise ball-hit events.
pub const DEFAULT_TARGET_PREFIX: &str = "Ball";

/// A ray hit an object in the target category.
#[derive(Debug, Clone, PartialEq)]
pub struct BallHit {
    /// World-space hit point.
    pub position: Point3<f32>,
    pub tag: String,
}

/// One cell was (re)written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelScan {
    pub coord: ScanCoordinate,
    pub sample: DepthSample,
    /// Device-frame ray that produced the sample.
    pub ray: Vector3<f32>,
}

type BallHitHandler = Box<dyn FnMut(&BallHit)>;
type PixelScanHandler = Box<dyn FnMut(&PixelScan)>;
type BufferReadyHandler = Box<dyn FnMut(&DepthSnapshot)>;

/// Drives the pixel clock, casts rays and publishes depth frames.
pub struct ScanEngine {
    pattern: ScanPattern,
    clock: ScanClock,
    buffer: DepthBuffer,
    /// Copy of the most recently completed frame.
    last_frame: DepthSnapshot,
    cursor: ScanCoordinate,
    target_prefix: String,
    pixels_scanned: u64,
    frames_completed: u64,
    ball_hit_handlers: Vec<BallHitHandler>,
    pixel_scan_handlers: Vec<PixelScanHandler>,
    buffer_ready_handlers: Vec<BufferReadyHandler>,
}

impl ScanEngine {
    pub fn new(geometry: ScanGeometry) -> Self {
        let clock = ScanClock::new(geometry.pixel_period());
        let buffer = DepthBuffer::new(geometry.width(), geometry.height());
        let last_frame = buffer.snapshot();
        Self {
            pattern: ScanPattern::new(geometry),
            clock,
            buffer,
            last_frame,
            cursor: ScanCoordinate::ORIGIN,
            target_prefix: DEFAULT_TARGET_PREFIX.to_string(),
            pixels_scanned: 0,
            frames_completed: 0,
            ball_hit_handlers: Vec::new(),
            pixel_scan_handlers: Vec::new(),
            buffer_ready_handlers: Vec::new(),
        }
    }

    /// Validates `config` and builds an engine from it.
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let geometry = ScanGeometry::new(config)?;
        Ok(Self::new(geometry).with_target_prefix(&config.target_prefix))
    }

    pub fn with_target_prefix(mut self, prefix: &str) -> Self {
        self.target_prefix = prefix.to_string();
        self
    }

    pub fn on_ball_hit(&mut self, handler: impl FnMut(&BallHit) + 'static) {
        self.ball_hit_handlers.push(Box::new(handler));
    }

    pub fn on_pixel_scan(&mut self, handler: impl FnMut(&PixelScan) + 'static) {
        self.pixel_scan_handlers.push(Box::new(handler));
    }

    pub fn on_buffer_ready(&mut self, handler: impl FnMut(&DepthSnapshot) + 'static) {
        self.buffer_ready_handlers.push(Box::new(handler));
    }

    /// Feeds `delta` into the pixel clock and scans every pixel it pays for.
    /// Returns the number of pixels scanned during this call.
    pub fn advance<S: RangeSampler + ?Sized>(
        &mut self,
        delta: Duration,
        pose: &Isometry3<f32>,
        sampler: &S,
    ) -> usize {
        self.clock.accumulate(delta);

        let mut scanned = 0;
        while self.clock.try_tick() {
            let coord = self.cursor;
            // The cursor never leaves the grid, so this always scans.
            self.scan_pixel_at(coord, pose, sampler);
            scanned += 1;

            if self.cursor.advance(self.pattern.geometry()) {
                self.complete_frame();
            }
        }
        scanned
    }

    /// Casts the ray for `coord` from `pose` and records the result.
    ///
    /// Returns `None` without casting or emitting events when `coord` lies
    /// outside the grid.
    pub fn scan_pixel_at<S: RangeSampler + ?Sized>(
        &mut self,
        coord: ScanCoordinate,
        pose: &Isometry3<f32>,
        sampler: &S,
    ) -> Option<DepthSample> {
        if !self.pattern.geometry().contains(coord) {
            trace!(x = coord.x, y = coord.y, "coordinate outside the scan grid, skipped");
            return None;
        }

        let max_range = self.pattern.geometry().max_range();
        let local_ray = self.pattern.ray_for(coord);
        let origin = Point3::from(pose.translation.vector);
        let direction = (pose.rotation * local_ray).normalize();

        let hit = sampler.cast(origin, direction, max_range);
        let sample = match &hit {
            Some(hit) => DepthSample::from_distance(hit.distance, max_range),
            None => DepthSample::NoHit,
        };

        if let (Some(hit), DepthSample::NoHit) = (&hit, sample) {
            trace!(
                x = coord.x,
                y = coord.y,
                distance = hit.distance,
                "sampler distance outside [0, max range], recording no hit"
            );
        }

        self.buffer.write(coord, sample);
        self.pixels_scanned += 1;

        if let (Some(hit), DepthSample::Range(distance)) = (hit, sample) {
            if hit.tag.starts_with(&self.target_prefix) {
                let event = BallHit {
                    position: origin + direction * distance,
                    tag: hit.tag,
                };
                for handler in self.ball_hit_handlers.iter_mut() {
                    handler(&event);
                }
            }
        }

        let event = PixelScan {
            coord,
            sample,
            ray: local_ray,
        };
        for handler in self.pixel_scan_handlers.iter_mut() {
            handler(&event);
        }

        Some(sample)
    }

    fn complete_frame(&mut self) {
        self.frames_completed += 1;
        let snapshot = self.buffer.snapshot();
        debug!(
            frame = self.frames_completed,
            hits = snapshot.hit_count(),
            "depth frame complete"
        );

        for handler in self.buffer_ready_handlers.iter_mut() {
            handler(&snapshot);
        }
        self.last_frame = snapshot;
    }

    /// The most recently completed frame; all cells are `NoHit` until the
    /// first frame completes. Never contains cells of the frame in progress.
    pub fn buffer_snapshot(&self) -> DepthSnapshot {
        self.last_frame.clone()
    }

    /// Deep copy of the live buffer, mixing the frame in progress with the
    /// tail of the previous one.
    pub fn live_snapshot(&self) -> DepthSnapshot {
        self.buffer.snapshot()
    }

    pub fn buffer_size(&self) -> (u32, u32) {
        (self.buffer.width(), self.buffer.height())
    }

    /// The cell the next tick will scan.
    pub fn current_coordinate(&self) -> ScanCoordinate {
        self.cursor
    }

    pub fn pixels_scanned(&self) -> u64 {
        self.pixels_scanned
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    pub fn pending_time(&self) -> Duration {
        self.clock.pending()
    }

    pub fn geometry(&self) -> &ScanGeometry {
        self.pattern.geometry()
    }

    pub fn pattern(&self) -> &ScanPattern {
        &self.pattern
    }
}
