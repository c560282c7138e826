// THEORY:
// The depth buffer is the rangefinder's working memory: one distance sample per
// scan cell, overwritten forever in raster order. Two types keep writers and
// readers apart.
//
// 1.  **`DepthBuffer`** is the live grid. Only the scan engine owns it and only
//     the scan engine writes to it, one cell at a time.
// 2.  **`DepthSnapshot`** is a deep copy taken at a frame boundary (or on
//     demand). It is frozen: the engine keeps scanning into the live grid while
//     consumers read the snapshot, so they can never observe a half-written
//     frame. The copy is stored behind an `Arc<[_]>` so every subscriber of the
//     same frame shares one allocation.
//
// A sample is a tagged union rather than a magic float. The raw `-1.0` sentinel
// only appears at the edge, for consumers that want plain numbers.

use crate::core_modules::geometry::ScanCoordinate;
use std::sync::Arc;

/// Raw value used for "no hit" when a sample is flattened to a plain number.
pub const NO_HIT_SENTINEL: f32 = -1.0;

/// One depth measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DepthSample {
    /// Nothing was detected within range.
    #[default]
    NoHit,
    /// Distance to the first surface along the ray.
    Range(f32),
}

impl DepthSample {
    /// Builds a sample from a sampler distance; anything that is not a finite
    /// distance in `[0, max_range]` degrades to [`DepthSample::NoHit`].
    pub fn from_distance(distance: f32, max_range: f32) -> Self {
        if distance.is_finite() && distance >= 0.0 && distance <= max_range {
            DepthSample::Range(distance)
        } else {
            DepthSample::NoHit
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            DepthSample::Range(d) => Some(*d),
            DepthSample::NoHit => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, DepthSample::Range(_))
    }

    pub fn to_raw(&self) -> f32 {
        self.distance().unwrap_or(NO_HIT_SENTINEL)
    }

    pub fn from_raw(raw: f32) -> Self {
        if raw < 0.0 || !raw.is_finite() {
            DepthSample::NoHit
        } else {
            DepthSample::Range(raw)
        }
    }
}

/// The engine's live, mutable grid of samples.
#[derive(Debug)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    cells: Vec<DepthSample>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![DepthSample::NoHit; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Stores `sample` at `coord`. Returns `false`, leaving the buffer
    /// untouched, when `coord` lies outside the grid.
    pub fn write(&mut self, coord: ScanCoordinate, sample: DepthSample) -> bool {
        if coord.x >= self.width || coord.y >= self.height {
            return false;
        }
        let index = coord.index(self.width);
        self.cells[index] = sample;
        true
    }

    pub fn get(&self, coord: ScanCoordinate) -> Option<DepthSample> {
        if coord.x >= self.width || coord.y >= self.height {
            return None;
        }
        self.cells.get(coord.index(self.width)).copied()
    }

    /// Deep copy of the current contents.
    pub fn snapshot(&self) -> DepthSnapshot {
        DepthSnapshot {
            width: self.width,
            height: self.height,
            cells: Arc::from(self.cells.as_slice()),
        }
    }
}

/// An immutable copy of a depth buffer, in raster order.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSnapshot {
    width: u32,
    height: u32,
    cells: Arc<[DepthSample]>,
}

impl DepthSnapshot {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<DepthSample> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(ScanCoordinate::new(x, y).index(self.width)).copied()
    }

    pub fn samples(&self) -> &[DepthSample] {
        &self.cells
    }

    /// Iterates `(x, y, sample)` in raster order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, DepthSample)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, s)| ((i as u32) % width, (i as u32) / width, *s))
    }

    /// The flat wire form: distances, with [`NO_HIT_SENTINEL`] for misses.
    pub fn to_raw(&self) -> Vec<f32> {
        self.cells.iter().map(DepthSample::to_raw).collect()
    }

    pub fn hit_count(&self) -> usize {
        self.cells.iter().filter(|s| s.is_hit()).count()
    }
}
