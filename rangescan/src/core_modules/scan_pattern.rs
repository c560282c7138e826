// THEORY:
// `ScanPattern` maps a scan coordinate to a ray direction in the device frame.
// The device looks along +Z with +Y up. Column 0 sits at the left edge of the
// horizontal fan, line 0 on the horizon, and later lines tilt further down.
//
// Key architectural principles:
// 1.  **Far-Plane Vectors**: Returned rays are not normalized. Their Z component
//     is the max range, so the lateral offsets read directly as distances on
//     the far plane. The engine normalizes after rotating into world space.
// 2.  **Stateless**: The pattern only reads the geometry it owns.

use crate::core_modules::geometry::{ScanCoordinate, ScanGeometry};
use nalgebra::Vector3;

#[derive(Debug, Clone)]
pub struct ScanPattern {
    geometry: ScanGeometry,
}

impl ScanPattern {
    pub fn new(geometry: ScanGeometry) -> Self {
        Self { geometry }
    }

    pub fn ray_direction(&self, x: u32, y: u32) -> Vector3<f32> {
        let g = &self.geometry;
        Vector3::new(
            g.start_x() + x as f32 * g.step_x(),
            g.start_y() - y as f32 * g.step_y(),
            g.max_range(),
        )
    }

    pub fn ray_for(&self, coord: ScanCoordinate) -> Vector3<f32> {
        self.ray_direction(coord.x, coord.y)
    }

    pub fn geometry(&self) -> &ScanGeometry {
        &self.geometry
    }
}
