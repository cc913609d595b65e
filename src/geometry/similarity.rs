use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::rotation_matrix;

/// Rotation, uniform scale and shift of a pixel frame about its center.
///
/// `angle` is counter-clockwise as displayed; `translation` is `(dy, dx)` in pixels.
/// Applied to a pixel coordinate `q = (x, y)` this is
/// `c + scale * R(-angle) * (q - c) + (dx, dy)` with `c = ((w-1)/2, (h-1)/2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Similarity {
    pub angle: f64,
    pub scale: f64,
    pub translation: (f64, f64),
}

impl Default for Similarity {
    fn default() -> Self {
        Self::identity()
    }
}

impl Similarity {
    pub fn new(angle: f64, scale: f64, translation: (f64, f64)) -> Self {
        Self { angle, scale, translation }
    }

    pub fn identity() -> Self {
        Self { angle: 0.0, scale: 1.0, translation: (0.0, 0.0) }
    }

    /// Shift as an `(x, y)` vector.
    pub fn shift(&self) -> DVec2 {
        DVec2::new(self.translation.1, self.translation.0)
    }

    pub fn apply(&self, q: DVec2, center: DVec2) -> DVec2 {
        center + self.scale * (rotation_matrix(-self.angle) * (q - center)) + self.shift()
    }

    pub fn inverse(&self) -> Similarity {
        let shift = -(rotation_matrix(self.angle) * self.shift()) / self.scale;
        Similarity {
            angle: -self.angle,
            scale: 1.0 / self.scale,
            translation: (shift.y, shift.x),
        }
    }
}

/// Geometric center of a (rows, cols) frame in pixel coordinates.
pub fn frame_center(shape: (usize, usize)) -> DVec2 {
    DVec2::new((shape.1 as f64 - 1.0) * 0.5, (shape.0 as f64 - 1.0) * 0.5)
}
