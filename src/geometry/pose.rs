use glam::{DMat2, DVec2};
use serde::{Deserialize, Serialize};

use super::{rotation_matrix, Outline, WorldRect};
use crate::error::{RegistrationError, RegistrationResult};

/// Placement of a pixel array on the world canvas.
///
/// A continuous local coordinate `u = (column, row)` maps to
/// `position + R(rotation) * diag(scale) * u`, so the rotation pivots about the
/// top-left anchor. `scale` is world units per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPose {
    pub position: DVec2,
    /// Degrees, clockwise as displayed.
    pub rotation: f64,
    pub scale: DVec2,
}

impl Default for WorldPose {
    fn default() -> Self {
        Self {
            position: DVec2::ZERO,
            rotation: 0.0,
            scale: DVec2::ONE,
        }
    }
}

impl WorldPose {
    pub fn new(position: DVec2, rotation: f64, scale: DVec2) -> RegistrationResult<Self> {
        let pose = Self { position, rotation, scale };
        pose.validate()?;
        Ok(pose)
    }

    /// Pose whose unrotated footprint is `outline`.
    pub fn from_outline(outline: &Outline, shape: (usize, usize), rotation: f64) -> Self {
        Self {
            position: DVec2::new(outline.xmin.min(outline.xmax), outline.ymin.min(outline.ymax)),
            rotation,
            scale: outline.pixel_dimension(shape),
        }
    }

    pub fn validate(&self) -> RegistrationResult<()> {
        if !self.position.is_finite() || !self.rotation.is_finite() {
            return Err(RegistrationError::InvalidConfig(format!(
                "pose must be finite, got position={:?} rotation={}",
                self.position, self.rotation
            )));
        }
        if !self.scale.is_finite() || self.scale.x <= 0.0 || self.scale.y <= 0.0 {
            return Err(RegistrationError::InvalidConfig(format!(
                "pose scale must be positive, got {:?}",
                self.scale
            )));
        }
        Ok(())
    }

    pub fn linear(&self) -> DMat2 {
        rotation_matrix(self.rotation) * DMat2::from_diagonal(self.scale)
    }

    pub fn local_to_world(&self, local: DVec2) -> DVec2 {
        self.position + self.linear() * local
    }

    /// Undo translation, then rotation, then scale.
    pub fn world_to_local(&self, world: DVec2) -> DVec2 {
        let unrotated = rotation_matrix(-self.rotation) * (world - self.position);
        unrotated / self.scale
    }

    /// Pixels per world unit along the image's own axes.
    pub fn density(&self) -> DVec2 {
        DVec2::ONE / self.scale
    }

    /// World positions of the four pixel-array corners.
    pub fn footprint(&self, shape: (usize, usize)) -> [DVec2; 4] {
        let (rows, cols) = (shape.0 as f64, shape.1 as f64);
        [
            self.local_to_world(DVec2::ZERO),
            self.local_to_world(DVec2::new(cols, 0.0)),
            self.local_to_world(DVec2::new(cols, rows)),
            self.local_to_world(DVec2::new(0.0, rows)),
        ]
    }

    /// Axis-aligned bounds of the rotated footprint.
    pub fn displayed_bounds(&self, shape: (usize, usize)) -> WorldRect {
        WorldRect::from_points(&self.footprint(shape))
    }
}
