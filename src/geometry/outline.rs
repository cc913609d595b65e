use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::WorldPose;

/// Extents at or below this are treated as zero.
const DEGENERATE_EXTENT: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Unrotated physical footprint of a pixel array in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<(f64, f64)>,
}

impl Outline {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self { xmin, xmax, ymin, ymax, z: None }
    }

    pub fn with_z(mut self, zmin: f64, zmax: f64) -> Self {
        self.z = Some((zmin, zmax));
        self
    }

    /// Outline covered by `shape` (rows, cols) pixels placed with `pose`, ignoring rotation.
    pub fn from_pose(pose: &WorldPose, shape: (usize, usize), z: Option<(f64, f64)>) -> Self {
        let (rows, cols) = shape;
        Self {
            xmin: pose.position.x,
            xmax: pose.position.x + cols as f64 * pose.scale.x,
            ymin: pose.position.y,
            ymax: pose.position.y + rows as f64 * pose.scale.y,
            z,
        }
    }

    pub fn extent(&self) -> DVec2 {
        DVec2::new((self.xmax - self.xmin).abs(), (self.ymax - self.ymin).abs())
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new((self.xmin + self.xmax) * 0.5, (self.ymin + self.ymax) * 0.5)
    }

    pub fn is_degenerate(&self, axis: Axis) -> bool {
        let extent = self.extent();
        match axis {
            Axis::X => extent.x <= DEGENERATE_EXTENT,
            Axis::Y => extent.y <= DEGENERATE_EXTENT,
        }
    }

    /// Pixels per world unit along `axis`, or `None` when the outline has no extent there.
    pub fn axis_density(&self, axis: Axis, shape: (usize, usize)) -> Option<f64> {
        if self.is_degenerate(axis) {
            return None;
        }
        let extent = self.extent();
        Some(match axis {
            Axis::X => shape.1 as f64 / extent.x,
            Axis::Y => shape.0 as f64 / extent.y,
        })
    }

    /// Pixels per world unit; a degenerate axis reads as 1.
    pub fn density(&self, shape: (usize, usize)) -> DVec2 {
        DVec2::new(
            self.axis_density(Axis::X, shape).unwrap_or(1.0),
            self.axis_density(Axis::Y, shape).unwrap_or(1.0),
        )
    }

    /// World units per pixel.
    pub fn pixel_dimension(&self, shape: (usize, usize)) -> DVec2 {
        DVec2::ONE / self.density(shape)
    }
}

/// Axis-aligned world rectangle, always stored with `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl WorldRect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn from_points(points: &[DVec2]) -> Self {
        let mut min = DVec2::splat(f64::INFINITY);
        let mut max = DVec2::splat(f64::NEG_INFINITY);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        Self { x0: min.x, y0: min.y, x1: max.x, y1: max.y }
    }

    pub fn origin(&self) -> DVec2 {
        DVec2::new(self.x0, self.y0)
    }

    pub fn size(&self) -> DVec2 {
        DVec2::new(self.x1 - self.x0, self.y1 - self.y0)
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn is_empty(&self) -> bool {
        let size = self.size();
        !(size.x > 0.0 && size.y > 0.0)
    }

    pub fn intersect(&self, other: &WorldRect) -> Option<WorldRect> {
        let rect = WorldRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (!rect.is_empty()).then_some(rect)
    }

    /// Grow each side by `fraction` of the extent along that axis.
    pub fn expand(&self, fraction: f64) -> WorldRect {
        let pad = self.size() * fraction;
        WorldRect::new(self.x0 - pad.x, self.y0 - pad.y, self.x1 + pad.x, self.y1 + pad.y)
    }
}
