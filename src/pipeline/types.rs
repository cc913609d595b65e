use glam::DVec2;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{wrap_degrees, Interval, Similarity, WorldPose, WorldRect};

/// Pixels cut from one image for one registration attempt.
#[derive(Debug, Clone)]
pub struct SubFrame {
    pub pixels: Array2<f64>,
    /// World rectangle covered by the pixel grid.
    pub rect: WorldRect,
    /// Pixels per world unit along x and y.
    pub density: DVec2,
}

impl SubFrame {
    /// Frame whose top-left pixel corner sits at `origin`.
    pub fn new(pixels: Array2<f64>, origin: DVec2, density: DVec2) -> Self {
        let (rows, cols) = pixels.dim();
        let size = DVec2::new(cols as f64, rows as f64) / density;
        Self {
            pixels,
            rect: WorldRect::new(origin.x, origin.y, origin.x + size.x, origin.y + size.y),
            density,
        }
    }

    pub fn empty(origin: DVec2, density: DVec2) -> Self {
        Self::new(Array2::zeros((0, 0)), origin, density)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.pixels.view()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.pixels.dim()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn origin(&self) -> DVec2 {
        self.rect.origin()
    }

    /// World units per pixel.
    pub fn pitch(&self) -> DVec2 {
        DVec2::ONE / self.density
    }
}

/// Why an estimate did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    /// Empty, constant, non-finite or too small to correlate.
    DegenerateFrame,
    /// A decoded candidate fell outside the configured ranges.
    OutOfRange,
    /// The rotation/scale residual was still moving when the iterations ran out.
    NotConverged,
    /// The final correlation peak did not clear the peak-to-sidelobe threshold.
    WeakPeak,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Failure::DegenerateFrame => "degenerate frame",
            Failure::OutOfRange => "estimate out of range",
            Failure::NotConverged => "rotation/scale did not converge",
            Failure::WeakPeak => "weak correlation peak",
        };
        f.write_str(text)
    }
}

/// Result of correlating a target frame against a reference frame.
///
/// Describes `target ≈ reference` rotated by `angle` degrees (counter-clockwise as
/// displayed), scaled by `scale` and shifted by `translation = (dy, dx)` pixels of the
/// matched grid, all about the frame center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformEstimate {
    pub success: bool,
    pub angle: f64,
    pub scale: f64,
    pub translation: (f64, f64),
    pub peak_ratio: f64,
    pub iterations: usize,
    pub failure: Option<Failure>,
    pub processing_time_ms: f64,
}

impl TransformEstimate {
    pub fn identity() -> Self {
        Self {
            success: true,
            angle: 0.0,
            scale: 1.0,
            translation: (0.0, 0.0),
            peak_ratio: 0.0,
            iterations: 0,
            failure: None,
            processing_time_ms: 0.0,
        }
    }

    pub fn failed(failure: Failure, best: Similarity, bounds: &EstimatorBounds) -> Self {
        let clamped = bounds.clamp(&best);
        Self {
            success: false,
            angle: clamped.angle,
            scale: clamped.scale,
            translation: clamped.translation,
            peak_ratio: 0.0,
            iterations: 0,
            failure: Some(failure),
            processing_time_ms: 0.0,
        }
    }

    pub fn similarity(&self) -> Similarity {
        Similarity::new(self.angle, self.scale, self.translation)
    }

    /// The correction that maps the target frame onto the reference frame.
    pub fn inverse(&self) -> TransformEstimate {
        let inverse = self.similarity().inverse();
        TransformEstimate {
            angle: inverse.angle,
            scale: inverse.scale,
            translation: inverse.translation,
            ..self.clone()
        }
    }
}

/// Admissible ranges for the estimator. Translation bounds are in matched pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorBounds {
    pub angle: Interval,
    pub scale: Interval,
    pub tx: Interval,
    pub ty: Interval,
}

impl Default for EstimatorBounds {
    fn default() -> Self {
        Self {
            angle: Interval::new(-20.0, 20.0),
            scale: Interval::new(0.7, 1.3),
            tx: Interval::new(-50.0, 50.0),
            ty: Interval::new(-50.0, 50.0),
        }
    }
}

impl EstimatorBounds {
    /// Representation of `angle` (modulo 360) that lies inside the angle range.
    pub fn admit_angle(&self, angle: f64) -> Option<f64> {
        [angle, angle - 360.0, angle + 360.0]
            .into_iter()
            .find(|a| self.angle.contains(*a))
    }

    /// Bounds grown by `angle` degrees, a factor of `exp(log_scale)` on either side of the
    /// scale range and `shift` pixels of translation.
    pub fn with_slack(&self, angle: f64, log_scale: f64, shift: f64) -> EstimatorBounds {
        let factor = log_scale.exp();
        EstimatorBounds {
            angle: self.angle.widen(angle),
            scale: Interval::new(self.scale.min / factor, self.scale.max * factor),
            tx: self.tx.widen(shift),
            ty: self.ty.widen(shift),
        }
    }

    pub fn admits(&self, similarity: &Similarity) -> bool {
        self.admit_angle(similarity.angle).is_some()
            && self.scale.contains(similarity.scale)
            && self.ty.contains(similarity.translation.0)
            && self.tx.contains(similarity.translation.1)
    }

    pub fn clamp(&self, similarity: &Similarity) -> Similarity {
        let angle = match self.admit_angle(similarity.angle) {
            Some(a) => a,
            None => {
                let wrapped = wrap_degrees(similarity.angle);
                let shifted = [wrapped, wrapped - 360.0, wrapped + 360.0]
                    .into_iter()
                    .min_by(|a, b| {
                        self.angle.distance(*a).total_cmp(&self.angle.distance(*b))
                    })
                    .unwrap_or(wrapped);
                self.angle.clamp(shifted)
            }
        };
        Similarity {
            angle,
            scale: self.scale.clamp(similarity.scale),
            translation: (
                self.ty.clamp(similarity.translation.0),
                self.tx.clamp(similarity.translation.1),
            ),
        }
    }
}

/// Pitch agreement reached by the scale reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Pixels per world unit of the grid the estimate is measured on.
    pub matched_density: DVec2,
    /// Target over reference density after resampling; 1 when fully equalized.
    pub ratio: f64,
}

impl Reconciliation {
    pub fn identity(density: DVec2) -> Self {
        Self { matched_density: density, ratio: 1.0 }
    }

    /// Convert a matched-grid `(dy, dx)` shift to a world `(x, y)` offset.
    pub fn to_world_units(&self, translation: (f64, f64)) -> DVec2 {
        DVec2::new(translation.1, translation.0) / self.matched_density
    }
}

/// Points in a registration attempt where intermediate frames can be inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ReferenceExtracted,
    TargetExtracted,
    ReferenceReconciled,
    TargetReconciled,
    TargetShapeMatched,
    TargetAligned,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::ReferenceExtracted => "reference_extracted",
            Stage::TargetExtracted => "target_extracted",
            Stage::ReferenceReconciled => "reference_reconciled",
            Stage::TargetReconciled => "target_reconciled",
            Stage::TargetShapeMatched => "target_shape_matched",
            Stage::TargetAligned => "target_aligned",
        }
    }
}

/// What one registration attempt produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub estimate: TransformEstimate,
    pub new_pose: Option<WorldPose>,
    pub roi: WorldRect,
    pub reconciliation: Reconciliation,
}

impl RegistrationOutcome {
    /// Write the new pose into `image` when the attempt succeeded. Returns whether it did.
    pub fn apply_to(&self, image: &mut crate::data::FieldImage) -> bool {
        match self.new_pose {
            Some(pose) => {
                image.set_pose(pose);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subframe_rect_follows_shape() {
        let frame = SubFrame::new(Array2::zeros((10, 20)), DVec2::new(1.0, 2.0), DVec2::splat(2.0));
        assert_eq!(frame.rect, WorldRect::new(1.0, 2.0, 11.0, 7.0));
        assert_eq!(frame.pitch(), DVec2::splat(0.5));
    }

    #[test]
    fn test_inverse_estimate_roundtrip() {
        let estimate = TransformEstimate {
            angle: 7.0,
            scale: 1.2,
            translation: (3.0, -1.0),
            ..TransformEstimate::identity()
        };
        let back = estimate.inverse().inverse();
        assert!((back.angle - 7.0).abs() < 1e-12);
        assert!((back.scale - 1.2).abs() < 1e-12);
        assert!((back.translation.0 - 3.0).abs() < 1e-9);
        assert!((back.translation.1 + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_admit_wrapped_angles() {
        let bounds = EstimatorBounds {
            angle: Interval::new(170.0, 190.0),
            ..EstimatorBounds::default()
        };
        assert_eq!(bounds.admit_angle(-175.0), Some(185.0));
        assert_eq!(bounds.admit_angle(10.0), None);
    }

    #[test]
    fn test_clamp_stays_inside_bounds() {
        let bounds = EstimatorBounds {
            angle: Interval::new(0.0, 20.0),
            scale: Interval::new(1.0, 1.2),
            tx: Interval::new(0.0, 10.0),
            ty: Interval::new(0.0, 10.0),
        };
        let clamped = bounds.clamp(&Similarity::new(-30.0, 0.5, (-4.0, 40.0)));
        assert_eq!(clamped.angle, 0.0);
        assert_eq!(clamped.scale, 1.0);
        assert_eq!(clamped.translation, (0.0, 10.0));
        assert!(bounds.admits(&clamped));
    }

    #[test]
    fn test_slack_widens_every_range() {
        let bounds = EstimatorBounds::default().with_slack(0.5, 0.1f64.ln_1p(), 0.5);
        assert_eq!(bounds.angle, Interval::new(-20.5, 20.5));
        assert!((bounds.scale.min - 0.7 / 1.1).abs() < 1e-12);
        assert!((bounds.scale.max - 1.3 * 1.1).abs() < 1e-12);
        assert!(bounds.admits(&Similarity::new(20.3, 1.35, (-50.4, 50.4))));
        assert!(!bounds.admits(&Similarity::new(0.0, 1.0, (0.0, 50.6))));
    }

    #[test]
    fn test_to_world_units_uses_matched_pitch() {
        let reconciliation = Reconciliation::identity(DVec2::new(2.0, 4.0));
        assert_eq!(reconciliation.to_world_units((8.0, 4.0)), DVec2::new(2.0, 2.0));
    }
}
