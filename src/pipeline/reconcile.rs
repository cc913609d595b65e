use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{ImageTransformer, Interpolation};
use crate::geometry::{Axis, Outline};
use crate::pipeline::{Reconciliation, SubFrame};

/// Which frame gets resampled when pixel pitches differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStrategy {
    /// Bring the coarser frame up to the finer pitch, per axis.
    #[default]
    Finer,
    /// Resample the target onto the reference pitch.
    ToReference,
    /// Resample the reference onto the target pitch.
    ToTarget,
}

/// Density inputs for one side of a registration.
#[derive(Debug, Clone, Copy)]
pub struct DensitySource<'a> {
    pub outline: &'a Outline,
    pub shape: (usize, usize),
}

/// Brings two sub-frames to a common physical pixel pitch.
#[derive(Debug, Clone, Default)]
pub struct ScaleReconciler {
    pub strategy: ReconcileStrategy,
    pub interpolation: Interpolation,
}

impl ScaleReconciler {
    pub fn new(strategy: ReconcileStrategy, interpolation: Interpolation) -> Self {
        Self { strategy, interpolation }
    }

    /// `density(reference) / density(target)` per axis from the image outlines;
    /// `None` on an axis where either outline is degenerate.
    pub fn ratio(reference: DensitySource<'_>, target: DensitySource<'_>) -> (Option<f64>, Option<f64>) {
        let axis_ratio = |axis: Axis| -> Option<f64> {
            let r = reference.outline.axis_density(axis, reference.shape)?;
            let t = target.outline.axis_density(axis, target.shape)?;
            Some(r / t)
        };
        (axis_ratio(Axis::X), axis_ratio(Axis::Y))
    }

    /// Resample so both frames share one pixel pitch.
    ///
    /// Axes whose outline is degenerate on either side are left alone. The returned
    /// [`Reconciliation`] carries the reference grid's density and the factor that
    /// cancels whatever pitch mismatch remains between the two grids.
    pub fn reconcile(
        &self,
        reference: SubFrame,
        target: SubFrame,
        reference_source: DensitySource<'_>,
        target_source: DensitySource<'_>,
    ) -> (SubFrame, SubFrame, Reconciliation) {
        let (rx, ry) = Self::ratio(reference_source, target_source);

        let matched = |r: Option<f64>, ref_density: f64, target_density: f64| -> (f64, f64) {
            match r {
                None => (ref_density, target_density),
                Some(_) => {
                    let d = match self.strategy {
                        ReconcileStrategy::Finer => ref_density.max(target_density),
                        ReconcileStrategy::ToReference => ref_density,
                        ReconcileStrategy::ToTarget => target_density,
                    };
                    (d, d)
                }
            }
        };

        let (ref_dx, target_dx) = matched(rx, reference.density.x, target.density.x);
        let (ref_dy, target_dy) = matched(ry, reference.density.y, target.density.y);

        debug!(
            ratio_x = ?rx,
            ratio_y = ?ry,
            strategy = ?self.strategy,
            "Reconciling pixel pitch"
        );

        let reference = self.resample(reference, DVec2::new(ref_dx, ref_dy));
        let target = self.resample(target, DVec2::new(target_dx, target_dy));

        let residual = target.density / reference.density;
        let reconciliation = Reconciliation {
            matched_density: reference.density,
            ratio: (residual.x * residual.y).sqrt(),
        };
        (reference, target, reconciliation)
    }

    fn resample(&self, frame: SubFrame, density: DVec2) -> SubFrame {
        if frame.is_empty() {
            return SubFrame::empty(frame.origin(), density);
        }
        let (rows, cols) = frame.shape();
        let factor = density / frame.density;
        let out_rows = ((rows as f64 * factor.y).round() as usize).max(1);
        let out_cols = ((cols as f64 * factor.x).round() as usize).max(1);
        if (out_rows, out_cols) == (rows, cols) {
            return frame;
        }

        let pixels = ImageTransformer::resize(frame.view(), (out_rows, out_cols), self.interpolation);
        // rounding leaves the true density slightly off the requested one
        let actual = frame.density * DVec2::new(out_cols as f64 / cols as f64, out_rows as f64 / rows as f64);
        SubFrame::new(pixels, frame.origin(), actual)
    }
}
