use glam::DVec2;
use instant::Instant;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use tracing::{debug, warn};

use crate::algorithms::log_polar::{LogPolarGrid, LogPolarTransform};
use crate::algorithms::phase_correlation::{locate_peak, CorrelationPeak, PhaseCorrelator};
use crate::config::EstimatorConfig;
use crate::data::{border_mean, Edge, ImageTransformer};
use crate::error::{RegistrationError, RegistrationResult};
use crate::geometry::{rotation_matrix, wrap_degrees, Similarity};
use crate::logging::EstimatorSpan;
use crate::pipeline::{CancelToken, EstimatorBounds, Failure, TransformEstimate};

/// Decoded values may lie this many grid samples (or pixels) past a bound and still be
/// clamped onto it; anything further out is rejected.
const BOUND_SLACK: f64 = 0.5;

/// Iterative Fourier-Mellin estimator of rotation, uniform scale and shift between
/// two equally shaped frames.
#[derive(Debug, Clone, Default)]
pub struct PhaseCorrelationEstimator {
    config: EstimatorConfig,
}

/// Rotation/scale residual measured on the log-polar spectra.
#[derive(Debug, Clone, Copy)]
struct Residual {
    angle: f64,
    scale: f64,
    peak_ratio: f64,
}

/// Everything that stays fixed across iterations of one estimate.
struct Workspace<'a> {
    target: ArrayView2<'a, f64>,
    fill: f64,
    log_polar: LogPolarTransform,
    polar_correlator: PhaseCorrelator,
    reference_polar: Array2<Complex64>,
    spatial_correlator: PhaseCorrelator,
    reference_spatial: Array2<Complex64>,
}

impl PhaseCorrelationEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn estimate(
        &self,
        reference: ArrayView2<f64>,
        target: ArrayView2<f64>,
        bounds: &EstimatorBounds,
        iterations: usize,
    ) -> RegistrationResult<TransformEstimate> {
        self.estimate_with_cancel(reference, target, bounds, iterations, None)
    }

    /// Estimate how `target` is transformed relative to `reference`.
    ///
    /// Mismatched shapes are an error. Frames that cannot be correlated and estimates
    /// that leave `bounds` come back with `success == false`, clamped into `bounds`.
    /// `cancel` is polled before each iteration.
    pub fn estimate_with_cancel(
        &self,
        reference: ArrayView2<f64>,
        target: ArrayView2<f64>,
        bounds: &EstimatorBounds,
        iterations: usize,
        cancel: Option<&CancelToken>,
    ) -> RegistrationResult<TransformEstimate> {
        let start = Instant::now();
        if reference.dim() != target.dim() {
            return Err(RegistrationError::InputShapeMismatch {
                reference: reference.dim(),
                target: target.dim(),
            });
        }

        let span = EstimatorSpan::new(reference.dim(), iterations);
        let finish = |mut estimate: TransformEstimate| -> RegistrationResult<TransformEstimate> {
            estimate.processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;
            span.record_result(&estimate);
            Ok(estimate)
        };

        if let Some(reason) = self.degenerate(reference).or_else(|| self.degenerate(target)) {
            warn!(reason, "Frame cannot be correlated");
            return finish(TransformEstimate::failed(Failure::DegenerateFrame, Similarity::identity(), bounds));
        }

        let workspace = self.workspace(reference, target);
        let grid = *workspace.log_polar.grid();
        let admissible = bounds.with_slack(BOUND_SLACK * grid.angle_step(), BOUND_SLACK * grid.log_step, BOUND_SLACK);
        // a residual that stays within half a log-polar sample cannot be refined further
        let settle_angle = self.config.angle_tolerance.max(0.5 * grid.angle_step());
        let settle_scale = self.config.scale_tolerance.max(0.5 * grid.log_step);

        let iterations = iterations.max(1);
        let mut current = Similarity::identity();
        let mut peak_ratio = 0.0;
        let mut performed = 0;
        let mut settled = false;

        for iteration in 1..=iterations {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                debug!(iteration, "Estimate cancelled");
                return Err(RegistrationError::Cancelled);
            }
            performed = iteration;

            let corrected = if iteration == 1 {
                workspace.target.to_owned()
            } else {
                ImageTransformer::warp(
                    workspace.target,
                    &current.inverse(),
                    Edge::Constant(workspace.fill),
                    self.config.interpolation,
                )
            };

            let Some(residual) = self.rotation_scale_residual(&workspace, corrected.view()) else {
                let mut estimate = TransformEstimate::failed(Failure::DegenerateFrame, current, bounds);
                estimate.iterations = performed;
                return finish(estimate);
            };

            // the half-turn ambiguity is settled once, on the first pass
            let turns: &[f64] = if iteration == 1 { &[0.0, 180.0] } else { &[0.0] };
            let scale = current.scale * residual.scale;

            let mut chosen: Option<(Similarity, f64)> = None;
            if admissible.scale.contains(scale) {
                for turn in turns {
                    let Some(angle) = admissible.admit_angle(current.angle + residual.angle + turn) else {
                        continue;
                    };
                    let Some((translation, psr)) = self.translation(&workspace, angle, scale) else {
                        continue;
                    };
                    span.record_candidate(iteration, angle, scale, translation, psr);
                    let candidate = Similarity::new(angle, scale, translation);
                    if !admissible.admits(&candidate) {
                        continue;
                    }
                    if chosen.map_or(true, |(_, best)| psr > best) {
                        chosen = Some((candidate, psr));
                    }
                }
            }

            let Some((next, psr)) = chosen else {
                debug!(
                    iteration,
                    angle = current.angle + residual.angle,
                    scale,
                    "No candidate inside bounds"
                );
                let mut estimate = TransformEstimate::failed(Failure::OutOfRange, current, bounds);
                estimate.iterations = performed;
                return finish(estimate);
            };

            span.record_iteration(iteration, residual.angle, residual.scale, residual.peak_ratio, psr);
            let change = wrap_degrees(next.angle - current.angle);
            settled = change.abs() <= settle_angle && residual.scale.ln().abs() <= settle_scale;
            current = next;
            peak_ratio = psr;

            if settled {
                break;
            }
        }

        let clamped = bounds.clamp(&current);
        let failure = if !settled {
            Some(Failure::NotConverged)
        } else if peak_ratio < self.config.peak_ratio_threshold {
            Some(Failure::WeakPeak)
        } else {
            None
        };
        finish(TransformEstimate {
            success: failure.is_none(),
            angle: clamped.angle,
            scale: clamped.scale,
            translation: clamped.translation,
            peak_ratio,
            iterations: performed,
            failure,
            processing_time_ms: 0.0,
        })
    }

    fn degenerate(&self, frame: ArrayView2<f64>) -> Option<&'static str> {
        let (rows, cols) = frame.dim();
        if rows == 0 || cols == 0 {
            return Some("empty");
        }
        if rows < self.config.min_frame_size || cols < self.config.min_frame_size {
            return Some("too small");
        }
        if frame.iter().any(|v| !v.is_finite()) {
            return Some("non-finite samples");
        }
        let mean = frame.mean().unwrap_or(0.0);
        let variance = frame.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / frame.len() as f64;
        if variance <= 1e-12 * (1.0 + mean * mean) {
            return Some("zero variance");
        }
        None
    }

    fn workspace<'a>(&self, reference: ArrayView2<f64>, target: ArrayView2<'a, f64>) -> Workspace<'a> {
        let shape = reference.dim();
        let grid = LogPolarGrid::for_shape(
            shape,
            self.config.log_polar_oversample,
            self.config.log_polar_max_size,
            self.config.min_radius,
        );
        let log_polar = LogPolarTransform::new(shape, grid);
        let polar_correlator = PhaseCorrelator::new((grid.angles, grid.radii), false);
        let reference_polar = polar_correlator.spectrum(log_polar.transform(reference).view());
        let spatial_correlator = PhaseCorrelator::new(shape, true);
        let reference_spatial = spatial_correlator.spectrum(reference);

        Workspace {
            target,
            fill: border_mean(target),
            log_polar,
            polar_correlator,
            reference_polar,
            spatial_correlator,
            reference_spatial,
        }
    }

    /// Rotation and scale still separating `corrected` from the reference, read off the
    /// strongest log-polar peak anywhere on the surface.
    fn rotation_scale_residual(&self, workspace: &Workspace<'_>, corrected: ArrayView2<f64>) -> Option<Residual> {
        let grid = *workspace.log_polar.grid();
        let target_polar = workspace
            .polar_correlator
            .spectrum(workspace.log_polar.transform(corrected).view());
        let surface = workspace
            .polar_correlator
            .correlate_spectra(&workspace.reference_polar, &target_polar);

        let peak = locate_peak(&surface, self.config.exclusion_radius)?;
        let (angle, scale) = grid.decode(peak.offset.0, peak.offset.1);
        debug!(
            residual_angle = angle,
            residual_scale = scale,
            peak_ratio = peak.peak_ratio,
            "Log-polar peak"
        );
        Some(Residual { angle, scale, peak_ratio: peak.peak_ratio })
    }

    /// Shift of the target once rotation and scale are undone, from the strongest
    /// spatial correlation peak. Returned as `(dy, dx)` with its peak-to-sidelobe ratio.
    fn translation(&self, workspace: &Workspace<'_>, angle: f64, scale: f64) -> Option<((f64, f64), f64)> {
        let rotation_scale = Similarity::new(angle, scale, (0.0, 0.0));
        let corrected = ImageTransformer::warp(
            workspace.target,
            &rotation_scale.inverse(),
            Edge::Constant(workspace.fill),
            self.config.interpolation,
        );
        let surface = workspace.spatial_correlator.correlate_spectra(
            &workspace.reference_spatial,
            &workspace.spatial_correlator.spectrum(corrected.view()),
        );
        let peak: CorrelationPeak = locate_peak(&surface, self.config.exclusion_radius)?;

        // a shift t' between reference and the corrected target is t = s R(-angle) t'
        let t = rotation_matrix(-angle) * scale * DVec2::new(peak.offset.1, peak.offset.0);
        Some(((t.y, t.x), peak.peak_ratio))
    }
}
