//! Structured spans for hierarchical logging
//!
//! One span per registration attempt and one per estimator run, so every iteration and
//! candidate can be traced back to the attempt that produced it.

use instant::Instant;
use tracing::{field, span, Level, Span};
use uuid::Uuid;

use crate::geometry::WorldRect;
use crate::pipeline::{RegistrationOutcome, Stage, TransformEstimate};

/// Span around one run of the phase-correlation estimator
pub struct EstimatorSpan {
    span: Span,
    start_time: Instant,
}

impl EstimatorSpan {
    pub fn new(shape: (usize, usize), iterations: usize) -> Self {
        let span = span!(
            Level::INFO,
            "estimator",
            rows = shape.0,
            cols = shape.1,
            max_iterations = iterations,
            correlation_id = field::Empty,
            success = field::Empty,
            iterations = field::Empty,
            peak_ratio = field::Empty,
        );
        if let Some(id) = crate::logging::get_correlation_id() {
            span.record("correlation_id", field::display(id));
        }

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// One rotation/scale hypothesis and the translation found for it
    pub fn record_candidate(&self, iteration: usize, angle: f64, scale: f64, translation: (f64, f64), peak_ratio: f64) {
        tracing::trace!(
            parent: &self.span,
            iteration,
            angle,
            scale,
            dy = translation.0,
            dx = translation.1,
            peak_ratio,
            "Candidate evaluated"
        );
    }

    pub fn record_iteration(
        &self,
        iteration: usize,
        residual_angle: f64,
        residual_scale: f64,
        polar_peak_ratio: f64,
        peak_ratio: f64,
    ) {
        tracing::debug!(
            parent: &self.span,
            iteration,
            residual_angle,
            residual_scale,
            polar_peak_ratio,
            peak_ratio,
            "Iteration completed"
        );
    }

    pub fn record_result(&self, estimate: &TransformEstimate) {
        let duration = self.start_time.elapsed();
        self.span.record("success", estimate.success);
        self.span.record("iterations", estimate.iterations);
        self.span.record("peak_ratio", estimate.peak_ratio);

        tracing::info!(
            parent: &self.span,
            success = estimate.success,
            angle = estimate.angle,
            scale = estimate.scale,
            dy = estimate.translation.0,
            dx = estimate.translation.1,
            peak_ratio = estimate.peak_ratio,
            failure = ?estimate.failure,
            execution_time_ms = duration.as_secs_f64() * 1000.0,
            "Estimate completed"
        );
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Span around one registration attempt, from ROI to pose update
pub struct RegistrationSpan {
    span: Span,
    start_time: Instant,
}

impl RegistrationSpan {
    pub fn new(reference: &str, target: &str, roi: &WorldRect, correlation_id: Uuid) -> Self {
        let span = span!(
            Level::INFO,
            "registration",
            reference,
            target,
            roi = ?roi,
            correlation_id = %correlation_id,
            success = field::Empty,
            pose_updated = field::Empty,
        );
        tracing::info!(parent: &span, "Starting registration");

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn record_stage(&self, stage: Stage, shape: (usize, usize)) {
        tracing::debug!(
            parent: &self.span,
            stage = stage.name(),
            rows = shape.0,
            cols = shape.1,
            "Stage completed"
        );
    }

    pub fn record_outcome(&self, outcome: &RegistrationOutcome) {
        let duration = self.start_time.elapsed();
        self.span.record("success", outcome.estimate.success);
        self.span.record("pose_updated", outcome.new_pose.is_some());

        if outcome.estimate.success {
            tracing::info!(
                parent: &self.span,
                angle = outcome.estimate.angle,
                scale = outcome.estimate.scale,
                new_pose = ?outcome.new_pose,
                execution_time_ms = duration.as_secs_f64() * 1000.0,
                "Registration completed"
            );
        } else {
            tracing::warn!(
                parent: &self.span,
                failure = ?outcome.estimate.failure,
                peak_ratio = outcome.estimate.peak_ratio,
                execution_time_ms = duration.as_secs_f64() * 1000.0,
                "Registration did not converge"
            );
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}
