use glam::DVec2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::algorithms::PhaseCorrelationEstimator;
use crate::config::Config;
use crate::data::{FieldImage, FrameExtractor, ImageTransformer};
use crate::error::{RegistrationError, RegistrationResult};
use crate::geometry::WorldRect;
use crate::logging::{clear_correlation_id, new_correlation_id, RegistrationSpan};
use crate::pipeline::{
    CancelToken, DensitySource, FrameInspector, PoseSink, RegistrationOutcome, ScaleReconciler, ShapeMatcher,
    Stage, SubFrame, TransformComposer,
};

/// Drives one reference/target registration from world rectangle to new target pose.
///
/// Cloning is cheap and clones share the in-flight flag, so a clone handed to a worker
/// still refuses concurrent attempts.
#[derive(Clone)]
pub struct RegistrationService {
    config: Config,
    extractor: FrameExtractor,
    reconciler: ScaleReconciler,
    matcher: ShapeMatcher,
    estimator: PhaseCorrelationEstimator,
    composer: TransformComposer,
    inspector: Option<Arc<dyn FrameInspector>>,
    sink: Option<Arc<dyn PoseSink>>,
    busy: Arc<AtomicBool>,
}

/// Holds the service's in-flight flag until dropped.
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> RegistrationResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RegistrationError::Busy)?;
        Ok(Self { flag: Arc::clone(flag) })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Handle to a registration running on the rayon pool.
pub struct RegistrationTask {
    cancel: CancelToken,
    receiver: mpsc::Receiver<RegistrationResult<RegistrationOutcome>>,
}

impl RegistrationTask {
    /// Ask the worker to stop before its next estimator iteration.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block until the worker finishes.
    pub fn wait(self) -> RegistrationResult<RegistrationOutcome> {
        self.receiver
            .recv()
            .map_err(|_| RegistrationError::ResourceUnavailable("registration worker exited without a result".into()))?
    }
}

impl RegistrationService {
    pub fn new(config: Config) -> RegistrationResult<Self> {
        config
            .validate()
            .map_err(|errors| RegistrationError::InvalidConfig(errors.join("; ")))?;

        Ok(Self {
            extractor: FrameExtractor::default(),
            reconciler: ScaleReconciler::new(config.reconcile.strategy, config.reconcile.interpolation),
            matcher: ShapeMatcher,
            estimator: PhaseCorrelationEstimator::new(config.estimator.clone()),
            composer: TransformComposer,
            inspector: None,
            sink: None,
            busy: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn FrameInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn with_pose_sink(mut self, sink: Arc<dyn PoseSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Region used when the caller supplies none: the target's displayed bounds grown by
    /// the configured margin on every side.
    pub fn auto_roi(&self, target: &FieldImage) -> WorldRect {
        target.displayed_bounds().expand(self.config.roi.auto_margin)
    }

    /// Register `target` against `reference` on the calling thread.
    ///
    /// The images are not modified; apply the outcome with
    /// [`RegistrationOutcome::apply_to`].
    pub fn register(
        &self,
        reference: &FieldImage,
        target: &FieldImage,
        roi: Option<WorldRect>,
    ) -> RegistrationResult<RegistrationOutcome> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.run(reference, target, roi, None)
    }

    pub fn register_with_cancel(
        &self,
        reference: &FieldImage,
        target: &FieldImage,
        roi: Option<WorldRect>,
        cancel: &CancelToken,
    ) -> RegistrationResult<RegistrationOutcome> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.run(reference, target, roi, Some(cancel))
    }

    /// Run the registration on the rayon pool. Refuses with `Busy` right away if another
    /// attempt holds this service.
    pub fn spawn(
        &self,
        reference: FieldImage,
        target: FieldImage,
        roi: Option<WorldRect>,
    ) -> RegistrationResult<RegistrationTask> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let service = self.clone();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let (sender, receiver) = mpsc::channel();

        rayon::spawn(move || {
            let result = service.run(&reference, &target, roi, Some(&token));
            // release before reporting so a waiter never sees a stale busy flag
            drop(guard);
            if sender.send(result).is_err() {
                debug!("Registration task handle dropped before completion");
            }
        });

        Ok(RegistrationTask { cancel, receiver })
    }

    /// One attempt under a fresh correlation id, cleared again once the attempt ends.
    fn run(
        &self,
        reference: &FieldImage,
        target: &FieldImage,
        roi: Option<WorldRect>,
        cancel: Option<&CancelToken>,
    ) -> RegistrationResult<RegistrationOutcome> {
        let correlation_id = new_correlation_id();
        let result = self.attempt(reference, target, roi, cancel, correlation_id);
        clear_correlation_id();
        result
    }

    fn attempt(
        &self,
        reference: &FieldImage,
        target: &FieldImage,
        roi: Option<WorldRect>,
        cancel: Option<&CancelToken>,
        correlation_id: Uuid,
    ) -> RegistrationResult<RegistrationOutcome> {
        let roi = roi.unwrap_or_else(|| self.auto_roi(target));
        let span = RegistrationSpan::new(reference.name(), target.name(), &roi, correlation_id);

        let reference_frame = self.extractor.extract(reference, &roi)?;
        self.inspect(&span, Stage::ReferenceExtracted, &reference_frame);
        let target_frame = self.extractor.extract(target, &roi)?;
        self.inspect(&span, Stage::TargetExtracted, &target_frame);

        let (reference_frame, target_frame, reconciliation) = self.reconciler.reconcile(
            reference_frame,
            target_frame,
            DensitySource { outline: reference.outline(), shape: reference.shape() },
            DensitySource { outline: target.outline(), shape: target.shape() },
        );
        self.inspect(&span, Stage::ReferenceReconciled, &reference_frame);
        self.inspect(&span, Stage::TargetReconciled, &target_frame);

        let target_frame = self.matcher.match_shape(reference_frame.shape(), target_frame);
        self.inspect(&span, Stage::TargetShapeMatched, &target_frame);
        if reference_frame.shape() != target_frame.shape() {
            return Err(RegistrationError::InputShapeMismatch {
                reference: reference_frame.shape(),
                target: target_frame.shape(),
            });
        }

        let registration = &self.config.registration;
        let estimate = self.estimator.estimate_with_cancel(
            reference_frame.view(),
            target_frame.view(),
            &registration.bounds(),
            registration.iterations,
            cancel,
        )?;

        if self.inspector.is_some() && !target_frame.is_empty() {
            let aligned =
                ImageTransformer::align_target(target_frame.view(), &estimate.similarity(), self.config.estimator.interpolation);
            self.inspect(&span, Stage::TargetAligned, &SubFrame::new(aligned, target_frame.origin(), target_frame.density));
        }

        let new_pose = if estimate.success {
            // the estimate lives on the reference grid; fold in where the target grid starts
            let offset = (target_frame.origin() - reference_frame.origin()) * reconciliation.matched_density;
            let mut total = estimate.clone();
            total.translation.0 += offset.y;
            total.translation.1 += offset.x;

            let current = target.pose();
            let pivot_offset: DVec2 = reference_frame.rect.center() - current.position;
            let pose = self
                .composer
                .compose(&current, &total.inverse(), &reconciliation, pivot_offset);
            match pose.validate() {
                Ok(()) => Some(pose),
                Err(err) => {
                    warn!(error = %err, "Composed pose rejected");
                    None
                }
            }
        } else {
            None
        };

        let outcome = RegistrationOutcome { estimate, new_pose, roi, reconciliation };
        span.record_outcome(&outcome);

        if let (Some(sink), Some(pose)) = (&self.sink, &outcome.new_pose) {
            sink.pose_updated(target.name(), pose);
        }
        if outcome.new_pose.is_some() {
            info!(target_image = target.name(), "Target pose updated");
        }
        Ok(outcome)
    }

    fn inspect(&self, span: &RegistrationSpan, stage: Stage, frame: &SubFrame) {
        span.record_stage(stage, frame.shape());
        if let Some(inspector) = &self.inspector {
            inspector.inspect(stage, frame.view());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Outline;
    use ndarray::Array2;

    fn textured(name: &str) -> FieldImage {
        let pixels = Array2::from_shape_fn((48, 48), |(y, x)| ((x * 7 + y * 13) % 17) as f64);
        FieldImage::new(name, pixels, Outline::new(0.0, 48.0, 0.0, 48.0), 0.0)
    }

    #[test]
    fn test_busy_flag_released_after_register() {
        let service = RegistrationService::new(Config::default()).unwrap();
        let image = textured("a");
        service.register(&image, &image, None).unwrap();
        assert!(!service.is_busy());
    }

    #[test]
    fn test_second_guard_is_refused() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = BusyGuard::acquire(&flag).unwrap();
        assert!(matches!(BusyGuard::acquire(&flag), Err(RegistrationError::Busy)));
        drop(first);
        assert!(BusyGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn test_missing_pixels_surface_as_error() {
        let service = RegistrationService::new(Config::default()).unwrap();
        let reference = textured("reference");
        let target = FieldImage::unloaded("target", (48, 48), Outline::new(0.0, 48.0, 0.0, 48.0), 0.0);
        let err = service.register(&reference, &target, None).unwrap_err();
        assert!(matches!(err, RegistrationError::ResourceUnavailable(_)));
        assert!(!service.is_busy());
    }

    #[test]
    fn test_auto_roi_expands_target_bounds() {
        let service = RegistrationService::new(Config::default()).unwrap();
        let roi = service.auto_roi(&textured("t"));
        assert!((roi.x0 + 4.8).abs() < 1e-9);
        assert!((roi.x1 - 52.8).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.registration.iterations = 0;
        assert!(matches!(
            RegistrationService::new(config),
            Err(RegistrationError::InvalidConfig(_))
        ));
    }
}
