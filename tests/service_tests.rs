use field_registration::*;
use glam::DVec2;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Gaussian blobs spread over a `size`² canvas, sampled at pixel centers.
fn blob_image(size: usize, count: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let margin = 8.0;
    let blobs: Vec<(f64, f64, f64, f64)> = (0..count)
        .map(|_| {
            (
                rng.gen_range(margin..size as f64 - margin),
                rng.gen_range(margin..size as f64 - margin),
                rng.gen_range(2.0..4.0),
                rng.gen_range(0.4..1.0),
            )
        })
        .collect();
    Array2::from_shape_fn((size, size), |(y, x)| {
        blobs
            .iter()
            .map(|&(bx, by, sigma, amplitude)| {
                let d2 = (x as f64 - bx).powi(2) + (y as f64 - by).powi(2);
                amplitude * (-d2 / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    })
}

fn reference_and_displaced_target(displacement: WorldPose) -> (FieldImage, FieldImage) {
    let pixels = blob_image(160, 60, 2024);
    let reference = FieldImage::with_pose("reference", pixels.clone(), WorldPose::default());
    let target = FieldImage::with_pose("target", pixels, displacement);
    (reference, target)
}

/// Blocks the first stage until released, so tests control when a registration proceeds.
struct GateInspector {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl FrameInspector for GateInspector {
    fn inspect(&self, stage: Stage, _frame: ArrayView2<f64>) {
        if stage != Stage::ReferenceExtracted {
            return;
        }
        if let Ok(entered) = self.entered.lock() {
            let _ = entered.send(());
        }
        if let Ok(release) = self.release.lock() {
            let _ = release.recv();
        }
    }
}

fn gate() -> (Arc<GateInspector>, Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let inspector = Arc::new(GateInspector {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    (inspector, entered_rx, release_tx)
}

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<(String, WorldPose)>>,
}

impl PoseSink for RecordingSink {
    fn pose_updated(&self, image_name: &str, pose: &WorldPose) {
        self.updates.lock().unwrap().push((image_name.to_string(), *pose));
    }
}

#[derive(Default)]
struct StageRecorder {
    stages: Mutex<Vec<(Stage, (usize, usize))>>,
}

impl FrameInspector for StageRecorder {
    fn inspect(&self, stage: Stage, frame: ArrayView2<f64>) {
        self.stages.lock().unwrap().push((stage, frame.dim()));
    }
}

#[test]
fn test_register_restores_displaced_pose() {
    let displacement = WorldPose::new(DVec2::new(2.5, -1.5), 3.0, DVec2::splat(1.02)).unwrap();
    let (reference, mut target) = reference_and_displaced_target(displacement);
    let roi = WorldRect::new(20.0, 20.0, 140.0, 140.0);

    let sink = Arc::new(RecordingSink::default());
    let service = RegistrationService::new(Config::default())
        .unwrap()
        .with_pose_sink(sink.clone());
    let outcome = service.register(&reference, &target, Some(roi)).unwrap();

    assert!(outcome.estimate.success, "{:?}", outcome.estimate);
    let pose = outcome.new_pose.expect("successful registration yields a pose");
    assert!(pose.rotation.abs() < 0.5, "rotation {}", pose.rotation);
    assert!((pose.scale.x - 1.0).abs() < 0.01, "scale {:?}", pose.scale);
    assert!((pose.scale.y - 1.0).abs() < 0.01, "scale {:?}", pose.scale);
    assert!(pose.position.length() < 2.0, "position {:?}", pose.position);

    // the ROI center must land on the same target pixel the reference shows there
    let center = roi.center();
    let local = pose.world_to_local(center);
    assert!((local - center).length() < 1.0, "local {:?}", local);

    let updates = sink.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "target");
    assert_eq!(updates[0].1, pose);
    drop(updates);

    assert!(outcome.apply_to(&mut target));
    assert_eq!(target.pose(), pose);
    target.reset_pose();
    assert_eq!(target.pose(), displacement);
}

#[test]
fn test_register_with_automatic_roi() {
    let displacement = WorldPose::new(DVec2::new(-2.0, 1.0), -2.0, DVec2::ONE).unwrap();
    let (reference, target) = reference_and_displaced_target(displacement);

    let service = RegistrationService::new(Config::default()).unwrap();
    let outcome = service.register(&reference, &target, None).unwrap();

    assert_eq!(outcome.roi, service.auto_roi(&target));
    assert!(outcome.estimate.success, "{:?}", outcome.estimate);
    let pose = outcome.new_pose.unwrap();
    assert!(pose.rotation.abs() < 1.0, "rotation {}", pose.rotation);
}

#[test]
fn test_failed_registration_leaves_pose_alone() {
    let reference = FieldImage::with_pose("flat", Array2::from_elem((64, 64), 0.3), WorldPose::default());
    let target = FieldImage::with_pose("flat-too", Array2::from_elem((64, 64), 0.3), WorldPose::default());

    let sink = Arc::new(RecordingSink::default());
    let service = RegistrationService::new(Config::default())
        .unwrap()
        .with_pose_sink(sink.clone());
    let outcome = service.register(&reference, &target, None).unwrap();

    assert!(!outcome.estimate.success);
    assert_eq!(outcome.estimate.failure, Some(Failure::DegenerateFrame));
    assert!(outcome.new_pose.is_none());
    assert!(sink.updates.lock().unwrap().is_empty());
}

#[test]
fn test_every_stage_is_inspected() {
    let (reference, target) = reference_and_displaced_target(WorldPose::default());
    let recorder = Arc::new(StageRecorder::default());
    let service = RegistrationService::new(Config::default())
        .unwrap()
        .with_inspector(recorder.clone());
    service
        .register(&reference, &target, Some(WorldRect::new(30.0, 30.0, 94.0, 94.0)))
        .unwrap();

    let stages = recorder.stages.lock().unwrap();
    let names: Vec<Stage> = stages.iter().map(|(stage, _)| *stage).collect();
    assert_eq!(
        names,
        vec![
            Stage::ReferenceExtracted,
            Stage::TargetExtracted,
            Stage::ReferenceReconciled,
            Stage::TargetReconciled,
            Stage::TargetShapeMatched,
            Stage::TargetAligned,
        ]
    );
    assert!(stages.iter().all(|(_, shape)| *shape == (64, 64)));
}

#[test]
fn test_concurrent_attempt_is_refused() {
    let (reference, target) = reference_and_displaced_target(WorldPose::default());
    let roi = Some(WorldRect::new(40.0, 40.0, 104.0, 104.0));
    let (inspector, entered, release) = gate();
    let service = RegistrationService::new(Config::default())
        .unwrap()
        .with_inspector(inspector);

    let task = service.spawn(reference.clone(), target.clone(), roi).unwrap();
    entered.recv().unwrap();

    assert!(service.is_busy());
    assert_eq!(
        service.register(&reference, &target, roi).unwrap_err(),
        RegistrationError::Busy
    );
    assert!(matches!(
        service.spawn(reference.clone(), target.clone(), roi),
        Err(RegistrationError::Busy)
    ));

    release.send(()).unwrap();
    let outcome = task.wait().unwrap();
    assert!(outcome.estimate.success);
    assert!(!service.is_busy());

    // the gate holds every attempt, so open it once more for the follow-up
    release.send(()).unwrap();
    assert!(service.register(&reference, &target, roi).is_ok());
    entered.recv().unwrap();
}

#[test]
fn test_spawned_registration_can_be_cancelled() {
    let (reference, target) = reference_and_displaced_target(WorldPose::default());
    let (inspector, entered, release) = gate();
    let service = RegistrationService::new(Config::default())
        .unwrap()
        .with_inspector(inspector);

    let task = service
        .spawn(reference, target, Some(WorldRect::new(40.0, 40.0, 104.0, 104.0)))
        .unwrap();
    entered.recv().unwrap();
    task.cancel();
    release.send(()).unwrap();

    assert_eq!(task.wait().unwrap_err(), RegistrationError::Cancelled);
    assert!(!service.is_busy());
}

#[test]
fn test_register_with_cancel_token() {
    let (reference, target) = reference_and_displaced_target(WorldPose::default());
    let service = RegistrationService::new(Config::default()).unwrap();
    let token = CancelToken::new();
    token.cancel();

    let err = service
        .register_with_cancel(&reference, &target, None, &token)
        .unwrap_err();
    assert_eq!(err, RegistrationError::Cancelled);
}

#[test]
fn test_correlation_id_does_not_outlive_attempt() {
    let (reference, target) = reference_and_displaced_target(WorldPose::default());
    let service = RegistrationService::new(Config::default()).unwrap();
    let token = CancelToken::new();
    token.cancel();

    field_registration::logging::new_correlation_id();
    assert!(service.register_with_cancel(&reference, &target, None, &token).is_err());
    assert!(field_registration::logging::get_correlation_id().is_none());

    assert!(service
        .register(&reference, &target, Some(WorldRect::new(40.0, 40.0, 104.0, 104.0)))
        .is_ok());
    assert!(field_registration::logging::get_correlation_id().is_none());
}

#[test]
fn test_missing_pixel_data_is_an_error() {
    let reference = FieldImage::unloaded("reference", (64, 64), Outline::new(0.0, 64.0, 0.0, 64.0), 0.0);
    let target = FieldImage::with_pose("target", blob_image(64, 10, 3), WorldPose::default());
    let service = RegistrationService::new(Config::default()).unwrap();

    let err = service.register(&reference, &target, None).unwrap_err();
    assert!(matches!(err, RegistrationError::ResourceUnavailable(_)));
}
