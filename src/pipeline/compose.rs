use glam::DVec2;
use tracing::debug;

use crate::geometry::{rotate, WorldPose};
use crate::pipeline::{Reconciliation, TransformEstimate};

/// Folds a pixel-domain correction into a world pose.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformComposer;

impl TransformComposer {
    /// New pose for an image once `correction` is applied to it.
    ///
    /// `correction` is the rotation/scale/shift that carries the target onto the
    /// reference, measured about the alignment region's center. `pivot_offset` is that
    /// center minus the pose's top-left anchor, in world units of the pre-update pose.
    /// The pose rotates about its anchor, so both the rotation and the scale leave a
    /// position correction behind; the shift is added last, converted with the matched
    /// pixel pitch.
    pub fn compose(
        &self,
        current: &WorldPose,
        correction: &TransformEstimate,
        reconciliation: &Reconciliation,
        pivot_offset: DVec2,
    ) -> WorldPose {
        let rotation_delta = -correction.angle;
        let rotation = current.rotation + rotation_delta;
        let scale = current.scale * correction.scale * reconciliation.ratio;

        let rotated_pivot = rotate(pivot_offset, rotation_delta);
        let rotation_pivot_delta = rotated_pivot - pivot_offset;
        let scale_pivot_delta = (1.0 - correction.scale) * rotated_pivot;

        let position = current.position - rotation_pivot_delta
            + scale_pivot_delta
            + reconciliation.to_world_units(correction.translation);

        debug!(
            rotation_delta,
            ?rotation_pivot_delta,
            ?scale_pivot_delta,
            "Composed pose correction"
        );

        WorldPose { position, rotation, scale }
    }
}
