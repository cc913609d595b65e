use glam::{DMat2, DVec2};
use tracing::debug;

use crate::data::{FieldImage, ImageTransformer, Edge, Interpolation};
use crate::error::RegistrationResult;
use crate::geometry::{rotation_matrix, WorldRect};
use crate::pipeline::SubFrame;

/// Cuts the part of an image under a world rectangle onto a world-axis-aligned grid.
#[derive(Debug, Clone, Default)]
pub struct FrameExtractor {
    pub interpolation: Interpolation,
}

impl FrameExtractor {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation }
    }

    /// Resample `image` under `rect` at the image's own pixel density.
    ///
    /// The rectangle is clipped to the image's displayed bounds; no overlap yields an
    /// empty frame. The image itself is never touched.
    pub fn extract(&self, image: &FieldImage, rect: &WorldRect) -> RegistrationResult<SubFrame> {
        let pixels = image.pixels()?;
        let pose = image.pose();
        let density = pose.density();

        let Some(clipped) = rect.intersect(&image.displayed_bounds()) else {
            debug!(image = image.name(), ?rect, "Region does not overlap image");
            return Ok(SubFrame::empty(rect.origin(), density));
        };

        let size = clipped.size() * density;
        let cols = size.x.round() as usize;
        let rows = size.y.round() as usize;
        if rows == 0 || cols == 0 {
            return Ok(SubFrame::empty(clipped.origin(), density));
        }

        // undo translation, then rotation, then scale
        let to_local = DMat2::from_diagonal(density) * rotation_matrix(-pose.rotation);
        let corners = [
            DVec2::new(clipped.x0, clipped.y0),
            DVec2::new(clipped.x1, clipped.y0),
            DVec2::new(clipped.x1, clipped.y1),
            DVec2::new(clipped.x0, clipped.y1),
        ]
        .map(|corner| to_local * (corner - pose.position));
        debug!(
            image = image.name(),
            rows,
            cols,
            local_corners = ?corners,
            "Extracting sub-frame"
        );

        let origin = clipped.origin();
        let pitch = pose.scale;
        let interpolation = self.interpolation;
        let frame = ImageTransformer::generate((rows, cols), |x, y| {
            let world = origin + DVec2::new((x as f64 + 0.5) * pitch.x, (y as f64 + 0.5) * pitch.y);
            let local = to_local * (world - pose.position);
            ImageTransformer::sample(pixels, local.x - 0.5, local.y - 0.5, Edge::Clamp, interpolation)
        });

        Ok(SubFrame::new(frame, origin, density))
    }
}
