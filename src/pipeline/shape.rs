use glam::DVec2;
use ndarray::{s, Array2};

use crate::data::ImageTransformer;
use crate::pipeline::SubFrame;

/// Pads or crops the target frame to the reference frame's shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeMatcher;

impl ShapeMatcher {
    /// Per axis, `diff = reference - target`. When neither axis is negative the target is
    /// edge-padded with `floor(diff / 2)` on the low side and the rest on the high side.
    /// Otherwise negative axes are cropped from the high side (top-left anchored) and any
    /// positive axis is padded on its high side only. The target's world origin follows
    /// the low-side padding.
    pub fn match_shape(&self, reference_shape: (usize, usize), target: SubFrame) -> SubFrame {
        let (ref_rows, ref_cols) = reference_shape;
        if target.is_empty() {
            return SubFrame::new(Array2::zeros(reference_shape), target.origin(), target.density);
        }

        let (rows, cols) = target.shape();
        let diff_rows = ref_rows as isize - rows as isize;
        let diff_cols = ref_cols as isize - cols as isize;
        if diff_rows == 0 && diff_cols == 0 {
            return target;
        }

        let centered = diff_rows >= 0 && diff_cols >= 0;
        let pad = |diff: isize| -> (usize, usize) {
            if diff <= 0 {
                (0, 0)
            } else if centered {
                let low = diff as usize / 2;
                (low, diff as usize - low)
            } else {
                (0, diff as usize)
            }
        };
        let pad_rows = pad(diff_rows);
        let pad_cols = pad(diff_cols);

        let keep_rows = rows.min(ref_rows);
        let keep_cols = cols.min(ref_cols);
        let cropped = target.pixels.slice(s![..keep_rows, ..keep_cols]);
        let pixels = ImageTransformer::pad_edge(cropped, pad_rows, pad_cols);

        let pitch = target.pitch();
        let origin = target.origin() - DVec2::new(pad_cols.0 as f64 * pitch.x, pad_rows.0 as f64 * pitch.y);
        SubFrame::new(pixels, origin, target.density)
    }
}
