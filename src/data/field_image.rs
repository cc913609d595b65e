use ndarray::{Array2, Array3, ArrayView2, Axis as NdAxis};

use crate::error::{RegistrationError, RegistrationResult};
use crate::geometry::{Outline, WorldPose, WorldRect};

/// Luma weights for collapsing RGB to grayscale.
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// A grayscale image placed on the world canvas.
///
/// Pixel data may be absent when the surrounding workspace has not loaded it yet;
/// the pose is always present. The outline is kept in step with the pose.
#[derive(Debug, Clone)]
pub struct FieldImage {
    name: String,
    pixels: Option<Array2<f64>>,
    shape: (usize, usize),
    pose: WorldPose,
    outline: Outline,
    initial_pose: WorldPose,
}

impl FieldImage {
    /// Place `pixels` so their unrotated footprint is `outline`.
    pub fn new(name: impl Into<String>, pixels: Array2<f64>, outline: Outline, rotation: f64) -> Self {
        let shape = pixels.dim();
        let pose = WorldPose::from_outline(&outline, shape, rotation);
        Self {
            name: name.into(),
            pixels: Some(pixels),
            shape,
            pose,
            outline,
            initial_pose: pose,
        }
    }

    pub fn with_pose(name: impl Into<String>, pixels: Array2<f64>, pose: WorldPose) -> Self {
        let shape = pixels.dim();
        let outline = Outline::from_pose(&pose, shape, None);
        Self {
            name: name.into(),
            pixels: Some(pixels),
            shape,
            pose,
            outline,
            initial_pose: pose,
        }
    }

    /// Collapse an (rows, cols, channels) array to grayscale. Single-channel input passes through.
    pub fn from_rgb(name: impl Into<String>, rgb: &Array3<f64>, outline: Outline, rotation: f64) -> Self {
        Self::new(name, to_grayscale(rgb), outline, rotation)
    }

    /// An image whose pixels have not been loaded.
    pub fn unloaded(name: impl Into<String>, shape: (usize, usize), outline: Outline, rotation: f64) -> Self {
        let pose = WorldPose::from_outline(&outline, shape, rotation);
        Self {
            name: name.into(),
            pixels: None,
            shape,
            pose,
            outline,
            initial_pose: pose,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn pixels(&self) -> RegistrationResult<ArrayView2<'_, f64>> {
        self.pixels
            .as_ref()
            .map(|p| p.view())
            .ok_or_else(|| RegistrationError::ResourceUnavailable(self.name.clone()))
    }

    pub fn pose(&self) -> WorldPose {
        self.pose
    }

    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    pub fn displayed_bounds(&self) -> WorldRect {
        self.pose.displayed_bounds(self.shape)
    }

    /// Replace the pose in one step and rebuild the outline from it.
    pub fn set_pose(&mut self, pose: WorldPose) {
        self.outline = Outline::from_pose(&pose, self.shape, self.outline.z);
        self.pose = pose;
    }

    /// Return to the pose the image was created with.
    pub fn reset_pose(&mut self) {
        self.set_pose(self.initial_pose);
    }

    pub fn initial_pose(&self) -> WorldPose {
        self.initial_pose
    }
}

pub fn to_grayscale(rgb: &Array3<f64>) -> Array2<f64> {
    let channels = rgb.len_of(NdAxis(2));
    if channels < 3 {
        return rgb.index_axis(NdAxis(2), 0).to_owned();
    }
    let (rows, cols, _) = rgb.dim();
    Array2::from_shape_fn((rows, cols), |(y, x)| {
        LUMA_WEIGHTS[0] * rgb[[y, x, 0]] + LUMA_WEIGHTS[1] * rgb[[y, x, 1]] + LUMA_WEIGHTS[2] * rgb[[y, x, 2]]
    })
}
