use anyhow::Context;
use image::{GrayImage, Luma};
use ndarray::{Array2, Array3, ArrayView2};
use std::path::Path;

use crate::data::FieldImage;
use crate::geometry::Outline;

/// Load an image file as an RGB array with samples in [0, 1].
pub fn load_rgb<P: AsRef<Path>>(path: P) -> crate::Result<Array3<f64>> {
    let path = path.as_ref();
    let img = image::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .to_rgb32f();
    let (width, height) = (img.width() as usize, img.height() as usize);
    let mut rgb = Array3::zeros((height, width, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            rgb[[y as usize, x as usize, c]] = pixel[c] as f64;
        }
    }
    Ok(rgb)
}

/// Load an image file and place it on the canvas with `outline` and `rotation`.
pub fn load_field_image<P: AsRef<Path>>(
    path: P,
    name: &str,
    outline: Outline,
    rotation: f64,
) -> crate::Result<FieldImage> {
    let rgb = load_rgb(path)?;
    Ok(FieldImage::from_rgb(name, &rgb, outline, rotation))
}

pub fn validate_frame_size(frame: ArrayView2<f64>, min_size: usize) -> crate::Result<()> {
    let (rows, cols) = frame.dim();
    if rows < min_size || cols < min_size {
        return Err(anyhow::anyhow!(
            "Image too small: {}x{}, minimum: {}x{}",
            cols,
            rows,
            min_size,
            min_size
        ));
    }
    Ok(())
}

/// Stretch a frame to the full 8-bit range and write it out.
pub fn save_frame<P: AsRef<Path>>(frame: ArrayView2<f64>, path: P) -> crate::Result<()> {
    let (rows, cols) = frame.dim();
    let (lo, hi) = frame
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = if hi > lo { hi - lo } else { 1.0 };
    let img = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = frame[[y as usize, x as usize]];
        let scaled = if v.is_finite() { (v - lo) / span * 255.0 } else { 0.0 };
        Luma([scaled.round().clamp(0.0, 255.0) as u8])
    });
    let path = path.as_ref();
    img.save(path)
        .with_context(|| format!("Failed to write image {}", path.display()))?;
    Ok(())
}

/// Grayscale pixels of an 8-bit image as an array in [0, 1].
pub fn gray_to_array(img: &GrayImage) -> Array2<f64> {
    Array2::from_shape_fn((img.height() as usize, img.width() as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0] as f64 / 255.0
    })
}
