use glam::DVec2;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{frame_center, Similarity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Bilinear,
    Bicubic,
}

/// What a sample outside the source grid reads as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    Clamp,
    Constant(f64),
}

pub struct ImageTransformer;

impl ImageTransformer {
    /// Resample `src` so that `out(p) = src(transform⁻¹(p))`, keeping the frame shape.
    pub fn warp(
        src: ArrayView2<f64>,
        transform: &Similarity,
        edge: Edge,
        interpolation: Interpolation,
    ) -> Array2<f64> {
        let shape = src.dim();
        let center = frame_center(shape);
        let inverse = transform.inverse();
        Self::generate(shape, |x, y| {
            let q = inverse.apply(DVec2::new(x as f64, y as f64), center);
            Self::sample(src, q.x, q.y, edge, interpolation)
        })
    }

    /// Map the target frame back onto the reference grid using an estimate of
    /// `target ≈ reference` transformed by `estimate`.
    pub fn align_target(target: ArrayView2<f64>, estimate: &Similarity, interpolation: Interpolation) -> Array2<f64> {
        let fill = border_mean(target);
        Self::warp(target, &estimate.inverse(), Edge::Constant(fill), interpolation)
    }

    /// Resize to `out_shape` (rows, cols) with pixel centers kept aligned.
    pub fn resize(src: ArrayView2<f64>, out_shape: (usize, usize), interpolation: Interpolation) -> Array2<f64> {
        let (rows, cols) = src.dim();
        if out_shape == (rows, cols) {
            return src.to_owned();
        }
        let fy = out_shape.0 as f64 / rows.max(1) as f64;
        let fx = out_shape.1 as f64 / cols.max(1) as f64;
        Self::generate(out_shape, |x, y| {
            let sx = (x as f64 + 0.5) / fx - 0.5;
            let sy = (y as f64 + 0.5) / fy - 0.5;
            Self::sample(src, sx, sy, Edge::Clamp, interpolation)
        })
    }

    /// Pad with replicated border pixels; `rows`/`cols` give (low, high) counts.
    pub fn pad_edge(src: ArrayView2<f64>, rows: (usize, usize), cols: (usize, usize)) -> Array2<f64> {
        let (h, w) = src.dim();
        let out_shape = (h + rows.0 + rows.1, w + cols.0 + cols.1);
        if h == 0 || w == 0 {
            return Array2::zeros(out_shape);
        }
        Array2::from_shape_fn(out_shape, |(y, x)| {
            let sy = y.saturating_sub(rows.0).min(h - 1);
            let sx = x.saturating_sub(cols.0).min(w - 1);
            src[[sy, sx]]
        })
    }

    pub fn sample(src: ArrayView2<f64>, x: f64, y: f64, edge: Edge, interpolation: Interpolation) -> f64 {
        match interpolation {
            Interpolation::Bilinear => Self::bilinear_interpolate(src, x, y, edge),
            Interpolation::Bicubic => Self::bicubic_interpolate(src, x, y, edge),
        }
    }

    pub(crate) fn generate<F>(shape: (usize, usize), f: F) -> Array2<f64>
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        let (rows, cols) = shape;
        let mut data = vec![0.0; rows * cols];
        if cols > 0 {
            data.par_chunks_mut(cols).enumerate().for_each(|(y, row)| {
                for (x, value) in row.iter_mut().enumerate() {
                    *value = f(x, y);
                }
            });
        }
        Array2::from_shape_vec(shape, data).unwrap_or_else(|_| Array2::zeros(shape))
    }

    fn bilinear_interpolate(src: ArrayView2<f64>, x: f64, y: f64, edge: Edge) -> f64 {
        let (h, w) = src.dim();
        if h == 0 || w == 0 {
            return 0.0;
        }
        if let Edge::Constant(fill) = edge {
            if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
                return fill;
            }
        }

        let x = x.clamp(0.0, (w - 1) as f64);
        let y = y.clamp(0.0, (h - 1) as f64);
        let x1 = x.floor() as usize;
        let y1 = y.floor() as usize;
        let x2 = (x1 + 1).min(w - 1);
        let y2 = (y1 + 1).min(h - 1);

        let fx = x - x1 as f64;
        let fy = y - y1 as f64;

        let p11 = src[[y1, x1]];
        let p12 = src[[y2, x1]];
        let p21 = src[[y1, x2]];
        let p22 = src[[y2, x2]];

        p11 * (1.0 - fx) * (1.0 - fy) + p21 * fx * (1.0 - fy) + p12 * (1.0 - fx) * fy + p22 * fx * fy
    }

    fn bicubic_interpolate(src: ArrayView2<f64>, x: f64, y: f64, edge: Edge) -> f64 {
        let (h, w) = src.dim();
        if h == 0 || w == 0 {
            return 0.0;
        }
        if let Edge::Constant(fill) = edge {
            if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
                return fill;
            }
        }

        let x = x.clamp(0.0, (w - 1) as f64);
        let y = y.clamp(0.0, (h - 1) as f64);
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let pick = |i: f64, n: usize| -> usize { (i.max(0.0) as usize).min(n - 1) };

        let mut value = 0.0;
        for m in -1..=2 {
            let wy = cubic_weight(m as f64 - fy);
            let sy = pick(y0 + m as f64, h);
            for n in -1..=2 {
                let wx = cubic_weight(n as f64 - fx);
                let sx = pick(x0 + n as f64, w);
                value += wy * wx * src[[sy, sx]];
            }
        }
        value
    }
}

/// Keys cubic convolution kernel with a = -0.5.
fn cubic_weight(t: f64) -> f64 {
    let a = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        (a + 2.0) * t.powi(3) - (a + 3.0) * t.powi(2) + 1.0
    } else if t < 2.0 {
        a * t.powi(3) - 5.0 * a * t.powi(2) + 8.0 * a * t - 4.0 * a
    } else {
        0.0
    }
}

/// Mean of the outermost ring of pixels.
pub fn border_mean(frame: ArrayView2<f64>) -> f64 {
    let (h, w) = frame.dim();
    if h == 0 || w == 0 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for ((y, x), v) in frame.indexed_iter() {
        if y == 0 || x == 0 || y == h - 1 || x == w - 1 {
            sum += v;
            count += 1;
        }
    }
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity_warp_preserves_pixels() {
        let src = Array2::from_shape_fn((12, 9), |(y, x)| (y * 9 + x) as f64);
        for interpolation in [Interpolation::Bilinear, Interpolation::Bicubic] {
            let out = ImageTransformer::warp(src.view(), &Similarity::identity(), Edge::Clamp, interpolation);
            for (a, b) in out.iter().zip(src.iter()) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_integer_shift_moves_content() {
        let mut src = Array2::zeros((16, 16));
        src[[5, 4]] = 1.0;
        let out = ImageTransformer::warp(
            src.view(),
            &Similarity::new(0.0, 1.0, (2.0, 3.0)),
            Edge::Constant(0.0),
            Interpolation::Bilinear,
        );
        assert!((out[[7, 7]] - 1.0).abs() < 1e-9);
        assert!(out[[5, 4]].abs() < 1e-9);
    }

    #[test]
    fn test_resize_keeps_constant_field() {
        let src = Array2::from_elem((7, 5), 3.5);
        let out = ImageTransformer::resize(src.view(), (14, 11), Interpolation::Bicubic);
        assert_eq!(out.dim(), (14, 11));
        assert!(out.iter().all(|v| (v - 3.5).abs() < 1e-9));
    }

    #[test]
    fn test_pad_edge_replicates_border() {
        let src = array![[1.0, 2.0], [3.0, 4.0]];
        let out = ImageTransformer::pad_edge(src.view(), (1, 0), (0, 2));
        assert_eq!(out.dim(), (3, 4));
        assert_eq!(out.row(0).to_vec(), vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(out.row(2).to_vec(), vec![3.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_border_mean() {
        let mut frame = Array2::from_elem((4, 4), 2.0);
        frame[[1, 1]] = 100.0;
        assert!((border_mean(frame.view()) - 2.0).abs() < 1e-12);
    }
}
