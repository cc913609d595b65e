use ndarray::{Array1, Array2, ArrayView2};
use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Planned forward and inverse 2D transforms for one frame shape.
pub struct Fft2d {
    shape: (usize, usize),
    row_forward: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub fn new(shape: (usize, usize)) -> Self {
        let (rows, cols) = shape;
        let mut planner = FftPlanner::new();
        Self {
            shape,
            row_forward: planner.plan_fft_forward(cols),
            col_forward: planner.plan_fft_forward(rows),
            row_inverse: planner.plan_fft_inverse(cols),
            col_inverse: planner.plan_fft_inverse(rows),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn forward(&self, data: &mut Array2<Complex64>) {
        transform(data, &self.row_forward, &self.col_forward);
    }

    /// Inverse transform, normalized so that `inverse(forward(x)) == x`.
    pub fn inverse(&self, data: &mut Array2<Complex64>) {
        transform(data, &self.row_inverse, &self.col_inverse);
        let norm = 1.0 / (self.shape.0 * self.shape.1).max(1) as f64;
        data.mapv_inplace(|v| v * norm);
    }

    pub fn forward_real(&self, frame: ArrayView2<f64>) -> Array2<Complex64> {
        let mut data = frame.mapv(|v| Complex64::new(v, 0.0));
        self.forward(&mut data);
        data
    }
}

// rows in parallel, then columns via a transposed copy
fn transform(data: &mut Array2<Complex64>, row_fft: &Arc<dyn Fft<f64>>, col_fft: &Arc<dyn Fft<f64>>) {
    process_rows(data, row_fft);
    let mut transposed = data.t().as_standard_layout().into_owned();
    process_rows(&mut transposed, col_fft);
    data.assign(&transposed.t());
}

fn process_rows(data: &mut Array2<Complex64>, fft: &Arc<dyn Fft<f64>>) {
    let cols = data.ncols();
    if cols == 0 {
        return;
    }
    match data.as_slice_mut() {
        Some(slice) => slice.par_chunks_mut(cols).for_each(|row| fft.process(row)),
        None => {
            for mut row in data.rows_mut() {
                let mut row_data: Vec<Complex64> = row.to_vec();
                fft.process(&mut row_data);
                for (i, val) in row_data.iter().enumerate() {
                    row[i] = *val;
                }
            }
        }
    }
}

/// Move the zero-frequency sample to index `(rows / 2, cols / 2)`.
pub fn fftshift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    let (sy, sx) = (rows / 2, cols / 2);
    Array2::from_shape_fn((rows, cols), |(y, x)| {
        data[[(y + rows - sy) % rows, (x + cols - sx) % cols]].clone()
    })
}

pub fn hann(n: usize) -> Array1<f64> {
    if n <= 1 {
        return Array1::ones(n);
    }
    Array1::from_shape_fn(n, |i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
}

/// Separable 2D Hann window.
pub fn hann_2d(shape: (usize, usize)) -> Array2<f64> {
    let wy = hann(shape.0);
    let wx = hann(shape.1);
    Array2::from_shape_fn(shape, |(y, x)| wy[y] * wx[x])
}

/// Index offset of a circular correlation sample, in `(-n/2, n/2]`.
pub fn signed_offset(index: usize, n: usize) -> f64 {
    if index > n / 2 {
        index as f64 - n as f64
    } else {
        index as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_inverse_roundtrip() {
        let frame = Array2::from_shape_fn((6, 10), |(y, x)| ((x * 7 + y * 3) % 5) as f64);
        let fft = Fft2d::new(frame.dim());
        let mut spectrum = fft.forward_real(frame.view());
        fft.inverse(&mut spectrum);
        for (a, b) in spectrum.iter().zip(frame.iter()) {
            assert!((a.re - b).abs() < 1e-9);
            assert!(a.im.abs() < 1e-9);
        }
    }

    #[test]
    fn test_dc_term_is_sum() {
        let frame = Array2::from_elem((4, 8), 2.0);
        let spectrum = Fft2d::new((4, 8)).forward_real(frame.view());
        assert!((spectrum[[0, 0]].re - 64.0).abs() < 1e-9);
        assert!(spectrum[[1, 3]].norm() < 1e-9);
    }

    #[test]
    fn test_fftshift_centers_origin() {
        let mut data = Array2::zeros((5, 6));
        data[[0, 0]] = 1.0;
        let shifted = fftshift(&data);
        assert_eq!(shifted[[2, 3]], 1.0);
    }

    #[test]
    fn test_signed_offset_wraps() {
        assert_eq!(signed_offset(3, 10), 3.0);
        assert_eq!(signed_offset(5, 10), 5.0);
        assert_eq!(signed_offset(6, 10), -4.0);
        assert_eq!(signed_offset(9, 10), -1.0);
    }

    #[test]
    fn test_hann_endpoints() {
        let window = hann(9);
        assert!(window[0].abs() < 1e-12);
        assert!((window[4] - 1.0).abs() < 1e-12);
    }
}
