use ndarray::{Array1, Array2, ArrayView2};
use std::f64::consts::PI;

use crate::algorithms::fft::{fftshift, hann, signed_offset, Fft2d};
use crate::geometry::frame_center;

/// Sampling layout of a log-polar spectrum: rows are angles over [0, π), columns are
/// log-spaced radii.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogPolarGrid {
    pub angles: usize,
    pub radii: usize,
    /// Natural log of the smallest sampled frequency, in cycles per pixel.
    pub log_min: f64,
    /// Log-radius step between columns.
    pub log_step: f64,
}

impl LogPolarGrid {
    /// Grid for frames of `shape`, `oversample` samples per pixel of the larger side,
    /// capped at `max_size` along each axis. Radii stay inside the circle inscribed in
    /// the spectrum so every angle sees the same frequency band.
    pub fn for_shape(shape: (usize, usize), oversample: f64, max_size: usize, min_radius: f64) -> Self {
        let max_dim = shape.0.max(shape.1).max(1) as f64;
        let min_dim = shape.0.min(shape.1).max(4) as f64;
        let size = ((oversample * max_dim).ceil() as usize).clamp(8, max_size.max(8));
        let log_max = (0.5 - 1.0 / min_dim).ln();
        let log_min = (min_radius / max_dim).ln().min(log_max - std::f64::consts::LN_2);
        Self {
            angles: size,
            radii: size,
            log_min,
            log_step: (log_max - log_min) / size as f64,
        }
    }

    /// Degrees per angle row.
    pub fn angle_step(&self) -> f64 {
        180.0 / self.angles as f64
    }

    /// Rotation (degrees, counter-clockwise as displayed) and scale for a shift of
    /// `(d_angle, d_radius)` samples between reference and target spectra.
    pub fn decode(&self, d_angle: f64, d_radius: f64) -> (f64, f64) {
        let mut angle = -d_angle * self.angle_step();
        if angle <= -90.0 {
            angle += 180.0;
        } else if angle > 90.0 {
            angle -= 180.0;
        }
        (angle, (-d_radius * self.log_step).exp())
    }

    /// Rotation for circular row offset `row`.
    pub fn row_angle(&self, row: usize) -> f64 {
        self.decode(signed_offset(row, self.angles), 0.0).0
    }

    /// Scale for circular column offset `col`.
    pub fn col_scale(&self, col: usize) -> f64 {
        self.decode(0.0, signed_offset(col, self.radii)).1
    }
}

/// Turns frames into band-equalized, log-polar resampled magnitude spectra.
///
/// The spatial window is round and centered where estimates rotate, and every radius
/// column is normalized by its mean over angle. Whatever the two spectra share without
/// rotating (radial fall-off, window leakage) therefore drops out before correlation.
pub struct LogPolarTransform {
    grid: LogPolarGrid,
    shape: (usize, usize),
    fft: Fft2d,
    window: Array2<f64>,
    window_weight: f64,
    radial_taper: Array1<f64>,
    /// Fractional (row, col) positions in the shifted spectrum for each output sample.
    samples: Vec<(f64, f64)>,
}

impl LogPolarTransform {
    pub fn new(shape: (usize, usize), grid: LogPolarGrid) -> Self {
        let (rows, cols) = shape;
        let (cy, cx) = ((rows / 2) as f64, (cols / 2) as f64);

        let mut samples = Vec::with_capacity(grid.angles * grid.radii);
        for i in 0..grid.angles {
            let theta = PI * i as f64 / grid.angles as f64;
            let (sin, cos) = theta.sin_cos();
            for j in 0..grid.radii {
                let f = (grid.log_min + j as f64 * grid.log_step).exp();
                samples.push((cy + f * rows as f64 * sin, cx + f * cols as f64 * cos));
            }
        }

        let window = round_window(shape);
        Self {
            grid,
            shape,
            fft: Fft2d::new(shape),
            window_weight: window.sum(),
            window,
            radial_taper: hann(grid.radii),
            samples,
        }
    }

    pub fn grid(&self) -> &LogPolarGrid {
        &self.grid
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Windowed, centered magnitude spectrum. The mean removed is the one the window
    /// sees, so no DC leaks into the low frequencies.
    pub fn magnitude_spectrum(&self, frame: ArrayView2<f64>) -> Array2<f64> {
        let mean = if self.window_weight > 0.0 {
            (&frame * &self.window).sum() / self.window_weight
        } else {
            0.0
        };
        let prepared = (&frame - mean) * &self.window;
        fftshift(&self.fft.forward_real(prepared.view())).mapv(|v| v.norm())
    }

    /// Resample a centered spectrum onto the log-polar grid, then equalize each radius
    /// column to zero mean and unit mean magnitude over angle.
    pub fn resample(&self, spectrum: &Array2<f64>) -> Array2<f64> {
        let (angles, radii) = (self.grid.angles, self.grid.radii);
        let mut polar = Array2::from_shape_fn((angles, radii), |(i, j)| {
            let (y, x) = self.samples[i * radii + j];
            sample_or_zero(spectrum, y, x)
        });

        let column_means: Vec<f64> = polar.columns().into_iter().map(|c| c.mean().unwrap_or(0.0)).collect();
        let floor = column_means.iter().cloned().fold(0.0, f64::max) * 1e-12;
        for (j, mut column) in polar.columns_mut().into_iter().enumerate() {
            let mean = column_means[j];
            if mean <= floor {
                column.fill(0.0);
                continue;
            }
            let taper = self.radial_taper[j];
            column.mapv_inplace(|v| (v / mean - 1.0) * taper);
        }
        polar
    }

    pub fn transform(&self, frame: ArrayView2<f64>) -> Array2<f64> {
        self.resample(&self.magnitude_spectrum(frame))
    }
}

/// Radially symmetric Tukey window about the frame center: flat out to half the
/// inscribed radius, cosine taper to zero at the inscribed circle.
fn round_window(shape: (usize, usize)) -> Array2<f64> {
    let center = frame_center(shape);
    let radius = (shape.0.min(shape.1) as f64 - 1.0).max(1.0) * 0.5;
    let flat = 0.5 * radius;
    Array2::from_shape_fn(shape, |(y, x)| {
        let r = ((x as f64 - center.x).powi(2) + (y as f64 - center.y).powi(2)).sqrt();
        if r <= flat {
            1.0
        } else if r >= radius {
            0.0
        } else {
            0.5 * (1.0 + (PI * (r - flat) / (radius - flat)).cos())
        }
    })
}

fn sample_or_zero(data: &Array2<f64>, y: f64, x: f64) -> f64 {
    let (rows, cols) = data.dim();
    if y < 0.0 || x < 0.0 || y > (rows - 1) as f64 || x > (cols - 1) as f64 {
        return 0.0;
    }
    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(rows - 1);
    let x1 = (x0 + 1).min(cols - 1);
    let fy = y - y0 as f64;
    let fx = x - x0 as f64;

    data[[y0, x0]] * (1.0 - fx) * (1.0 - fy)
        + data[[y0, x1]] * fx * (1.0 - fy)
        + data[[y1, x0]] * (1.0 - fx) * fy
        + data[[y1, x1]] * fx * fy
}
