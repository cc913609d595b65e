use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

use crate::algorithms::fft::{hann_2d, signed_offset, Fft2d};

/// Peak-to-sidelobe ratios are reported up to this value.
pub const MAX_PEAK_RATIO: f64 = 1e6;

/// Normalized cross-power (phase-only) correlation on a fixed frame shape.
pub struct PhaseCorrelator {
    fft: Fft2d,
    window: Option<Array2<f64>>,
}

/// Located correlation maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Sample index `(row, col)` of the maximum.
    pub index: (usize, usize),
    /// Signed sub-pixel offset `(dy, dx)`.
    pub offset: (f64, f64),
    pub value: f64,
    pub peak_ratio: f64,
}

impl PhaseCorrelator {
    pub fn new(shape: (usize, usize), windowed: bool) -> Self {
        Self {
            fft: Fft2d::new(shape),
            window: windowed.then(|| hann_2d(shape)),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.fft.shape()
    }

    /// Spectrum of a frame with its (window-weighted) mean removed and the window applied.
    pub fn spectrum(&self, frame: ArrayView2<f64>) -> Array2<Complex64> {
        let prepared = match &self.window {
            Some(window) => {
                let weight = window.sum();
                let mean = if weight > 0.0 { (&frame * window).sum() / weight } else { 0.0 };
                (&frame - mean) * window
            }
            None => &frame - frame.mean().unwrap_or(0.0),
        };
        self.fft.forward_real(prepared.view())
    }

    /// Correlation surface whose peak sits at `d` when `b(x) = a(x - d)`.
    pub fn correlate_spectra(&self, a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<f64> {
        let mut cross = Array2::zeros(a.dim());
        ndarray::Zip::from(&mut cross).and(a).and(b).for_each(|out, fa, fb| {
            let product = fb * fa.conj();
            let magnitude = product.norm();
            *out = if magnitude > 1e-10 {
                product / magnitude
            } else {
                Complex64::new(0.0, 0.0)
            };
        });
        self.fft.inverse(&mut cross);
        cross.mapv(|v| v.re)
    }
}

/// Highest finite sample anywhere on the surface.
pub fn find_peak(surface: &Array2<f64>) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), f64)> = None;
    for ((y, x), &value) in surface.indexed_iter() {
        if !value.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, v)| value > v) {
            best = Some(((y, x), value));
        }
    }
    best.map(|(index, _)| index)
}

/// Sub-sample offset of a peak from a parabola through it and its two neighbours, per axis.
pub fn refine_parabolic(surface: &Array2<f64>, index: (usize, usize)) -> (f64, f64) {
    let (rows, cols) = surface.dim();
    let (y, x) = index;
    let center = surface[[y, x]];

    let vertex = |left: f64, right: f64| -> f64 {
        let denom = left - 2.0 * center + right;
        if denom.abs() < 1e-12 {
            return 0.0;
        }
        (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
    };

    let dy = vertex(surface[[(y + rows - 1) % rows, x]], surface[[(y + 1) % rows, x]]);
    let dx = vertex(surface[[y, (x + cols - 1) % cols]], surface[[y, (x + 1) % cols]]);
    (dy, dx)
}

/// (peak - sidelobe mean) / sidelobe deviation, with a `(2r+1)²` region around the
/// peak left out of the sidelobe.
pub fn peak_to_sidelobe(surface: &Array2<f64>, index: (usize, usize), exclusion_radius: usize) -> f64 {
    let (rows, cols) = surface.dim();
    let peak = surface[[index.0, index.1]];

    let near = |i: usize, c: usize, n: usize| -> bool {
        let d = (i + n - c) % n;
        d <= exclusion_radius || n - d <= exclusion_radius
    };

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for ((y, x), &value) in surface.indexed_iter() {
        if near(y, index.0, rows) && near(x, index.1, cols) {
            continue;
        }
        sum += value;
        sum_sq += value * value;
        count += 1;
    }
    if count < 2 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    let std = variance.sqrt();
    if std < 1e-12 {
        return if peak > mean { MAX_PEAK_RATIO } else { 0.0 };
    }
    ((peak - mean) / std).min(MAX_PEAK_RATIO)
}

/// Locate the global peak and describe it.
pub fn locate_peak(surface: &Array2<f64>, exclusion_radius: usize) -> Option<CorrelationPeak> {
    let (rows, cols) = surface.dim();
    let index = find_peak(surface)?;
    let (oy, ox) = refine_parabolic(surface, index);
    Some(CorrelationPeak {
        index,
        offset: (signed_offset(index.0, rows) + oy, signed_offset(index.1, cols) + ox),
        value: surface[[index.0, index.1]],
        peak_ratio: peak_to_sidelobe(surface, index, exclusion_radius),
    })
}
