pub mod fft;
pub mod fourier_mellin;
pub mod log_polar;
pub mod phase_correlation;

pub use fft::*;
pub use fourier_mellin::*;
pub use log_polar::*;
pub use phase_correlation::*;
