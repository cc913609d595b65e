pub mod algorithms;
pub mod config;
pub mod data;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod visualization;

pub use algorithms::PhaseCorrelationEstimator;
pub use config::{load_config_or_default, Config, ConfigFormat};
pub use data::*;
pub use error::{RegistrationError, RegistrationResult};
pub use geometry::*;
pub use pipeline::*;

pub type Result<T> = anyhow::Result<T>;
