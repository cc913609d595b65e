use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::Interpolation;
use crate::geometry::Interval;
use crate::logging::LoggingConfig;
use crate::pipeline::{EstimatorBounds, ReconcileStrategy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub registration: RegistrationConfig,
    pub estimator: EstimatorConfig,
    pub reconcile: ReconcileConfig,
    pub roi: RoiConfig,
    pub logging: LoggingConfig,
}

/// Search ranges and iteration budget for one registration attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Degrees, counter-clockwise as displayed.
    pub angle_range: Interval,
    pub scale_range: Interval,
    /// Pixels of the matched grid.
    pub tx_range: Interval,
    pub ty_range: Interval,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Minimum peak-to-sidelobe ratio of the final spatial correlation.
    pub peak_ratio_threshold: f64,
    /// Log-polar samples per frame pixel along each axis.
    pub log_polar_oversample: f64,
    pub log_polar_max_size: usize,
    /// Innermost spectrum radius sampled by the log-polar grid, in frequency bins.
    pub min_radius: f64,
    pub min_frame_size: usize,
    /// Half-width of the window excluded around a peak when measuring sidelobes.
    pub exclusion_radius: usize,
    /// Degrees of residual rotation below which iteration stops. Half a log-polar row is
    /// always accepted, since finer residuals cannot be resolved.
    pub angle_tolerance: f64,
    /// Log of residual scale below which iteration stops, with the same half-sample floor.
    pub scale_tolerance: f64,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub strategy: ReconcileStrategy,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Fraction of the target's displayed extent added on each side of an automatic ROI.
    pub auto_margin: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        let bounds = EstimatorBounds::default();
        Self {
            angle_range: bounds.angle,
            scale_range: bounds.scale,
            tx_range: bounds.tx,
            ty_range: bounds.ty,
            iterations: 10,
        }
    }
}

impl RegistrationConfig {
    pub fn bounds(&self) -> EstimatorBounds {
        EstimatorBounds {
            angle: self.angle_range,
            scale: self.scale_range,
            tx: self.tx_range,
            ty: self.ty_range,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            peak_ratio_threshold: 6.0,
            log_polar_oversample: 2.0,
            log_polar_max_size: 1024,
            min_radius: 3.0,
            min_frame_size: 8,
            exclusion_radius: 5,
            angle_tolerance: 1e-3,
            scale_tolerance: 1e-5,
            interpolation: Interpolation::Bicubic,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            strategy: ReconcileStrategy::Finer,
            interpolation: Interpolation::Bilinear,
        }
    }
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self { auto_margin: 0.1 }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if content.trim_start().starts_with('{') {
            serde_json::from_str(&content).with_context(|| format!("Invalid JSON config {}", path.display()))?
        } else {
            toml::from_str(&content).with_context(|| format!("Invalid TOML config {}", path.display()))?
        };
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> crate::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let registration = &self.registration;

        for (name, range) in [
            ("angle_range", registration.angle_range),
            ("scale_range", registration.scale_range),
            ("tx_range", registration.tx_range),
            ("ty_range", registration.ty_range),
        ] {
            if !range.is_finite() {
                errors.push(format!("registration.{} must be finite", name));
            }
        }

        if registration.scale_range.min <= 0.0 {
            errors.push("registration.scale_range must be strictly positive".to_string());
        }

        if registration.angle_range.width() >= 360.0 {
            errors.push("registration.angle_range must span less than a full turn".to_string());
        }

        if registration.iterations == 0 {
            errors.push("registration.iterations must be at least 1".to_string());
        }

        let estimator = &self.estimator;
        if estimator.peak_ratio_threshold <= 0.0 {
            errors.push("estimator.peak_ratio_threshold must be positive".to_string());
        }

        if estimator.log_polar_oversample < 1.0 {
            errors.push("estimator.log_polar_oversample must be at least 1.0".to_string());
        }

        if estimator.log_polar_max_size < 8 {
            errors.push("estimator.log_polar_max_size must be at least 8".to_string());
        }

        if estimator.min_radius < 1.0 {
            errors.push("estimator.min_radius must be at least 1.0".to_string());
        }

        if estimator.min_frame_size < 4 {
            errors.push("estimator.min_frame_size must be at least 4".to_string());
        }

        if estimator.angle_tolerance <= 0.0 || estimator.scale_tolerance <= 0.0 {
            errors.push("estimator tolerances must be positive".to_string());
        }

        if !(self.roi.auto_margin >= 0.0 && self.roi.auto_margin.is_finite()) {
            errors.push("roi.auto_margin must be a non-negative number".to_string());
        }

        if let Err(error) = self.logging.validate() {
            errors.push(error);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Format implied by a file extension; TOML unless it reads `json`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

pub fn load_config_or_default(config_path: Option<&str>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    eprintln!("Configuration validation errors:");
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                    eprintln!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                eprintln!("Failed to load config from '{}': {:#}", path, e);
                eprintln!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registration.iterations, 10);
        assert_eq!(config.registration.angle_range, Interval::new(-20.0, 20.0));
        assert_eq!(config.registration.scale_range, Interval::new(0.7, 1.3));
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = Config::default();
        config.registration.iterations = 0;
        config.registration.scale_range = Interval::new(0.0, 1.2);
        config.estimator.peak_ratio_threshold = -1.0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fieldreg.toml");
        let mut config = Config::default();
        config.registration.angle_range = Interval::new(0.0, 20.0);
        config.reconcile.strategy = ReconcileStrategy::ToReference;
        config.save_to_file(&path, ConfigFormat::Toml).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.registration.angle_range, Interval::new(0.0, 20.0));
        assert_eq!(loaded.reconcile.strategy, ReconcileStrategy::ToReference);
        assert_eq!(loaded.estimator, EstimatorConfig::default());
    }

    #[test]
    fn test_json_is_sniffed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.conf");
        std::fs::write(&path, r#"{ "registration": { "iterations": 4, "tx_range": [0.0, 10.0] } }"#).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.registration.iterations, 4);
        assert_eq!(loaded.registration.tx_range, Interval::new(0.0, 10.0));
        assert_eq!(loaded.registration.ty_range, Interval::new(-50.0, 50.0));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[estimator]\npeak_ratio_threshold = 8.0\n").unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.estimator.peak_ratio_threshold, 8.0);
        assert_eq!(loaded.estimator.min_frame_size, 8);
        assert_eq!(loaded.roi.auto_margin, 0.1);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = load_config_or_default(Some("/nonexistent/fieldreg.toml"));
        assert_eq!(config.registration.iterations, 10);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path("a/b.json"), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path("a/b.toml"), ConfigFormat::Toml);
    }
}
