//! Logging configuration
//!
//! Output destinations and per-component log levels for the registration engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for daily JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// File name prefix inside `log_directory`
    pub file_prefix: String,

    /// Include file location in logs
    pub include_file_location: bool,

    /// Log level for the phase-correlation estimator
    pub estimator_level: String,

    /// Log level for extraction, reconciliation and shape matching
    pub pipeline_level: String,

    /// Log level for the registration service and pose updates
    pub service_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            file_prefix: "registration.log".to_string(),
            include_file_location: false,
            estimator_level: "info".to_string(),
            pipeline_level: "info".to_string(),
            service_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose logging to the console and `logs/`
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            estimator_level: "trace".to_string(),
            pipeline_level: "debug".to_string(),
            service_level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Warnings only, written to files
    pub fn production() -> Self {
        Self {
            global_level: "warn".to_string(),
            console_output: false,
            log_directory: Some(PathBuf::from("/var/log/field-registration")),
            estimator_level: "warn".to_string(),
            pipeline_level: "warn".to_string(),
            service_level: "info".to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, level) in [
            ("global_level", &self.global_level),
            ("estimator_level", &self.estimator_level),
            ("pipeline_level", &self.pipeline_level),
            ("service_level", &self.service_level),
        ] {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Effective log level for a component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "estimator" | "algorithms" => &self.estimator_level,
            "pipeline" | "data" => &self.pipeline_level,
            "service" => &self.service_level,
            _ => &self.global_level,
        }
    }

    /// `EnvFilter` directives: the global level for the crate plus one per component.
    pub fn filter_directives(&self) -> String {
        let krate = env!("CARGO_PKG_NAME").replace('-', "_");
        format!(
            "{krate}={global},{krate}::algorithms={estimator},{krate}::data={pipeline},\
             {krate}::pipeline={pipeline},{krate}::pipeline::service={service}",
            global = self.global_level,
            estimator = self.estimator_level,
            pipeline = self.pipeline_level,
            service = self.service_level,
        )
    }
}
