//! Error types shared by the configuration, forcing and driver layers.

use std::io;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"z.air_temp_m"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Any failure surfaced by a simulation run.
#[derive(Debug, Error)]
pub enum SnobalError {
    /// Forcing table lacks one or more required columns.
    #[error("forcing data missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    /// Forcing table has a non-uniform interval or missing values.
    #[error("invalid forcing data: {0}")]
    Data(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The integration kernel reported a non-success status.
    #[error("integration kernel failed on time step {timestamp} (status {status})")]
    Kernel {
        timestamp: NaiveDateTime,
        status: i32,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_names_field() {
        let e = ConfigError::new("z.air_temp_m", "must be >= 0");
        assert_eq!(e.to_string(), "config error: z.air_temp_m: must be >= 0");
    }

    #[test]
    fn schema_error_lists_columns() {
        let e = SnobalError::Schema {
            missing: vec!["temp_air_degC".into(), "wind_speed_ms-1".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("temp_air_degC"));
        assert!(msg.contains("wind_speed_ms-1"));
    }

    #[test]
    fn config_error_converts() {
        let e: SnobalError = ConfigError::new("io", "missing").into();
        assert!(matches!(e, SnobalError::Config(_)));
    }
}
