//! Changelog configuration.
//!
//! # Responsibility
//! - Carry the knobs a host application sets once at startup: which
//!   connection transactions run on, default enrollment knobs, log level.
//!
//! # Invariants
//! - Missing fields deserialize to defaults.
//! - `validate()` must pass before the config is applied.

use crate::db::schema::is_valid_identifier;
use crate::logging::{default_log_level, normalize_level};
use crate::model::tracking::{Enrollment, EnrollmentError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Startup configuration for change managers and record stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Named connection for change transactions; `None` is the default one.
    pub connection: Option<String>,
    /// Knobs for enrolled types that do not override them.
    pub defaults: Enrollment,
    /// `trace|debug|info|warn|error`.
    pub log_level: String,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            connection: None,
            defaults: Enrollment::default(),
            log_level: default_log_level().to_string(),
        }
    }
}

impl ChangelogConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.connection {
            if !is_valid_identifier(name) {
                return Err(ConfigError::InvalidConnection(name.clone()));
            }
        }
        self.defaults
            .validate()
            .map_err(ConfigError::InvalidDefaults)?;
        normalize_level(&self.log_level).map_err(ConfigError::InvalidLogLevel)?;
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidConnection(String),
    InvalidDefaults(EnrollmentError),
    InvalidLogLevel(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConnection(name) => write!(f, "invalid connection name `{name}`"),
            Self::InvalidDefaults(err) => write!(f, "invalid default enrollment: {err}"),
            Self::InvalidLogLevel(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDefaults(err) => Some(err),
            _ => None,
        }
    }
}
