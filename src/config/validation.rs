//! Configuration validation
//!
//! Checks a loaded configuration for values the engine cannot work with:
//! - Empty data directory
//! - Zero unsend window or password length
//! - A domain that is not an `@` suffix

use super::postbox_config::PostboxConfig;
use crate::PostboxError;

/// Validation error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a Postbox configuration, collecting every problem
pub fn validate_config(config: &PostboxConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.data_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("data_dir", "Data directory must be set"));
    }

    if config.unsend_window_secs == 0 {
        errors.push(ValidationError::new(
            "unsend_window_secs",
            "Unsend window must be at least one second",
        ));
    }

    if config.min_password_len == 0 {
        errors.push(ValidationError::new(
            "min_password_len",
            "Minimum password length must be at least 1",
        ));
    }

    if !config.domain.is_empty() && (!config.domain.starts_with('@') || config.domain.len() < 2) {
        errors.push(ValidationError::new(
            "domain",
            format!("Domain must look like '@example.com', got '{}'", config.domain),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and fold all problems into one error
pub fn validate_config_result(config: &PostboxConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        PostboxError::Config(messages.join("; "))
    })
}
