//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_host(config, &mut result);
        Self::validate_session(config, &mut result);
        Self::validate_stream(config, &mut result);
        Self::validate_chat(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_host(config: &Config, result: &mut ValidationResult) {
        let host = &config.host;

        if host.max_age_secs == 0 {
            result.add_error(ValidationError::new(
                "host.max_age_secs",
                "max_age_secs must be greater than 0",
            ));
        }

        if host.create_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "host.create_timeout_ms",
                "create_timeout_ms must be greater than 0",
            ));
        }

        if host.health_check_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "host.health_check_timeout_ms",
                "health_check_timeout_ms must be greater than 0",
            ));
        } else if host.health_check_timeout_ms >= host.create_timeout_ms {
            result.add_error(ValidationError::new(
                "host.health_check_timeout_ms",
                "health_check_timeout_ms must be below create_timeout_ms",
            ));
        }
    }

    fn validate_session(config: &Config, result: &mut ValidationResult) {
        let session = &config.session;

        // A session must never outlive the host that owns it.
        if session.max_age_secs == 0 {
            result.add_error(ValidationError::new(
                "session.max_age_secs",
                "max_age_secs must be greater than 0",
            ));
        } else if session.max_age_secs >= config.host.max_age_secs {
            result.add_error(ValidationError::new(
                "session.max_age_secs",
                format!(
                    "max_age_secs ({}) must be below host.max_age_secs ({})",
                    session.max_age_secs, config.host.max_age_secs
                ),
            ));
        }

        if session.prompt_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "session.prompt_timeout_secs",
                "prompt_timeout_secs must be greater than 0",
            ));
        }

        if session.download_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "session.download_timeout_secs",
                "download_timeout_secs must be greater than 0",
            ));
        }
    }

    fn validate_stream(config: &Config, result: &mut ValidationResult) {
        if config.stream.chunk_budget == 0 {
            result.add_error(ValidationError::new(
                "stream.chunk_budget",
                "chunk_budget must be greater than 0",
            ));
        }

        if config.stream.chunk_delay_ms > 1000 {
            result.add_warning(ValidationWarning::new(
                "stream.chunk_delay_ms",
                "chunk_delay_ms is very high (>1000), synthetic streaming will feel sluggish",
            ));
        }
    }

    fn validate_chat(config: &Config, result: &mut ValidationResult) {
        if config.chat.max_context_chars == 0 {
            result.add_error(ValidationError::new(
                "chat.max_context_chars",
                "max_context_chars must be greater than 0",
            ));
        }

        if config.chat.max_context_chars > 100_000 {
            result.add_warning(ValidationWarning::new(
                "chat.max_context_chars",
                "max_context_chars is very high (>100000), prompts may exceed the model window",
            ));
        }

        if config.chat.default_system_prompt.trim().is_empty() {
            result.add_warning(ValidationWarning::new(
                "chat.default_system_prompt",
                "default_system_prompt is empty",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    config.logging.level, valid_levels
                ),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
