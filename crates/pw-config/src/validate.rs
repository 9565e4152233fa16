//! Configuration validation errors and semantic validation.

use crate::settings::{HashCaps, LogSchema, Settings};
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Smallest memory cost Argon2 accepts, in KiB.
pub const MIN_MEMORY_COST_KIB: u32 = 8;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
        }
    }
}

/// Validate the whole configuration.
pub fn validate_settings(settings: &Settings) -> ValidationResult<()> {
    let counters = settings.log.counters;
    if counters.error_number > counters.entry_number {
        return Err(ValidationError::SemanticError(format!(
            "log.error_number ({}) exceeds log.entry_number ({})",
            counters.error_number, counters.entry_number
        )));
    }

    validate_schema(&settings.log.types)?;
    validate_caps(&settings.hash_parameters)?;
    Ok(())
}

/// Validate the journal schema.
///
/// Field names end up in `name : value` lines, so they must not contain the
/// separator or line breaks.
pub fn validate_schema(schema: &LogSchema) -> ValidationResult<()> {
    for (log_type, fields) in schema.iter() {
        let key = format!("log.types.{}", log_type);

        if fields.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: key,
                message: "at least one required field must be declared".to_string(),
            });
        }

        for (i, name) in fields.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: key,
                    message: format!("field #{} has an empty name", i + 1),
                });
            }
            if name.contains('\n') || name.contains('\r') || name.contains(" : ") {
                return Err(ValidationError::InvalidValue {
                    field: key,
                    message: format!("field name {:?} contains a separator", name),
                });
            }
            if fields[..i].contains(name) {
                return Err(ValidationError::InvalidValue {
                    field: key,
                    message: format!("field {:?} is declared twice", name),
                });
            }
        }
    }
    Ok(())
}

/// Validate hash parameter caps.
pub fn validate_caps(caps: &HashCaps) -> ValidationResult<()> {
    if caps.memory_cost_cap != 0 && caps.memory_cost_cap < MIN_MEMORY_COST_KIB {
        return Err(ValidationError::InvalidValue {
            field: "hash_parameters.memory_cost_cap".to_string(),
            message: format!(
                "must be 0 (no cap) or at least {} KiB, got {}",
                MIN_MEMORY_COST_KIB, caps.memory_cost_cap
            ),
        });
    }
    Ok(())
}
