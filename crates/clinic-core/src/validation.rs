//! Field-level input validation
//!
//! Validators accumulate every problem they find instead of stopping at the
//! first one, so a form can highlight all offending fields at once. A
//! [`ValidationResult`] turns into a [`ValidationFailure`] error when it is
//! not clean.

use serde::{Deserialize, Serialize};

/// Validation error with detailed context
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: ValidationErrorCode,
}

/// Specific validation error codes for programmatic handling
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationErrorCode {
    Required,
    InvalidFormat,
    OutOfRange,
    TooLong,
    TooShort,
    InvalidCharacters,
    DuplicateValue,
    InvalidReference,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({:?})", self.field, self.message, self.code)
    }
}

/// Validation result that can accumulate multiple errors
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
            code,
        });
    }

    /// Record a `Required` error when `value` is blank.
    pub fn require(&mut self, field: &str, value: &str, message: &str) -> bool {
        if value.trim().is_empty() {
            self.add_error(field, message, ValidationErrorCode::Required);
            false
        } else {
            true
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    pub fn has_error_for(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationFailure> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ValidationFailure {
                errors: self.errors,
            })
        }
    }
}

/// A rejected input. Nothing has been written when this is returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Validation failed: {}", join_messages(.errors))]
pub struct ValidationFailure {
    pub errors: Vec<ValidationError>,
}

impl ValidationFailure {
    pub fn single(field: &str, message: &str, code: ValidationErrorCode) -> Self {
        let mut result = ValidationResult::new();
        result.add_error(field, message, code);
        Self {
            errors: result.errors,
        }
    }

    pub fn has_error_for(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// First message, suitable for an inline form hint.
    pub fn first_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// True when `value` is non-empty and made only of ASCII digits.
pub fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Phone numbers: optional leading `+`, then 9 to 15 digits. Spaces, dots
/// and hyphens are ignored.
pub fn validate_phone(phone: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let compact: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    if !is_digits(digits) {
        result.add_error(
            field,
            "Phone number may only contain digits",
            ValidationErrorCode::InvalidCharacters,
        );
    } else if digits.len() < 9 {
        result.add_error(field, "Phone number is too short", ValidationErrorCode::TooShort);
    } else if digits.len() > 15 {
        result.add_error(field, "Phone number is too long", ValidationErrorCode::TooLong);
    }
    result
}

/// Minimal shape check: one `@` with text on both sides and a dot in the
/// domain.
pub fn validate_email(email: &str, field: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        result.add_error(field, "Email address is not valid", ValidationErrorCode::InvalidFormat);
    }
    result
}
