//! Validation error types
//!
//! These errors describe a validator or registry that could not be built.
//! Bad *input* never produces one of these; it produces a
//! [`ValidationOutcome`](super::ValidationOutcome) instead.

/// Errors raised while constructing validators or the registry
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A configured regular expression does not compile
    #[error("Invalid pattern '{pattern}': {reason}\n\n💡 Check the regular expression syntax of the validator configuration")]
    InvalidPattern { pattern: String, reason: String },

    /// Validator configuration is inconsistent
    #[error("Invalid validator configuration: {0}")]
    InvalidConfig(String),

    /// An operation or parameter was registered twice
    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),
}

impl ValidationError {
    /// Create an invalid pattern error from a regex compilation failure
    pub fn invalid_pattern(pattern: impl Into<String>, err: &regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: err.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a duplicate registration error
    pub fn duplicate_registration(msg: impl Into<String>) -> Self {
        Self::DuplicateRegistration(msg.into())
    }
}

/// Result type for validator construction
pub type ValidationResult<T = ()> = Result<T, ValidationError>;
