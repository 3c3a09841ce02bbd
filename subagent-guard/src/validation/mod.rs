//! Parameter validation pipeline
//!
//! This module provides a trait-based validation system: single-parameter
//! validators produce [`ValidationOutcome`]s, and the [`ValidatorRegistry`]
//! combines them into a whole-operation verdict plus a redacted user-facing
//! error message.

pub mod errors;
pub mod outcome;
pub mod parameter;
pub mod redact;
pub mod registry;
pub mod traits;

// Re-export main validation types
pub use errors::{ValidationError, ValidationResult};
pub use outcome::{
    Parameters, SecurityCategory, Severity, ValidationIssue, ValidationMetadata,
    ValidationOutcome, ValidatorType, SANITIZED_VALUE_KEY, VALIDATED_VALUE_KEY,
};
pub use parameter::{EnumValidator, StringValidator, StringValidatorConfig};
pub use redact::redacted_user_error;
pub use registry::{RegistryBuilder, RegistryStats, ValidatorRegistry};
pub use traits::ParameterValidator;
