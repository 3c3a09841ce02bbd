//! Enumerated-choice parameter validation

use super::json_type_name;
use crate::validation::{ParameterValidator, SecurityCategory, ValidationOutcome, ValidatorType};
use serde_json::Value;
use std::collections::BTreeSet;

/// Validates that a string parameter is one of a fixed set of values
///
/// When case-insensitive, the allowed set is lowercased once at construction.
/// A miss never echoes the rejected value back.
#[derive(Debug, Clone)]
pub struct EnumValidator {
    allowed_values: BTreeSet<String>,
    case_sensitive: bool,
}

impl EnumValidator {
    pub fn new<I, S>(allowed_values: I, case_sensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed_values = allowed_values
            .into_iter()
            .map(|v| {
                let v: String = v.into();
                if case_sensitive {
                    v
                } else {
                    v.to_lowercase()
                }
            })
            .collect();

        Self {
            allowed_values,
            case_sensitive,
        }
    }

    /// Case-sensitive validator over the given values
    pub fn of<I, S>(allowed_values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(allowed_values, true)
    }

    /// Allowed values in lexical order (normalized when case-insensitive)
    pub fn allowed_values(&self) -> impl Iterator<Item = &str> {
        self.allowed_values.iter().map(String::as_str)
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn contains(&self, value: &str) -> bool {
        if self.case_sensitive {
            self.allowed_values.contains(value)
        } else {
            self.allowed_values.contains(&value.to_lowercase())
        }
    }
}

impl ParameterValidator for EnumValidator {
    fn validate(&self, value: &Value) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::for_validator(ValidatorType::Enum);

        let Some(raw) = value.as_str() else {
            outcome.add_error(
                format!("Expected string, got {}", json_type_name(value)),
                SecurityCategory::DataIntegrity,
            );
            return outcome;
        };

        if !self.contains(raw) {
            outcome.add_error(
                format!(
                    "Invalid value. Allowed: {}",
                    self.allowed_values().collect::<Vec<_>>().join(", ")
                ),
                SecurityCategory::DataIntegrity,
            );
            return outcome;
        }

        outcome.set_validated_value(Value::String(raw.to_string()));
        outcome
    }
}
