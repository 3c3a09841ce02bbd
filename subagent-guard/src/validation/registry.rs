//! Operation validator registry
//!
//! Maps an operation name to its ordered parameter bindings. The registry is
//! assembled once through [`RegistryBuilder`] and is read-only afterwards, so
//! it can be shared across tasks behind an `Arc` without locking.

use super::parameter::SECURITY_PATTERNS;
use super::{
    EnumValidator, ParameterValidator, Parameters, SecurityCategory, StringValidator,
    StringValidatorConfig, ValidationError, ValidationOutcome, ValidationResult, ValidatorType,
};
use crate::types::SubagentKind;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Operation name of the sub-agent dispatch tool
pub const TASK_OPERATION: &str = "Task";

/// Longest string accepted by the basic pass for unregistered operations
const BASIC_MAX_LENGTH: usize = 10_000;

/// One `(parameter name → validator)` binding of an operation
#[derive(Debug)]
pub struct ParameterBinding {
    name: String,
    validator: Box<dyn ParameterValidator>,
}

impl ParameterBinding {
    pub fn new(name: impl Into<String>, validator: impl ParameterValidator + 'static) -> Self {
        Self {
            name: name.into(),
            validator: Box::new(validator),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validator(&self) -> &dyn ParameterValidator {
        self.validator.as_ref()
    }
}

/// Assembles a [`ValidatorRegistry`] at startup
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    operations: HashMap<String, Vec<ParameterBinding>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the ordered parameter bindings of an operation
    pub fn register(
        mut self,
        operation: impl Into<String>,
        bindings: Vec<ParameterBinding>,
    ) -> ValidationResult<Self> {
        let operation = operation.into();
        if self.operations.contains_key(&operation) {
            return Err(ValidationError::duplicate_registration(format!(
                "operation '{}' is already registered",
                operation
            )));
        }

        for (index, binding) in bindings.iter().enumerate() {
            if bindings[..index].iter().any(|b| b.name == binding.name) {
                return Err(ValidationError::duplicate_registration(format!(
                    "parameter '{}' is bound twice for operation '{}'",
                    binding.name, operation
                )));
            }
        }

        debug!(
            "Registered {} parameter validators for operation: {}",
            bindings.len(),
            operation
        );
        self.operations.insert(operation, bindings);
        Ok(self)
    }

    /// Register the built-in Task, Bash, Write and Read operations
    pub fn with_default_operations(self) -> ValidationResult<Self> {
        self.register(
            TASK_OPERATION,
            vec![
                ParameterBinding::new("description", StringValidator::bounded(3, 100)?),
                ParameterBinding::new("prompt", StringValidator::bounded(5, 5000)?),
                ParameterBinding::new(
                    "subagent_type",
                    EnumValidator::of(SubagentKind::ALL.iter().map(|k| k.as_str())),
                ),
            ],
        )?
        .register(
            "Bash",
            vec![
                ParameterBinding::new(
                    "command",
                    StringValidator::with_config(StringValidatorConfig {
                        min_length: 1,
                        max_length: 2000,
                        forbidden_patterns: vec![
                            r"rm\s+-rf\s+/".to_string(),
                            r":\s*\(\)\s*\{[^}]*\}\s*;".to_string(),
                            r"while\s+true".to_string(),
                        ],
                        ..Default::default()
                    })?,
                ),
                ParameterBinding::new(
                    "description",
                    StringValidator::with_config(StringValidatorConfig {
                        min_length: 0,
                        max_length: 200,
                        allow_empty: true,
                        ..Default::default()
                    })?,
                ),
            ],
        )?
        .register(
            "Write",
            vec![
                ParameterBinding::new("file_path", StringValidator::bounded(1, 500)?),
                ParameterBinding::new(
                    "content",
                    StringValidator::with_config(StringValidatorConfig {
                        min_length: 0,
                        max_length: 100_000,
                        allow_empty: true,
                        ..Default::default()
                    })?,
                ),
            ],
        )?
        .register(
            "Read",
            vec![ParameterBinding::new(
                "file_path",
                StringValidator::bounded(1, 500)?,
            )],
        )
    }

    pub fn build(self) -> ValidatorRegistry {
        ValidatorRegistry {
            operations: self.operations,
        }
    }
}

/// Summary of what the registry knows about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub registered_operations: usize,
    pub total_validators: usize,
    pub security_patterns: usize,
}

/// Read-only table of operation name → ordered parameter validators
#[derive(Debug)]
pub struct ValidatorRegistry {
    operations: HashMap<String, Vec<ParameterBinding>>,
}

impl ValidatorRegistry {
    /// Registry holding only the built-in operations
    pub fn with_defaults() -> ValidationResult<Self> {
        Ok(RegistryBuilder::new().with_default_operations()?.build())
    }

    pub fn has_operation(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Registered operation names in lexical order
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Parameter names of an operation in registration order
    pub fn parameter_names(&self, operation: &str) -> Option<Vec<&str>> {
        self.operations
            .get(operation)
            .map(|bindings| bindings.iter().map(ParameterBinding::name).collect())
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            registered_operations: self.operations.len(),
            total_validators: self.operations.values().map(Vec::len).sum(),
            security_patterns: SECURITY_PATTERNS.len(),
        }
    }

    /// Validate a whole parameter set for the named operation
    pub fn validate_operation(&self, operation: &str, parameters: &Parameters) -> ValidationOutcome {
        let Some(bindings) = self.operations.get(operation) else {
            debug!(
                "No validators registered for '{}', running basic validation",
                operation
            );
            return Self::basic_validation(parameters);
        };

        debug!(
            "Validating {} parameters for operation '{}'",
            parameters.len(),
            operation
        );

        let mut outcome = ValidationOutcome::for_validator(ValidatorType::Specific);

        for binding in bindings {
            let Some(raw) = parameters.get(&binding.name) else {
                outcome.add_error(
                    format!("missing required parameter: {}", binding.name),
                    SecurityCategory::Authentication,
                );
                continue;
            };

            let result = binding.validator.validate(raw);
            outcome.merge(&result);

            match result.sanitized_value() {
                Some(sanitized) => {
                    outcome.insert_sanitized(format!("sanitized_{}", binding.name), sanitized)
                }
                None => outcome.insert_sanitized(binding.name.clone(), value_text(raw)),
            }

            let canonical = result.validated_value().cloned().unwrap_or_else(|| raw.clone());
            outcome.insert_parameter(binding.name.clone(), canonical);
        }

        let unexpected: Vec<&str> = parameters
            .keys()
            .filter(|key| !bindings.iter().any(|b| &b.name == *key))
            .map(String::as_str)
            .collect();
        if !unexpected.is_empty() {
            outcome.add_warning(format!("Unexpected parameters: {}", unexpected.join(", ")));
        }

        let injection_count = outcome.count_category(SecurityCategory::Injection);
        let metadata = outcome.metadata_mut();
        metadata.parameters_validated = bindings.len();
        metadata.security_checks_performed = injection_count;

        outcome
    }

    /// Fallback checks for operations with no registered validators
    fn basic_validation(parameters: &Parameters) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::for_validator(ValidatorType::Basic);

        for (key, value) in parameters {
            outcome.insert_parameter(key.clone(), value.clone());

            match value {
                Value::Null => {
                    // DataIntegrity text reaches users verbatim, so the key stays in the log
                    debug!("Parameter '{}' is null", key);
                    outcome.add_error("Parameter cannot be null", SecurityCategory::DataIntegrity);
                }
                Value::String(s) => {
                    if s.trim().is_empty() {
                        outcome.add_warning(format!("Parameter '{}' is empty", key));
                    }
                    if s.chars().count() > BASIC_MAX_LENGTH {
                        outcome.add_error(
                            format!(
                                "Parameter '{}' is too long (>{} chars)",
                                key, BASIC_MAX_LENGTH
                            ),
                            SecurityCategory::ResourceExhaustion,
                        );
                    }
                }
                _ => {}
            }
        }

        outcome.metadata_mut().parameters_validated = parameters.len();
        outcome
    }
}

/// Text form of a raw value recorded when no sanitized form exists
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
