//! String parameter validation with injection scanning and sanitization

use super::json_type_name;
use crate::validation::{
    ParameterValidator, SecurityCategory, Severity, ValidationError, ValidationOutcome,
    ValidationResult, ValidatorType,
};
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

/// Injection signatures checked, in order, against every string value.
///
/// Shell metacharacters, script tags, SQL statement keywords followed by
/// whitespace, and code-execution calls.
pub const SECURITY_PATTERNS: &[&str] = &[
    r"[;&|`$]",
    r"(?i)<script[^>]*>.*?</script>",
    r"(?i)(union|select|insert|update|delete|drop|create|alter)\s+",
    r"(?i)eval\s*\(|exec\s*\(|system\s*\(",
];

/// Characters escaped with a backslash during sanitization
const SHELL_METACHARACTERS: &[char] = &['&', '|', ';', '`', '$', '(', ')', '<', '>', '"', '\''];

/// Configuration for string validation
#[derive(Debug, Clone)]
pub struct StringValidatorConfig {
    /// Minimum length in characters
    pub min_length: usize,
    /// Values longer than this are truncated with a warning
    pub max_length: usize,
    /// Whether blank values are accepted
    pub allow_empty: bool,
    /// Format the value must match from its first character
    pub pattern: Option<String>,
    /// Caller-supplied patterns that reject the value on match
    pub forbidden_patterns: Vec<String>,
}

impl Default for StringValidatorConfig {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 10_000,
            allow_empty: false,
            pattern: None,
            forbidden_patterns: Vec::new(),
        }
    }
}

/// Validates string parameters with security checks
///
/// This validator performs, in order:
/// - Type and emptiness checks
/// - Length bounds (oversize values are truncated, not rejected)
/// - Optional format pattern
/// - Injection signature scan
/// - Caller-supplied forbidden patterns
/// - Sanitization of the surviving value
#[derive(Debug, Clone)]
pub struct StringValidator {
    config: StringValidatorConfig,
    pattern: Option<Regex>,
    security_patterns: Vec<Regex>,
    forbidden_patterns: Vec<Regex>,
}

impl StringValidator {
    /// Create a string validator with default bounds
    pub fn new() -> ValidationResult<Self> {
        Self::with_config(StringValidatorConfig::default())
    }

    /// Create a string validator with the given length bounds
    pub fn bounded(min_length: usize, max_length: usize) -> ValidationResult<Self> {
        Self::with_config(StringValidatorConfig {
            min_length,
            max_length,
            ..Default::default()
        })
    }

    /// Create a validator with custom configuration
    pub fn with_config(config: StringValidatorConfig) -> ValidationResult<Self> {
        if config.min_length > config.max_length {
            return Err(ValidationError::invalid_config(format!(
                "min_length ({}) cannot exceed max_length ({})",
                config.min_length, config.max_length
            )));
        }

        let pattern = config.pattern.as_deref().map(compile).transpose()?;
        let security_patterns = SECURITY_PATTERNS
            .iter()
            .map(|p| compile(p))
            .collect::<ValidationResult<Vec<_>>>()?;
        let forbidden_patterns = config
            .forbidden_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<ValidationResult<Vec<_>>>()?;

        Ok(Self {
            config,
            pattern,
            security_patterns,
            forbidden_patterns,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &StringValidatorConfig {
        &self.config
    }

    /// Number of built-in injection signatures
    pub fn security_pattern_count(&self) -> usize {
        self.security_patterns.len()
    }

    fn matches_format(&self, value: &str) -> bool {
        match &self.pattern {
            // Leftmost match: if any match begins at 0, this one does
            Some(pattern) => pattern.find(value).is_some_and(|m| m.start() == 0),
            None => true,
        }
    }

    fn contains_injection(&self, value: &str) -> bool {
        self.security_patterns.iter().any(|p| p.is_match(value))
    }

    fn contains_forbidden(&self, value: &str) -> bool {
        self.forbidden_patterns.iter().any(|p| p.is_match(value))
    }
}

impl ParameterValidator for StringValidator {
    fn validate(&self, value: &Value) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::for_validator(ValidatorType::String);

        let Some(raw) = value.as_str() else {
            outcome.add_error(
                format!("Expected string, got {}", json_type_name(value)),
                SecurityCategory::DataIntegrity,
            );
            return outcome;
        };

        // A blank required field means the argument is missing, not malformed
        if raw.trim().is_empty() && !self.config.allow_empty {
            outcome.add_error("Value cannot be empty", SecurityCategory::Authentication);
            return outcome;
        }

        let length = raw.chars().count();
        if length < self.config.min_length {
            outcome.add_error(
                format!(
                    "Value too short (minimum {} characters)",
                    self.config.min_length
                ),
                SecurityCategory::DataIntegrity,
            );
            return outcome;
        }

        let value: Cow<'_, str> = if length > self.config.max_length {
            outcome.add_issue(
                format!(
                    "Value too long (maximum {} characters)",
                    self.config.max_length
                ),
                SecurityCategory::ResourceExhaustion,
                Severity::Warning,
            );
            outcome.add_warning(format!(
                "Value truncated to {} characters",
                self.config.max_length
            ));
            Cow::Owned(raw.chars().take(self.config.max_length).collect())
        } else {
            Cow::Borrowed(raw)
        };

        if !self.matches_format(&value) {
            outcome.add_error(
                "Value does not match required pattern",
                SecurityCategory::DataIntegrity,
            );
            return outcome;
        }

        // Never say which signature matched
        if self.contains_injection(&value) {
            outcome.add_issue(
                "Input contains potentially dangerous content",
                SecurityCategory::Injection,
                Severity::Critical,
            );
            return outcome;
        }

        if self.contains_forbidden(&value) {
            outcome.add_error(
                "Input contains forbidden content",
                SecurityCategory::DataIntegrity,
            );
            return outcome;
        }

        outcome.set_sanitized_value(sanitize_string(&value));
        outcome.set_validated_value(Value::String(value.into_owned()));
        outcome
    }
}

fn compile(pattern: &str) -> ValidationResult<Regex> {
    Regex::new(pattern).map_err(|e| ValidationError::invalid_pattern(pattern, &e))
}

fn is_stripped_control(c: char) -> bool {
    matches!(c, '\x00'..='\x08' | '\x0b' | '\x0c' | '\x0e'..='\x1f' | '\x7f')
}

/// Strip control characters, backslash-escape shell metacharacters, then trim.
///
/// Tab, line feed and carriage return are kept.
pub fn sanitize_string(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());
    for c in value.chars().filter(|c| !is_stripped_control(*c)) {
        if SHELL_METACHARACTERS.contains(&c) {
            sanitized.push('\\');
        }
        sanitized.push(c);
    }
    sanitized.trim().to_string()
}
