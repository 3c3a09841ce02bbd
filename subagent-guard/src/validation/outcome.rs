//! Validation outcome model shared by every validator
//!
//! A [`ValidationOutcome`] is the uniform verdict produced by a single
//! parameter validator and by whole-operation validation in the
//! [`ValidatorRegistry`](super::ValidatorRegistry). Its `valid` flag is never
//! set directly: it is derived from the issues recorded through
//! [`ValidationOutcome::add_issue`], so an outcome is invalid exactly when it
//! carries an issue of severity [`Severity::Error`] or above.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw parameter set handed to whole-operation validation
pub type Parameters = serde_json::Map<String, Value>;

/// Key under which a single validator records its sanitized value
pub const SANITIZED_VALUE_KEY: &str = "sanitized_value";

/// Key under which a single validator records its canonical value
pub const VALIDATED_VALUE_KEY: &str = "validated_value";

/// Closed classification of validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCategory {
    /// Input that looks like code, command or markup injection
    Injection,
    /// Missing or empty required input
    Authentication,
    /// Type, length, pattern or enumeration mismatch
    DataIntegrity,
    /// Oversized input or exhausted dispatcher capacity
    ResourceExhaustion,
    /// Leaks of internal detail; prevented structurally by redaction
    InformationDisclosure,
}

impl SecurityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityCategory::Injection => "injection",
            SecurityCategory::Authentication => "authentication",
            SecurityCategory::DataIntegrity => "data_integrity",
            SecurityCategory::ResourceExhaustion => "resource_exhaustion",
            SecurityCategory::InformationDisclosure => "information_disclosure",
        }
    }
}

impl std::fmt::Display for SecurityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Whether an issue of this severity invalidates the outcome
    pub fn is_fatal(&self) -> bool {
        *self >= Severity::Error
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// A single categorized finding. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    message: String,
    category: SecurityCategory,
    severity: Severity,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>, category: SecurityCategory, severity: Severity) -> Self {
        Self {
            message: message.into(),
            category,
            severity,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> SecurityCategory {
        self.category
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

/// Which validation path produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorType {
    /// Fallback checks for operations without registered validators
    Basic,
    /// Registered per-parameter validators
    Specific,
    String,
    Enum,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMetadata {
    pub validator_type: Option<ValidatorType>,
    pub parameters_validated: usize,
    pub security_checks_performed: usize,
}

/// Aggregate verdict of one validation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
    issues: Vec<ValidationIssue>,
    sanitized_parameters: BTreeMap<String, String>,
    parameters: BTreeMap<String, Value>,
    metadata: ValidationMetadata,
}

impl ValidationOutcome {
    /// Create an empty, valid outcome
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            issues: Vec::new(),
            sanitized_parameters: BTreeMap::new(),
            parameters: BTreeMap::new(),
            metadata: ValidationMetadata::default(),
        }
    }

    /// Create an empty outcome tagged with the validator that produced it
    pub fn for_validator(validator_type: ValidatorType) -> Self {
        let mut outcome = Self::new();
        outcome.metadata.validator_type = Some(validator_type);
        outcome
    }

    /// Record a categorized issue.
    ///
    /// Error and Critical issues invalidate the outcome and land in `errors`;
    /// Warning issues land in `warnings`; Info issues are only kept as issues.
    pub fn add_issue(
        &mut self,
        message: impl Into<String>,
        category: SecurityCategory,
        severity: Severity,
    ) {
        let message = message.into();
        if severity.is_fatal() {
            self.errors.push(message.clone());
            self.valid = false;
        } else if severity == Severity::Warning {
            self.warnings.push(message.clone());
        }
        self.issues
            .push(ValidationIssue::new(message, category, severity));
    }

    /// Record an Error-severity issue
    pub fn add_error(&mut self, message: impl Into<String>, category: SecurityCategory) {
        self.add_issue(message, category, Severity::Error);
    }

    /// Record an uncategorized, non-fatal warning
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Record the sanitized form of the validated value
    pub fn set_sanitized_value(&mut self, value: impl Into<String>) {
        self.sanitized_parameters
            .insert(SANITIZED_VALUE_KEY.to_string(), value.into());
    }

    /// Record the canonical (post-validation) form of the validated value
    pub fn set_validated_value(&mut self, value: Value) {
        self.parameters
            .insert(VALIDATED_VALUE_KEY.to_string(), value);
    }

    /// Fold another outcome's findings into this one
    pub fn merge(&mut self, other: &ValidationOutcome) {
        self.valid &= other.valid;
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
        self.issues.extend(other.issues.iter().cloned());
    }

    pub(crate) fn insert_sanitized(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.sanitized_parameters.insert(key.into(), value.into());
    }

    pub(crate) fn insert_parameter(&mut self, key: impl Into<String>, value: Value) {
        self.parameters.insert(key.into(), value);
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut ValidationMetadata {
        &mut self.metadata
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn sanitized_parameters(&self) -> &BTreeMap<String, String> {
        &self.sanitized_parameters
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn metadata(&self) -> &ValidationMetadata {
        &self.metadata
    }

    /// Sanitized value recorded by a single-parameter validator
    pub fn sanitized_value(&self) -> Option<&str> {
        self.sanitized_parameters
            .get(SANITIZED_VALUE_KEY)
            .map(String::as_str)
    }

    /// Canonical value recorded by a single-parameter validator
    pub fn validated_value(&self) -> Option<&Value> {
        self.parameters.get(VALIDATED_VALUE_KEY)
    }

    /// Whether any issue falls into the given category
    pub fn has_category(&self, category: SecurityCategory) -> bool {
        self.issues.iter().any(|issue| issue.category == category)
    }

    /// Number of issues in the given category
    pub fn count_category(&self, category: SecurityCategory) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.category == category)
            .count()
    }

    /// The only error text allowed to reach an end user
    pub fn user_facing_error(&self) -> String {
        super::redact::redacted_user_error(self)
    }
}

impl Default for ValidationOutcome {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_outcome_is_valid_and_empty() {
        let outcome = ValidationOutcome::new();
        assert!(outcome.is_valid());
        assert!(outcome.errors().is_empty());
        assert!(outcome.warnings().is_empty());
        assert!(outcome.issues().is_empty());
        assert_eq!(outcome.metadata().validator_type, None);
    }

    #[test]
    fn test_fatal_issue_invalidates() {
        for severity in [Severity::Error, Severity::Critical] {
            let mut outcome = ValidationOutcome::new();
            outcome.add_issue("bad", SecurityCategory::DataIntegrity, severity);
            assert!(!outcome.is_valid());
            assert_eq!(outcome.errors(), ["bad".to_string()]);
        }
    }

    #[test]
    fn test_non_fatal_issue_keeps_outcome_valid() {
        let mut outcome = ValidationOutcome::new();
        outcome.add_issue(
            "too long",
            SecurityCategory::ResourceExhaustion,
            Severity::Warning,
        );
        outcome.add_issue("note", SecurityCategory::DataIntegrity, Severity::Info);

        assert!(outcome.is_valid());
        assert!(outcome.errors().is_empty());
        assert_eq!(outcome.warnings(), ["too long".to_string()]);
        assert_eq!(outcome.issues().len(), 2);
    }

    #[test]
    fn test_merge_propagates_invalidity() {
        let mut aggregate = ValidationOutcome::new();
        let mut failing = ValidationOutcome::new();
        failing.add_error("missing", SecurityCategory::Authentication);
        failing.add_warning("heads up");

        aggregate.merge(&failing);

        assert!(!aggregate.is_valid());
        assert_eq!(aggregate.errors().len(), 1);
        assert_eq!(aggregate.warnings().len(), 1);
        assert!(aggregate.has_category(SecurityCategory::Authentication));
    }

    #[test]
    fn test_single_value_accessors() {
        let mut outcome = ValidationOutcome::for_validator(ValidatorType::String);
        outcome.set_sanitized_value("clean");
        outcome.set_validated_value(json!("raw"));

        assert_eq!(outcome.sanitized_value(), Some("clean"));
        assert_eq!(outcome.validated_value(), Some(&json!("raw")));
        assert_eq!(outcome.metadata().validator_type, Some(ValidatorType::String));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert!(!Severity::Warning.is_fatal());
    }

    #[test]
    fn test_outcome_serializes_categories_in_snake_case() {
        let mut outcome = ValidationOutcome::new();
        outcome.add_error("bad", SecurityCategory::DataIntegrity);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["issues"][0]["category"], "data_integrity");
        assert_eq!(json["issues"][0]["severity"], "error");
        assert_eq!(json["valid"], false);
    }
}
