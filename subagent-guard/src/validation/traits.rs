//! Core validation traits and interfaces

use super::ValidationOutcome;
use serde_json::Value;

/// Capability implemented by every single-parameter checker.
///
/// Implementations never fail for bad input: every finding is recorded in the
/// returned [`ValidationOutcome`].
pub trait ParameterValidator: Send + Sync + std::fmt::Debug {
    fn validate(&self, value: &Value) -> ValidationOutcome;
}
