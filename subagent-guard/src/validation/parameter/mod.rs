//! Single-parameter validators

mod enum_validator;
mod string_validator;

pub use enum_validator::EnumValidator;
pub use string_validator::{sanitize_string, StringValidator, StringValidatorConfig, SECURITY_PATTERNS};

use serde_json::Value;

/// Name of a JSON value's type, used in type-mismatch messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
