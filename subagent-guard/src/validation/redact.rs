//! User-facing error redaction
//!
//! [`redacted_user_error`] is the trust boundary between validation findings
//! and an end user. It only ever emits the raw text of DataIntegrity findings
//! (which never quote input) and a fixed phrase per other category, so the
//! detection mechanism and the offending input are never disclosed.

use super::{SecurityCategory, ValidationOutcome};

/// Maximum number of phrases joined into one user error
const MAX_USER_ERRORS: usize = 3;

const INJECTION_PHRASE: &str = "Invalid characters detected in input";
const AUTHENTICATION_PHRASE: &str = "Required parameters are missing or invalid";
const GENERIC_PHRASE: &str = "Validation failed - please check your input";

/// Compose the redacted, user-safe error for an outcome.
///
/// Fatal issues are grouped by category in order of first appearance and
/// rendered through an allow-listed phrase per category; at most three
/// phrases are joined with `"; "`. A valid outcome yields an empty string.
/// Warnings, including the truncation warning, are left out even when the
/// outcome is invalid.
pub fn redacted_user_error(outcome: &ValidationOutcome) -> String {
    let mut groups: Vec<(SecurityCategory, Vec<&str>)> = Vec::new();
    for issue in outcome
        .issues()
        .iter()
        .filter(|issue| issue.severity().is_fatal())
    {
        match groups.iter_mut().find(|(c, _)| *c == issue.category()) {
            Some((_, messages)) => messages.push(issue.message()),
            None => groups.push((issue.category(), vec![issue.message()])),
        }
    }

    let mut phrases: Vec<&str> = Vec::new();
    for (category, messages) in groups {
        match category {
            SecurityCategory::DataIntegrity => phrases.extend(messages),
            SecurityCategory::Injection => phrases.push(INJECTION_PHRASE),
            SecurityCategory::Authentication => phrases.push(AUTHENTICATION_PHRASE),
            SecurityCategory::ResourceExhaustion | SecurityCategory::InformationDisclosure => {
                phrases.push(GENERIC_PHRASE)
            }
        }
    }

    phrases
        .into_iter()
        .take(MAX_USER_ERRORS)
        .collect::<Vec<_>>()
        .join("; ")
}
