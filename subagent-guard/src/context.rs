//! Collaborator contracts consumed by the dispatcher

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Field names the dispatcher extracts from a [`TaskContext`]
pub const DESCRIPTION_FIELD: &str = "description";
pub const PROMPT_FIELD: &str = "prompt";
pub const SUBAGENT_TYPE_FIELD: &str = "subagent_type";

pub const TASK_FIELDS: [&str; 3] = [DESCRIPTION_FIELD, PROMPT_FIELD, SUBAGENT_TYPE_FIELD];

/// Result of handing a prompt to the request processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ProcessResponse {
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Caller-supplied context of one dispatch.
///
/// `process_request` is only used by the general-purpose handler. An `Err`
/// from it is an unexpected failure: it is logged and mapped to a fixed
/// phrase, never shown to the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskContext: Send + Sync {
    /// Look up a logical field; absent fields are `None`
    fn get_field(&self, name: &str) -> Option<String>;

    fn session_id(&self) -> String;

    async fn process_request(&self, prompt: &str) -> anyhow::Result<ProcessResponse>;
}
