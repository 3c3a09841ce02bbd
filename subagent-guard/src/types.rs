use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use ulid::Ulid;

use crate::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Sequence number first, then a ULID carrying the creation timestamp
    pub fn generate(sequence: u64) -> Self {
        Self(format!("subagent_{}_{}", sequence, Ulid::new()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed allow-list of sub-agent handler kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubagentKind {
    GeneralPurpose,
    StatuslineSetup,
    OutputStyleSetup,
}

impl SubagentKind {
    pub const ALL: [SubagentKind; 3] = [
        SubagentKind::GeneralPurpose,
        SubagentKind::StatuslineSetup,
        SubagentKind::OutputStyleSetup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubagentKind::GeneralPurpose => "general-purpose",
            SubagentKind::StatuslineSetup => "statusline-setup",
            SubagentKind::OutputStyleSetup => "output-style-setup",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SubagentKind::GeneralPurpose => {
                "General-purpose agent for researching complex questions, searching for code, and executing multi-step tasks"
            }
            SubagentKind::StatuslineSetup => "Configures the user's status line setting",
            SubagentKind::OutputStyleSetup => "Creates an output style",
        }
    }

    /// Comma-separated list of every allowed kind
    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for SubagentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubagentKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownKind {
                kind: s.to_string(),
                allowed: Self::allowed_list(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub max_concurrent_tasks: usize,
    pub task_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            task_timeout: Duration::from_secs(300),
        }
    }
}

impl DispatcherConfig {
    pub fn new(max_concurrent_tasks: usize, task_timeout: Duration) -> Self {
        Self {
            max_concurrent_tasks,
            task_timeout,
        }
    }

    /// Build a config from a fractional timeout in seconds
    pub fn with_timeout_secs(max_concurrent_tasks: usize, seconds: f64) -> Result<Self, DispatchError> {
        let task_timeout = Duration::try_from_secs_f64(seconds).map_err(|_| {
            DispatchError::InvalidConfig(format!(
                "Task timeout must be a finite, non-negative number of seconds, got: {}",
                seconds
            ))
        })?;
        let config = Self::new(max_concurrent_tasks, task_timeout);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_concurrent_tasks == 0 {
            return Err(DispatchError::InvalidConfig(
                "Max concurrent tasks must be greater than 0".to_string(),
            ));
        }

        // Sub-second timeouts are legal
        if self.task_timeout.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "Task timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Coarse classification of an unexpected failure while a task runs.
///
/// Each class renders as one fixed phrase; the underlying error text is
/// logged, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureClass {
    #[error("Task validation failed - please check your input and try again")]
    Validation,

    #[error("Task execution timeout - please try again later")]
    Timeout,

    #[error("Task execution failed due to an internal error - please try again later")]
    Internal,
}

impl FailureClass {
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("validation") {
            FailureClass::Validation
        } else if message.contains("timeout") {
            FailureClass::Timeout
        } else {
            FailureClass::Internal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Input failed validation; carries the redacted user-facing text only
    #[error("{0}")]
    Rejected(String),

    #[error("Sub-agent concurrency limit reached (all {capacity} slots occupied)\n\n💡 Wait for a running task to finish and retry, or increase max_concurrent_tasks (current: {capacity})")]
    CapacityReached { capacity: usize },

    #[error("Invalid subagent_type: {kind}. Available types: {allowed}")]
    UnknownKind { kind: String, allowed: String },

    #[error("Sub-agent task timeout after {duration:?}\n\n💡 Simplify the task prompt or increase task_timeout in the dispatcher configuration")]
    Timeout { duration: Duration },

    #[error("{0}")]
    Failed(FailureClass),

    #[error("Sub-agent task was cancelled before completion")]
    Cancelled,

    #[error("Invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registry(#[from] ValidationError),
}

impl DispatchError {
    /// Whether the caller may simply retry later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::CapacityReached { .. } | DispatchError::Timeout { .. }
        )
    }
}

/// Audit summary attached to every completed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub validated: bool,
    pub warning_count: usize,
    pub sanitization_applied: bool,
}

/// Successful result of one dispatched task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub kind: SubagentKind,
    pub output: String,
    /// Sanitized description echoed back
    pub description: String,
    /// Sanitized prompt echoed back
    pub prompt: String,
    pub audit: AuditSummary,
    pub elapsed: Duration,
}

/// Flat envelope handed back across the tool boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<TaskReport, DispatchError>> for TaskResponse {
    fn from(result: Result<TaskReport, DispatchError>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                output: Some(format!(
                    "Sub-agent ({}) completed task: {}\n{}",
                    report.kind, report.description, report.output
                )),
                error: None,
            },
            Err(error) => Self {
                success: false,
                output: None,
                error: Some(error.to_string()),
            },
        }
    }
}
