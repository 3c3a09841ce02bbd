#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use subagent_guard::{ProcessResponse, TaskContext};

/// Test utilities and common setup functions

/// Context serving fixed fields and a processor that optionally suspends
#[derive(Debug, Clone)]
pub struct StubContext {
    fields: HashMap<String, String>,
    delay: Duration,
    failure: Option<String>,
}

impl StubContext {
    pub fn new(description: &str, prompt: &str, subagent_type: &str) -> Self {
        Self {
            fields: HashMap::from([
                ("description".to_string(), description.to_string()),
                ("prompt".to_string(), prompt.to_string()),
                ("subagent_type".to_string(), subagent_type.to_string()),
            ]),
            delay: Duration::ZERO,
            failure: None,
        }
    }

    /// Valid general-purpose task
    pub fn general() -> Self {
        Self::new("Test task", "Do something useful", "general-purpose")
    }

    pub fn empty() -> Self {
        Self {
            fields: HashMap::new(),
            delay: Duration::ZERO,
            failure: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the processor fail with an internal error carrying `message`
    pub fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

#[async_trait]
impl TaskContext for StubContext {
    fn get_field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    fn session_id(&self) -> String {
        "integration-session".to_string()
    }

    async fn process_request(&self, prompt: &str) -> anyhow::Result<ProcessResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(message) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(ProcessResponse::completed(format!("handled: {}", prompt))),
        }
    }
}

/// Substrings no user-facing message may ever contain
pub const LEAKY_FRAGMENTS: [&str; 3] = ["rm -rf", "security", "injection"];

pub fn assert_no_leak(message: &str) {
    let lowered = message.to_lowercase();
    for fragment in LEAKY_FRAGMENTS {
        assert!(
            !lowered.contains(fragment),
            "message leaked '{}': {}",
            fragment,
            message
        );
    }
}
