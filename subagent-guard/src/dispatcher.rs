//! Bounded sub-agent task dispatcher
//!
//! Every call runs `validate → admit → run → release` strictly in order.
//! Release is tied to the [`AdmissionPermit`](crate::gate::AdmissionPermit),
//! so it happens exactly once whether the handler completes, times out,
//! fails, panics or is cancelled.
//!
//! Timeouts and cancellation stop *waiting* for the handler: its future is
//! dropped at the next await point, but side effects a collaborator already
//! started (for example an outbound request) are not rolled back.

use crate::context::{TaskContext, DESCRIPTION_FIELD, PROMPT_FIELD, SUBAGENT_TYPE_FIELD, TASK_FIELDS};
use crate::gate::{ConcurrencyGate, SubagentTask};
use crate::types::{
    AuditSummary, DispatchError, DispatcherConfig, FailureClass, SubagentKind, TaskId, TaskReport,
};
use crate::validation::registry::TASK_OPERATION;
use crate::validation::{Parameters, SecurityCategory, Severity, ValidationOutcome, ValidatorRegistry};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub total_requests: AtomicU64,
    pub completed_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub timeout_requests: AtomicU64,
    pub cancelled_requests: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub capacity_rejections: AtomicU64,
    pub total_processing_time_ms: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_received(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_completed(&self, processing_time: Duration) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ms
            .fetch_add(processing_time.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_request_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_timeout(&self) {
        self.timeout_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_cancelled(&self) {
        self.cancelled_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capacity_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self, active_tasks: usize) -> DispatchStats {
        DispatchStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            completed_requests: self.completed_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            timeout_requests: self.timeout_requests.load(Ordering::Relaxed),
            cancelled_requests: self.cancelled_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            active_tasks,
            average_processing_time_ms: {
                let total_time = self.total_processing_time_ms.load(Ordering::Relaxed);
                let completed = self.completed_requests.load(Ordering::Relaxed);
                if completed > 0 {
                    total_time / completed
                } else {
                    0
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub total_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub timeout_requests: u64,
    pub cancelled_requests: u64,
    pub rejected_requests: u64,
    pub capacity_rejections: u64,
    pub active_tasks: usize,
    pub average_processing_time_ms: u64,
}

/// Validates, admits and runs sub-agent tasks under a concurrency ceiling
/// and a per-task timeout.
#[derive(Debug)]
pub struct TaskDispatcher {
    registry: Arc<ValidatorRegistry>,
    config: DispatcherConfig,
    gate: ConcurrencyGate,
    sequence: AtomicU64,
    metrics: Arc<DispatchMetrics>,
}

impl TaskDispatcher {
    pub fn new(registry: Arc<ValidatorRegistry>, config: DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate()?;

        info!(
            "TaskDispatcher initialized with capacity {}, task timeout {:?}",
            config.max_concurrent_tasks, config.task_timeout
        );

        Ok(Self {
            registry,
            gate: ConcurrencyGate::new(config.max_concurrent_tasks),
            config,
            sequence: AtomicU64::new(0),
            metrics: Arc::new(DispatchMetrics::new()),
        })
    }

    /// Dispatcher over the built-in operation registry
    pub fn with_defaults(config: DispatcherConfig) -> Result<Self, DispatchError> {
        let registry = ValidatorRegistry::with_defaults()?;
        Self::new(Arc::new(registry), config)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn active_count(&self) -> usize {
        self.gate.active_count()
    }

    pub fn active_tasks(&self) -> Vec<SubagentTask> {
        self.gate.active_tasks()
    }

    pub fn get_stats(&self) -> DispatchStats {
        self.metrics.get_stats(self.gate.active_count())
    }

    /// Ask every running task to stop. Their slots are released as each
    /// dispatch call returns [`DispatchError::Cancelled`].
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.gate.cancel_all();
        if cancelled > 0 {
            warn!("Cancelling {} running sub-agent tasks", cancelled);
        }
        cancelled
    }

    /// Validate the context's task fields and, if admitted, run the handler.
    ///
    /// The returned error text is always safe to show to an end user.
    pub async fn dispatch(&self, context: &dyn TaskContext) -> Result<TaskReport, DispatchError> {
        self.metrics.record_request_received();

        let mut parameters = Parameters::new();
        for field in TASK_FIELDS {
            if let Some(value) = context.get_field(field) {
                parameters.insert(field.to_string(), Value::String(value));
            }
        }

        let outcome = self.registry.validate_operation(TASK_OPERATION, &parameters);
        if !outcome.is_valid() {
            self.log_rejection(&outcome, context);
            self.metrics.record_request_rejected();
            return Err(DispatchError::Rejected(outcome.user_facing_error()));
        }

        let description = resolve_input(&outcome, DESCRIPTION_FIELD);
        let prompt = resolve_input(&outcome, PROMPT_FIELD);
        let requested_kind = outcome
            .parameters()
            .get(SUBAGENT_TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default();

        let permit = match self.gate.try_admit(requested_kind, |kind| {
            SubagentTask::new(
                self.next_task_id(),
                kind,
                description.clone(),
                self.config.task_timeout,
            )
        }) {
            Ok(permit) => permit,
            Err(e) => {
                match &e {
                    DispatchError::CapacityReached { capacity } => {
                        warn!("Sub-agent limit reached ({} running), rejecting task", capacity);
                        self.metrics.record_capacity_rejection();
                    }
                    other => {
                        warn!("Rejecting sub-agent task: {}", other);
                        self.metrics.record_request_rejected();
                    }
                }
                return Err(e);
            }
        };

        let task = permit.task().clone();
        info!(
            "Starting sub-agent task {} ({}): {}",
            task.id, task.kind, task.description
        );

        let handler = AssertUnwindSafe(run_handler(task.kind, &prompt, context)).catch_unwind();
        let result = tokio::select! {
            _ = task.cancellation_token().cancelled() => Err(DispatchError::Cancelled),
            timed = tokio::time::timeout(self.config.task_timeout, handler) => match timed {
                Err(_) => Err(DispatchError::Timeout { duration: self.config.task_timeout }),
                Ok(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    error!("Sub-agent task {} panicked: {}", task.id, message);
                    Err(DispatchError::Failed(FailureClass::classify(&message)))
                }
                Ok(Ok(Err(e))) => {
                    let message = format!("{:#}", e);
                    error!("Sub-agent task {} failed: {}", task.id, message);
                    Err(DispatchError::Failed(FailureClass::classify(&message)))
                }
                Ok(Ok(Ok(output))) => Ok(output),
            },
        };

        drop(permit);
        let elapsed = task.elapsed();

        match result {
            Ok(output) => {
                info!("Sub-agent task {} completed in {:?}", task.id, elapsed);
                self.metrics.record_request_completed(elapsed);
                Ok(TaskReport {
                    task_id: task.id,
                    kind: task.kind,
                    output,
                    audit: AuditSummary {
                        validated: true,
                        warning_count: outcome.warnings().len(),
                        sanitization_applied: sanitization_applied(&outcome),
                    },
                    description,
                    prompt,
                    elapsed,
                })
            }
            Err(e) => {
                match &e {
                    DispatchError::Timeout { duration } => {
                        warn!("Sub-agent task {} timed out after {:?}", task.id, duration);
                        self.metrics.record_request_timeout();
                    }
                    DispatchError::Cancelled => {
                        warn!("Sub-agent task {} cancelled after {:?}", task.id, elapsed);
                        self.metrics.record_request_cancelled();
                    }
                    _ => self.metrics.record_request_failed(),
                }
                Err(e)
            }
        }
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::generate(self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn log_rejection(&self, outcome: &ValidationOutcome, context: &dyn TaskContext) {
        for issue in outcome.issues().iter().filter(|i| i.severity().is_fatal()) {
            if issue.category() == SecurityCategory::Injection {
                error!(
                    session_id = %context.session_id(),
                    category = %issue.category(),
                    "Blocked sub-agent task input: {}",
                    issue.message()
                );
            } else if issue.severity() == Severity::Critical {
                error!(category = %issue.category(), "Sub-agent task validation: {}", issue.message());
            } else {
                warn!(category = %issue.category(), "Sub-agent task validation: {}", issue.message());
            }
        }
    }
}

/// Handler body, chosen purely by kind
async fn run_handler(
    kind: SubagentKind,
    prompt: &str,
    context: &dyn TaskContext,
) -> anyhow::Result<String> {
    match kind {
        SubagentKind::GeneralPurpose => {
            debug!("Delegating general-purpose prompt to request processor");
            let response = context.process_request(prompt).await?;
            // The processor's own error is internal text, passed through as is
            if response.success {
                Ok(format!(
                    "General-purpose agent completed: {}",
                    response
                        .output
                        .unwrap_or_else(|| "Task completed successfully".to_string())
                ))
            } else {
                Ok(format!(
                    "General-purpose agent encountered error: {}",
                    response.error.unwrap_or_else(|| "unknown error".to_string())
                ))
            }
        }
        SubagentKind::StatuslineSetup => Ok(format!(
            "Statusline configuration updated based on: {}",
            prompt
        )),
        SubagentKind::OutputStyleSetup => {
            Ok(format!("Output style created based on: {}", prompt))
        }
    }
}

/// Sanitized form of a field if one was produced, else its canonical value
fn resolve_input(outcome: &ValidationOutcome, field: &str) -> String {
    outcome
        .sanitized_parameters()
        .get(&format!("sanitized_{}", field))
        .cloned()
        .or_else(|| {
            outcome
                .parameters()
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn sanitization_applied(outcome: &ValidationOutcome) -> bool {
    [DESCRIPTION_FIELD, PROMPT_FIELD].iter().any(|field| {
        let canonical = outcome.parameters().get(*field).and_then(Value::as_str);
        let sanitized = outcome
            .sanitized_parameters()
            .get(&format!("sanitized_{}", field))
            .map(String::as_str);
        sanitized.is_some() && sanitized != canonical
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
