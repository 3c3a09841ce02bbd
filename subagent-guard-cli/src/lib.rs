use anyhow::Result;
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::sync::Arc;
use subagent_guard::{
    context::{DESCRIPTION_FIELD, PROMPT_FIELD, SUBAGENT_TYPE_FIELD},
    DispatchError, DispatcherConfig, Parameters, ProcessResponse, TaskContext, TaskDispatcher,
    TaskResponse, ValidationOutcome, ValidatorRegistry,
};
use tracing::{debug, info};
use ulid::Ulid;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_RUNTIME_ERROR: i32 = 1;
pub const EXIT_REJECTED: i32 = 2;

#[derive(Parser)]
#[command(name = "subagent-guard")]
#[command(about = "Validate tool parameters and dispatch bounded sub-agent tasks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a parameter set for one operation
    Validate(ValidateArgs),
    /// Run one sub-agent task through the dispatcher
    Dispatch(DispatchArgs),
}

#[derive(Args, Clone, Debug)]
#[command(
    long_about = "Validate a parameter set against the registered validators of an operation.

Examples:
  subagent-guard validate --operation Bash --param command=\"ls -la\" --param description=list
  subagent-guard validate --operation Task --param description=\"Test task\" \\
      --param prompt=\"Do something\" --param subagent_type=general-purpose --json"
)]
pub struct ValidateArgs {
    /// Operation name, e.g. Task, Bash, Write or Read
    #[arg(long)]
    pub operation: String,

    /// Parameter as key=value; repeat for each parameter
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Print the full outcome as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

#[derive(Args, Clone, Debug)]
pub struct DispatchArgs {
    /// Short description of the task
    #[arg(long)]
    pub description: Option<String>,

    /// Prompt handed to the sub-agent
    #[arg(long)]
    pub prompt: Option<String>,

    /// Sub-agent kind: general-purpose, statusline-setup or output-style-setup
    #[arg(long)]
    pub subagent_type: Option<String>,

    /// Maximum number of concurrently running tasks
    #[arg(long, default_value = "3")]
    pub max_concurrent_tasks: usize,

    /// Task timeout in seconds; fractions are allowed
    #[arg(long, default_value = "300")]
    pub task_timeout: f64,

    /// Print the response envelope as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

/// Parse a `key=value` pair; the value may itself contain `=`
pub fn parse_param(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Parameter must be in key=value form, got: {}", raw))?;
    if key.trim().is_empty() {
        return Err(anyhow::anyhow!("Parameter name cannot be empty"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

pub fn validate_dispatch_args(args: &DispatchArgs) -> Result<DispatcherConfig> {
    DispatcherConfig::with_timeout_secs(args.max_concurrent_tasks, args.task_timeout)
        .map_err(|e| anyhow::anyhow!("{}", e))
}

/// Rendered result of a command and the exit code it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub exit_code: i32,
}

pub fn run_validate(args: &ValidateArgs) -> Result<CommandOutput> {
    let registry = ValidatorRegistry::with_defaults()?;
    if !registry.has_operation(&args.operation) {
        info!(
            "Operation '{}' is not registered; only basic checks apply",
            args.operation
        );
    }

    let parameters: Parameters = args
        .params
        .iter()
        .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
        .collect();

    let outcome = registry.validate_operation(&args.operation, &parameters);
    let text = if args.json {
        serde_json::to_string_pretty(&outcome)?
    } else {
        render_outcome(&outcome)
    };

    Ok(CommandOutput {
        text,
        exit_code: if outcome.is_valid() {
            EXIT_SUCCESS
        } else {
            EXIT_REJECTED
        },
    })
}

fn render_outcome(outcome: &ValidationOutcome) -> String {
    let mut lines = vec![format!(
        "Valid: {}",
        if outcome.is_valid() { "yes" } else { "no" }
    )];
    for error in outcome.errors() {
        lines.push(format!("  error: {}", error));
    }
    for warning in outcome.warnings() {
        lines.push(format!("  warning: {}", warning));
    }
    for (key, value) in outcome.sanitized_parameters() {
        lines.push(format!("  {} = {}", key, value));
    }
    if !outcome.is_valid() {
        lines.push(format!("User error: {}", outcome.user_facing_error()));
    }
    lines.join("\n")
}

/// Context backed by command-line fields and an echoing request processor
#[derive(Debug, Clone)]
pub struct CliContext {
    fields: HashMap<String, String>,
    session_id: String,
}

impl CliContext {
    pub fn from_args(args: &DispatchArgs) -> Self {
        let fields = [
            (DESCRIPTION_FIELD, &args.description),
            (PROMPT_FIELD, &args.prompt),
            (SUBAGENT_TYPE_FIELD, &args.subagent_type),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name.to_string(), v)))
        .collect();

        Self {
            fields,
            session_id: format!("cli_{}", Ulid::new()),
        }
    }
}

#[async_trait]
impl TaskContext for CliContext {
    fn get_field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    fn session_id(&self) -> String {
        self.session_id.clone()
    }

    async fn process_request(&self, prompt: &str) -> Result<ProcessResponse> {
        debug!("Echoing prompt of {} chars", prompt.chars().count());
        Ok(ProcessResponse::completed(format!("Processed: {}", prompt)))
    }
}

pub async fn run_dispatch(args: &DispatchArgs) -> Result<CommandOutput> {
    let config = validate_dispatch_args(args)?;
    let dispatcher = TaskDispatcher::new(Arc::new(ValidatorRegistry::with_defaults()?), config)?;
    let context = CliContext::from_args(args);

    let result = dispatcher.dispatch(&context).await;
    let exit_code = match &result {
        Ok(_) => EXIT_SUCCESS,
        Err(DispatchError::Rejected(_) | DispatchError::UnknownKind { .. }) => EXIT_REJECTED,
        Err(_) => EXIT_RUNTIME_ERROR,
    };

    let response = TaskResponse::from(result);
    let text = if args.json {
        serde_json::to_string_pretty(&response)?
    } else if let Some(output) = &response.output {
        output.clone()
    } else {
        format!("Error: {}", response.error.unwrap_or_default())
    };

    Ok(CommandOutput { text, exit_code })
}
