pub mod context;
pub mod dispatcher;
pub mod gate;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use types::*;

// Re-export dispatcher functionality
pub use context::{ProcessResponse, TaskContext};
pub use dispatcher::{DispatchMetrics, DispatchStats, TaskDispatcher};
pub use gate::{AdmissionPermit, ConcurrencyGate, SubagentTask};

// Re-export validation functionality
pub use validation::registry::{ParameterBinding, TASK_OPERATION};
pub use validation::{
    redacted_user_error, ParameterValidator, Parameters, RegistryBuilder, ValidationError,
    ValidationOutcome, ValidatorRegistry,
};
