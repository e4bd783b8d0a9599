//! Error types for core domain operations

use thiserror::Error;

use crate::domain::execution::ExecutionState;

/// Returned when a textual tag does not name a known enum variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseVariantError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseVariantError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Illegal move in the execution lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The execution already reached a terminal state
    #[error("execution is terminal in state {0}")]
    Terminal(ExecutionState),

    /// The lifecycle has no edge between the two states
    #[error("illegal transition from {from} to {to}")]
    Illegal {
        from: ExecutionState,
        to: ExecutionState,
    },

    /// A retry was requested with no retries left
    #[error("retries exhausted ({retry_count}/{max_retries})")]
    RetriesExhausted { retry_count: u32, max_retries: u32 },
}

/// Structural problems in a pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineSpecError {
    #[error("pipeline has no steps")]
    Empty,

    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("step {0} has no agent")]
    MissingAgent(String),
}
