//! Execution domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{ParseVariantError, TransitionError};

/// Lifecycle state of an execution
///
/// ```text
/// Pending -> Running -> Completed | Failed | Paused
/// Failed  -> Retrying -> Running      (while retry_count < max_retries)
/// Paused  -> Running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    Pending,
    Running,
    Paused,
    Failed,
    Retrying,
    Completed,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Pending => "Pending",
            ExecutionState::Running => "Running",
            ExecutionState::Paused => "Paused",
            ExecutionState::Failed => "Failed",
            ExecutionState::Retrying => "Retrying",
            ExecutionState::Completed => "Completed",
        }
    }

    /// Whether the lifecycle has an edge from `self` to `next`
    ///
    /// This ignores the retry bound; see [`ExecutionRecord::transition`].
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Failed, Retrying)
                | (Retrying, Running)
                | (Paused, Running)
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionState::Pending),
            "Running" => Ok(ExecutionState::Running),
            "Paused" => Ok(ExecutionState::Paused),
            "Failed" => Ok(ExecutionState::Failed),
            "Retrying" => Ok(ExecutionState::Retrying),
            "Completed" => Ok(ExecutionState::Completed),
            other => Err(ParseVariantError::new("execution state", other)),
        }
    }
}

/// One run of an agent or pipeline
///
/// The store persists whatever it is given; lifecycle legality is the
/// caller's responsibility (see [`ExecutionRecord::transition`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Empty until the ledger assigns one
    #[serde(default)]
    pub id: String,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    pub namespace: String,
    pub state: ExecutionState,
    #[serde(default)]
    pub input: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub total_steps: u32,
    /// Lives in its own column; never part of the serialized payload
    #[serde(skip)]
    pub checkpoint: Option<Vec<u8>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tokens_used: i64,
    #[serde(default)]
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Builds a `Pending` record with no id
    pub fn new(agent_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            agent_name: agent_name.into(),
            pipeline_name: None,
            namespace: namespace.into(),
            state: ExecutionState::Pending,
            input: HashMap::new(),
            output: None,
            current_step: 0,
            total_steps: 0,
            checkpoint: None,
            retry_count: 0,
            max_retries: 0,
            priority: 0,
            error: None,
            tokens_used: 0,
            latency_ms: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// `Completed`, or `Failed` with no retries left
    pub fn is_terminal(&self) -> bool {
        match self.state {
            ExecutionState::Completed => true,
            ExecutionState::Failed => self.retries_exhausted(),
            _ => false,
        }
    }

    /// Moves the record to `next`, enforcing the lifecycle rules
    ///
    /// Entering `Retrying` consumes one retry and fails with
    /// `RetriesExhausted` when none are left. The first entry into `Running`
    /// stamps `started_at`; reaching a terminal state stamps `completed_at`.
    pub fn transition(
        &mut self,
        next: ExecutionState,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.state == ExecutionState::Failed
            && next == ExecutionState::Retrying
            && self.retries_exhausted()
        {
            return Err(TransitionError::RetriesExhausted {
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }

        if self.is_terminal() {
            return Err(TransitionError::Terminal(self.state));
        }

        if !self.state.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.state,
                to: next,
            });
        }

        match next {
            ExecutionState::Retrying => {
                // rejected above when no retries are left
                self.retry_count += 1;
            }
            ExecutionState::Running if self.started_at.is_none() => {
                self.started_at = Some(now);
            }
            _ => {}
        }

        self.state = next;
        if self.is_terminal() {
            self.completed_at = Some(now);
        }

        Ok(())
    }

    /// Records an error message and moves to `Failed`
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(ExecutionState::Failed, now)?;
        self.error = Some(error.into());
        Ok(())
    }
}
