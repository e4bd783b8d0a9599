//! Execution DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::execution::ExecutionRecord;

/// Request to start a new execution of an agent or pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExecution {
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    pub namespace: String,
    #[serde(default)]
    pub input: HashMap<String, String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub max_retries: u32,
}

impl CreateExecution {
    /// A fresh `Pending` record; the ledger assigns its id on create
    pub fn into_record(self) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(self.agent_name, self.namespace);
        record.pipeline_name = self.pipeline_name;
        record.input = self.input;
        record.priority = self.priority;
        record.max_retries = self.max_retries;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ExecutionState;

    #[test]
    fn test_into_record_starts_pending() {
        let req = CreateExecution {
            agent_name: "summarizer".to_string(),
            namespace: "default".to_string(),
            max_retries: 3,
            input: HashMap::from([("url".to_string(), "https://example.com".to_string())]),
            ..Default::default()
        };

        let record = req.into_record();
        assert_eq!(record.state, ExecutionState::Pending);
        assert_eq!(record.max_retries, 3);
        assert_eq!(record.retry_count, 0);
        assert!(!record.has_id());
        assert_eq!(record.input["url"], "https://example.com");
    }
}
