//! Pipeline domain types
//!
//! Declarative pipeline definitions. The store keeps them verbatim inside a
//! `Pipeline` resource's spec; the execution engine interprets them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::PipelineSpecError;

/// Pipeline definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    #[serde(default)]
    pub description: String,
    pub steps: Vec<PipelineStep>,
    #[serde(default)]
    pub on_failure: String,
    #[serde(default)]
    pub max_retries: u32,
}

/// A named step that runs one agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub name: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl PipelineSpec {
    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Checks that step names are unique, every step names an agent and
    /// every dependency refers to a declared step
    pub fn validate(&self) -> Result<(), PipelineSpecError> {
        if self.steps.is_empty() {
            return Err(PipelineSpecError::Empty);
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                return Err(PipelineSpecError::DuplicateStep(step.name.clone()));
            }
            if step.agent.trim().is_empty() {
                return Err(PipelineSpecError::MissingAgent(step.name.clone()));
            }
        }

        for step in &self.steps {
            if let Some(dep) = step.depends_on.iter().find(|d| !names.contains(d.as_str())) {
                return Err(PipelineSpecError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        Ok(())
    }
}
