//! Resource domain types
//!
//! A resource is any named control object (an agent, a pipeline, ...) stored
//! under the composite key `(kind, namespace, name)`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status assigned to a resource written without one
pub const DEFAULT_STATE: &str = "Registered";
/// Health assigned to a resource written without a status
pub const DEFAULT_HEALTH: &str = "Unknown";

/// Opaque tag naming a resource's schema (e.g. "Agent", "Pipeline")
///
/// Used both as a storage partition key and to route watch events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn agent() -> Self {
        Self::new("Agent")
    }

    pub fn pipeline() -> Self {
        Self::new("Pipeline")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite primary key of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Identity and bookkeeping fields of a resource
///
/// `uid` and `created_at` are assigned by the store on first write and never
/// change afterwards. `updated_at` advances on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Observed state of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub health: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ResourceStatus {
    pub fn new(state: impl Into<String>, health: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            health: health.into(),
            last_updated: None,
        }
    }

    /// `Registered` / `Unknown`, the status of a freshly written resource
    pub fn registered() -> Self {
        Self::new(DEFAULT_STATE, DEFAULT_HEALTH)
    }

    /// A status with no state counts as absent
    pub fn is_unset(&self) -> bool {
        self.state.is_empty()
    }
}

/// A named control object with an opaque spec payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericResource {
    pub kind: ResourceKind,
    pub metadata: ResourceMetadata,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl GenericResource {
    /// Builds an unsaved resource with an empty spec and no status
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            metadata: ResourceMetadata {
                namespace: namespace.into(),
                name: name.into(),
                uid: None,
                created_at: None,
                updated_at: None,
            },
            spec: serde_json::Value::Null,
            status: ResourceStatus::default(),
        }
    }

    /// Replaces the spec with the serialized form of a typed value
    pub fn with_spec<T: Serialize>(mut self, spec: &T) -> Result<Self, serde_json::Error> {
        self.spec = serde_json::to_value(spec)?;
        Ok(self)
    }

    /// Decodes the spec into a typed value
    pub fn spec_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.spec)
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(
            self.kind.clone(),
            self.metadata.namespace.clone(),
            self.metadata.name.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_serializes_camel_case_metadata() {
        let mut res = GenericResource::new(ResourceKind::agent(), "default", "summarizer");
        res.metadata.created_at = Some(Utc::now());
        let value = serde_json::to_value(&res).unwrap();

        assert_eq!(value["kind"], "Agent");
        assert_eq!(value["metadata"]["namespace"], "default");
        assert!(value["metadata"].get("createdAt").is_some());
        assert!(value["metadata"].get("uid").is_none());
    }

    #[test]
    fn test_status_defaults_when_missing() {
        let res: GenericResource = serde_json::from_value(json!({
            "kind": "Agent",
            "metadata": { "namespace": "default", "name": "a" }
        }))
        .unwrap();

        assert!(res.status.is_unset());
        assert_eq!(res.spec, serde_json::Value::Null);
    }

    #[test]
    fn test_typed_spec_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct AgentSpec {
            model: String,
            temperature: f64,
        }

        let spec = AgentSpec {
            model: "small".to_string(),
            temperature: 0.2,
        };
        let res = GenericResource::new(ResourceKind::agent(), "default", "a")
            .with_spec(&spec)
            .unwrap();

        assert_eq!(res.spec["model"], "small");
        assert_eq!(res.spec_as::<AgentSpec>().unwrap(), spec);
    }

    #[test]
    fn test_key_display() {
        let key = ResourceKey::new(ResourceKind::pipeline(), "prod", "ingest");
        assert_eq!(key.to_string(), "Pipeline/prod/ingest");
    }
}
