//! Resource change events delivered to watchers

use serde::{Deserialize, Serialize};

use super::resource::GenericResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

/// A committed change to a resource
///
/// For `Deleted` the resource is the state it had just before removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub resource: GenericResource,
}

impl ResourceEvent {
    pub fn new(event_type: EventType, resource: GenericResource) -> Self {
        Self {
            event_type,
            resource,
        }
    }
}
