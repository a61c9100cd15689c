//! Allocation lifecycle events published by the engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AllocationId, ResourceType};
use crate::priority::Priority;
use crate::quantity::Quantity;
use crate::shortfall::ShortfallReport;

/// A timestamped lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: AllocationEventKind,
}

impl AllocationEvent {
    pub fn new(sequence: u64, kind: AllocationEventKind) -> Self {
        Self {
            sequence,
            recorded_at: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocationEventKind {
    ResourceRegistered {
        resource: ResourceType,
        total: Quantity,
    },
    AllocationGranted {
        allocation_id: AllocationId,
        priority: Priority,
        resources: BTreeMap<ResourceType, Quantity>,
    },
    AllocationDenied {
        priority: Priority,
        shortfall: ShortfallReport,
    },
    AllocationReleased {
        allocation_id: AllocationId,
        resources: BTreeMap<ResourceType, Quantity>,
    },
    AllocationExpired {
        allocation_id: AllocationId,
        expired_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = AllocationEvent::new(
            7,
            AllocationEventKind::ResourceRegistered {
                resource: ResourceType::compute(),
                total: Quantity::new(64),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "resource_registered");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["total"], 64);

        let back: AllocationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
