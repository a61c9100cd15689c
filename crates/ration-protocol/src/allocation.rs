//! Granted allocations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AllocationId, ResourceType};
use crate::priority::Priority;
use crate::quantity::Quantity;

/// The result of a successful grant.
///
/// The caller holds this as a handle and passes it back to release the
/// capacity. An allocation that is never released keeps its capacity out of
/// the pool for the pool's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: AllocationId,
    pub resources: BTreeMap<ResourceType, Quantity>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Allocation {
    pub fn granted(&self, resource: &ResourceType) -> Option<Quantity> {
        self.resources.get(resource).copied()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}
