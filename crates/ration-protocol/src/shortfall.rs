//! Per-dimension detail of why an allocation could not be granted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ResourceType;
use crate::quantity::Quantity;

/// The minimum a dimension asked for and what the pool had at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub requested: Quantity,
    pub available: Quantity,
}

impl Shortfall {
    pub fn deficit(&self) -> Quantity {
        self.requested.saturating_sub(self.available)
    }
}

/// Every dimension of a request that could not meet its minimum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortfallReport(BTreeMap<ResourceType, Shortfall>);

impl ShortfallReport {
    pub fn insert(&mut self, resource: ResourceType, shortfall: Shortfall) {
        self.0.insert(resource, shortfall);
    }

    pub fn get(&self, resource: &ResourceType) -> Option<&Shortfall> {
        self.0.get(resource)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceType, &Shortfall)> {
        self.0.iter()
    }
}

impl fmt::Display for ShortfallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insufficient resources:")?;
        for (index, (resource, shortfall)) in self.0.iter().enumerate() {
            let separator = if index == 0 { " " } else { ", " };
            write!(
                f,
                "{separator}{resource} (requested {}, available {})",
                shortfall.requested, shortfall.available
            )?;
        }
        Ok(())
    }
}

impl FromIterator<(ResourceType, Shortfall)> for ShortfallReport {
    fn from_iter<I: IntoIterator<Item = (ResourceType, Shortfall)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
