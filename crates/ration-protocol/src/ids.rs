//! Identifier types for allocations and resource dimensions.
//!
//! Both are opaque String wrappers (serde-transparent). Allocation ids are
//! minted as UUID v4 by the engine; resource types are caller-chosen names.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_key!(
    /// Unique identifier for a granted allocation.
    AllocationId
);
string_key!(
    /// Name of a resource dimension (e.g. `compute`, `memory`).
    ///
    /// Ordering is lexicographic; the pool locks dimensions in this order.
    ResourceType
);

impl AllocationId {
    /// Create a new ID using UUID v4 (random).
    pub fn new_uuid() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AllocationId {
    fn default() -> Self {
        Self::new_uuid()
    }
}

impl ResourceType {
    pub fn compute() -> Self {
        Self("compute".to_owned())
    }

    pub fn memory() -> Self {
        Self("memory".to_owned())
    }

    pub fn gpu_memory() -> Self {
        Self("gpu_memory".to_owned())
    }

    pub fn storage() -> Self {
        Self("storage".to_owned())
    }

    pub fn bandwidth() -> Self {
        Self("bandwidth".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_id_new_is_unique() {
        let a = AllocationId::new_uuid();
        let b = AllocationId::new_uuid();
        assert_ne!(a, b);
    }

    #[test]
    fn resource_type_orders_lexicographically() {
        let mut types = vec![
            ResourceType::memory(),
            ResourceType::bandwidth(),
            ResourceType::compute(),
        ];
        types.sort();
        let names: Vec<&str> = types.iter().map(ResourceType::as_str).collect();
        assert_eq!(names, vec!["bandwidth", "compute", "memory"]);
    }

    #[test]
    fn resource_type_serializes_transparently() {
        let resource = ResourceType::gpu_memory();
        let json = serde_json::to_string(&resource).unwrap();
        assert_eq!(json, "\"gpu_memory\"");
        let back: ResourceType = serde_json::from_str(&json).unwrap();
        assert_eq!(resource, back);
    }
}
