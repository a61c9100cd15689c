//! Allocation requests as agents submit them.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::ResourceType;
use crate::priority::Priority;
use crate::quantity::parse_duration;
use crate::range::ResourceRange;

/// Optional time bounds on a request.
///
/// Informational to the engine except through `Allocation::expires_at`,
/// which callers may act on with `reap_expired`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timeout",
        deserialize_with = "deserialize_timeout"
    )]
    pub timeout: Option<Duration>,
}

impl TimeConstraint {
    pub fn deadline(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline: Some(deadline),
            timeout: None,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self {
            deadline: None,
            timeout: Some(timeout),
        }
    }

    /// The earlier of the deadline and `from + timeout`.
    pub fn expires_at(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let by_timeout = self
            .timeout
            .and_then(|timeout| TimeDelta::from_std(timeout).ok())
            .and_then(|delta| from.checked_add_signed(delta));
        match (self.deadline, by_timeout) {
            (Some(deadline), Some(timeout)) => Some(deadline.min(timeout)),
            (deadline, timeout) => deadline.or(timeout),
        }
    }
}

fn serialize_timeout<S: Serializer>(
    timeout: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match timeout {
        Some(timeout) => serializer.serialize_f64(timeout.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_timeout<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TimeoutSpec {
        Seconds(f64),
        Text(String),
    }

    let spec = Option::<TimeoutSpec>::deserialize(deserializer)?;
    match spec {
        None => Ok(None),
        Some(TimeoutSpec::Seconds(seconds)) => Duration::try_from_secs_f64(seconds)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(TimeoutSpec::Text(text)) => parse_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// A bundle of per-dimension ranges plus priority and optional time bounds.
///
/// Built once and never mutated; the `with_*` methods consume and return a
/// new request. Dimensions are kept in ascending resource-type order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationRequest {
    resources: BTreeMap<ResourceType, ResourceRange>,
    #[serde(default)]
    priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<TimeConstraint>,
}

impl AllocationRequest {
    pub fn new(priority: Priority) -> Self {
        Self {
            resources: BTreeMap::new(),
            priority,
            time: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<ResourceType>, range: ResourceRange) -> Self {
        self.resources.insert(resource.into(), range);
        self
    }

    pub fn with_time(mut self, time: TimeConstraint) -> Self {
        self.time = Some(time);
        self
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn time(&self) -> Option<&TimeConstraint> {
        self.time.as_ref()
    }

    pub fn range(&self, resource: &ResourceType) -> Option<&ResourceRange> {
        self.resources.get(resource)
    }

    /// Dimensions in ascending resource-type order.
    pub fn resources(&self) -> impl Iterator<Item = (&ResourceType, &ResourceRange)> {
        self.resources.iter()
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &ResourceType> {
        self.resources.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// A copy of this request with every range replaced by `f(resource, range)`.
    pub fn map_ranges(
        &self,
        mut f: impl FnMut(&ResourceType, &ResourceRange) -> ResourceRange,
    ) -> Self {
        Self {
            resources: self
                .resources
                .iter()
                .map(|(resource, range)| (resource.clone(), f(resource, range)))
                .collect(),
            priority: self.priority,
            time: self.time.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn decodes_agent_payload() {
        let payload = json!({
            "resources": {
                "compute": {"min": 4, "preferred": 8, "max": 16},
                "memory": {"min": "8GB", "preferred": "16GB", "max": "32GB"}
            },
            "priority": "HIGH",
            "time": {"deadline": "2024-12-13T16:00:00Z", "timeout": "5m"}
        });

        let request: AllocationRequest = serde_json::from_value(payload).unwrap();
        assert_eq!(request.priority(), Priority::High);
        assert_eq!(request.len(), 2);
        assert_eq!(
            request
                .range(&ResourceType::memory())
                .map(|range| range.preferred().get()),
            Some(16 * 1024 * 1024 * 1024)
        );
        let time = request.time().unwrap();
        assert_eq!(time.timeout, Some(Duration::from_secs(300)));
        assert_eq!(
            time.deadline,
            Some(Utc.with_ymd_and_hms(2024, 12, 13, 16, 0, 0).unwrap())
        );
    }

    #[test]
    fn priority_defaults_to_medium() {
        let request: AllocationRequest =
            serde_json::from_value(json!({"resources": {"compute": {"min": 1}}})).unwrap();
        assert_eq!(request.priority(), Priority::Medium);
        assert!(request.time().is_none());
    }

    #[test]
    fn rejects_malformed_ranges_in_payload() {
        let result = serde_json::from_value::<AllocationRequest>(json!({
            "resources": {"compute": {"min": 8, "preferred": 2}}
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<AllocationRequest>(json!({
            "resources": {"memory": {"min": "plenty"}}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn misspelled_request_keys_are_rejected() {
        let result = serde_json::from_value::<AllocationRequest>(json!({
            "resources": {"compute": {"min": 1}},
            "priorty": "HIGH"
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<AllocationRequest>(json!({
            "resources": {"compute": {"min": 1}},
            "time": {"timeout": "5m", "dedline": "2024-12-13T16:00:00Z"}
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<TimeConstraint>(json!({"timeot": 30}));
        assert!(result.is_err());
    }

    #[test]
    fn dimensions_iterate_in_resource_order() {
        let request = AllocationRequest::new(Priority::Low)
            .with_resource("memory", ResourceRange::new(1, 1, 1).unwrap())
            .with_resource("bandwidth", ResourceRange::new(1, 1, 1).unwrap())
            .with_resource("compute", ResourceRange::new(1, 1, 1).unwrap());
        let order: Vec<&str> = request.resource_types().map(ResourceType::as_str).collect();
        assert_eq!(order, vec!["bandwidth", "compute", "memory"]);
    }

    #[test]
    fn expires_at_takes_the_earlier_bound() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let deadline = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 30).unwrap();

        let both = TimeConstraint {
            deadline: Some(deadline),
            timeout: Some(Duration::from_secs(60)),
        };
        assert_eq!(both.expires_at(start), Some(deadline));

        let timeout_only = TimeConstraint::timeout(Duration::from_secs(10));
        assert_eq!(
            timeout_only.expires_at(start),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 10).unwrap())
        );
        assert_eq!(TimeConstraint::default().expires_at(start), None);
    }

    #[test]
    fn timeout_serializes_as_seconds() {
        let time = TimeConstraint::timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&time).unwrap();
        assert_eq!(json, json!({"timeout": 1.5}));
        let back: TimeConstraint = serde_json::from_value(json).unwrap();
        assert_eq!(back, time);
    }
}
