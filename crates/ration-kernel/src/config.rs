use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ration_engine::DEFAULT_EVENT_BUFFER;
use ration_negotiator::NegotiationConfig;
use ration_protocol::{QuantitySpec, ResourceType};
use serde::{Deserialize, Serialize};

/// On-disk manager configuration (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    #[serde(default)]
    pub resources: BTreeMap<ResourceType, QuantitySpec>,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default)]
    pub negotiation: NegotiationSettings,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            negotiation: NegotiationSettings::default(),
        }
    }
}

impl ManagerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manager config {path:?}"))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse manager config {path:?}"))
    }
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NegotiationSettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        let defaults = NegotiationConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            backoff_ms: u64::try_from(defaults.backoff.as_millis()).unwrap_or(u64::MAX),
            max_backoff_ms: u64::try_from(defaults.max_backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<&NegotiationSettings> for NegotiationConfig {
    fn from(settings: &NegotiationSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff: Duration::from_millis(settings.backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}
