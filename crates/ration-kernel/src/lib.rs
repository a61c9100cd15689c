mod config;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ration_engine::{AllocationEngine, DEFAULT_EVENT_BUFFER, Grant};
use ration_negotiator::{CounterOffer, NegotiationConfig, Negotiator};
use ration_pool::{Capacity, ResourcePool};
use ration_protocol::{
    Allocation, AllocationError, AllocationEvent, AllocationId, AllocationRequest, Quantity,
    QuantitySpec, ReleaseError, ResourceType,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, instrument};

pub use config::{ManagerConfig, NegotiationSettings};

#[derive(Debug, Clone)]
pub struct ResourceManagerBuilder {
    resources: Vec<(ResourceType, QuantitySpec)>,
    event_buffer: usize,
    negotiation: NegotiationConfig,
}

impl Default for ResourceManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManagerBuilder {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            negotiation: NegotiationConfig::default(),
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            resources: config
                .resources
                .iter()
                .map(|(resource, total)| (resource.clone(), total.clone()))
                .collect(),
            event_buffer: config.event_buffer,
            negotiation: NegotiationConfig::from(&config.negotiation),
        }
    }

    pub fn resource(mut self, resource: impl Into<ResourceType>, total: impl Into<QuantitySpec>) -> Self {
        self.resources.push((resource.into(), total.into()));
        self
    }

    pub fn event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    pub fn negotiation(mut self, negotiation: NegotiationConfig) -> Self {
        self.negotiation = negotiation;
        self
    }

    pub fn build(self) -> Result<ResourceManager> {
        let engine = Arc::new(AllocationEngine::new(
            Arc::new(ResourcePool::new()),
            self.event_buffer,
        ));
        let negotiator = Negotiator::new(engine.clone(), self.negotiation);
        let manager = ResourceManager { engine, negotiator };
        for (resource, total) in self.resources {
            manager.register_resource(resource, total)?;
        }
        Ok(manager)
    }
}

#[derive(Clone)]
pub struct ResourceManager {
    engine: Arc<AllocationEngine>,
    negotiator: Negotiator,
}

impl ResourceManager {
    pub fn builder() -> ResourceManagerBuilder {
        ResourceManagerBuilder::new()
    }

    pub fn engine(&self) -> &Arc<AllocationEngine> {
        &self.engine
    }

    #[instrument(skip_all)]
    pub fn register_resource(
        &self,
        resource: impl Into<ResourceType>,
        total: impl Into<QuantitySpec>,
    ) -> Result<Option<Capacity>> {
        let resource = resource.into();
        let total = total
            .into()
            .resolve()
            .with_context(|| format!("invalid capacity for resource {resource}"))?;
        let previous = self.engine.register(resource.clone(), total);
        if let Some(previous) = previous {
            info!(resource = %resource, old_total = %previous.total, new_total = %total, "resource capacity replaced");
        }
        Ok(previous)
    }

    pub fn allocate(&self, request: &AllocationRequest) -> Result<Allocation, AllocationError> {
        self.engine.allocate(request)
    }

    pub fn release(&self, allocation: &Allocation) -> Result<(), ReleaseError> {
        self.engine.release(allocation)
    }

    pub fn quote(&self, request: &AllocationRequest) -> Result<Grant, AllocationError> {
        self.engine.quote(request)
    }

    pub fn negotiate(
        &self,
        request: &AllocationRequest,
        max_attempts: u32,
    ) -> Result<Allocation, AllocationError> {
        self.negotiator.negotiate(request, max_attempts)
    }

    pub async fn negotiate_with_backoff(
        &self,
        request: &AllocationRequest,
    ) -> Result<Allocation, AllocationError> {
        self.negotiator.negotiate_with_backoff(request).await
    }

    pub fn counter_offer(&self, request: &AllocationRequest) -> Result<CounterOffer, AllocationError> {
        self.negotiator.counter_offer(request)
    }

    pub fn accept_offer(&self, offer: &CounterOffer) -> Result<Allocation, AllocationError> {
        self.negotiator.accept(offer)
    }

    pub fn reap_expired(&self, now: DateTime<Utc>) -> Vec<Allocation> {
        self.engine.reap_expired(now)
    }

    pub fn available_resources(&self) -> BTreeMap<ResourceType, Quantity> {
        self.engine.available_resources()
    }

    pub fn capacity(&self) -> BTreeMap<ResourceType, Capacity> {
        self.engine.capacity()
    }

    pub fn active_allocations(&self) -> Vec<Allocation> {
        self.engine.active_allocations()
    }

    pub fn allocation(&self, allocation_id: &AllocationId) -> Option<Allocation> {
        self.engine.allocation(allocation_id)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AllocationEvent> {
        self.engine.subscribe_events()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<AllocationEvent> {
        self.engine.subscribe_stream()
    }
}
