mod events;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ration_pool::{Capacity, PoolTransaction, ResourcePool};
use ration_protocol::{
    Allocation, AllocationError, AllocationEvent, AllocationEventKind, AllocationId,
    AllocationRequest, PoolError, Quantity, ReleaseError, ResourceType, Shortfall,
    ShortfallReport,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, instrument, warn};

pub use events::{AllocationEventHub, DEFAULT_EVENT_BUFFER};

pub type Grant = BTreeMap<ResourceType, Quantity>;

pub trait Allocator: Send + Sync {
    fn allocate(&self, request: &AllocationRequest) -> Result<Allocation, AllocationError>;
    fn release(&self, allocation: &Allocation) -> Result<(), ReleaseError>;
    fn quote(&self, request: &AllocationRequest) -> Result<Grant, AllocationError>;
}

#[derive(Debug)]
pub struct AllocationEngine {
    pool: Arc<ResourcePool>,
    allocations: Mutex<HashMap<AllocationId, Allocation>>,
    events: AllocationEventHub,
}

impl AllocationEngine {
    pub fn new(pool: Arc<ResourcePool>, event_buffer: usize) -> Self {
        Self {
            pool,
            allocations: Mutex::new(HashMap::new()),
            events: AllocationEventHub::new(event_buffer),
        }
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    pub fn register(&self, resource: impl Into<ResourceType>, total: Quantity) -> Option<Capacity> {
        let resource = resource.into();
        let previous = self.pool.register(resource.clone(), total);
        self.events
            .publish(AllocationEventKind::ResourceRegistered { resource, total });
        previous
    }

    #[instrument(
        skip(self, request),
        fields(priority = %request.priority(), dimensions = request.len())
    )]
    pub fn allocate(&self, request: &AllocationRequest) -> Result<Allocation, AllocationError> {
        self.validate(request)?;

        let outcome = self
            .pool
            .transaction(request.resource_types(), |txn| -> Result<Grant, AllocationError> {
                let grant = plan(request, txn)?;
                commit(txn, &grant)?;
                Ok(grant)
            })
            .map_err(pool_error)?;

        let resources = match outcome {
            Ok(grant) => grant,
            Err(error) => {
                if let AllocationError::Shortfall(report) = &error {
                    warn!(shortfall = %report, "allocation denied");
                    self.events.publish(AllocationEventKind::AllocationDenied {
                        priority: request.priority(),
                        shortfall: report.clone(),
                    });
                }
                return Err(error);
            }
        };

        let created_at = Utc::now();
        let allocation = Allocation {
            allocation_id: AllocationId::new_uuid(),
            resources,
            priority: request.priority(),
            created_at,
            expires_at: request.time().and_then(|time| time.expires_at(created_at)),
        };
        self.allocations
            .lock()
            .insert(allocation.allocation_id.clone(), allocation.clone());

        info!(allocation_id = %allocation.allocation_id, "allocation granted");
        self.events.publish(AllocationEventKind::AllocationGranted {
            allocation_id: allocation.allocation_id.clone(),
            priority: allocation.priority,
            resources: allocation.resources.clone(),
        });
        Ok(allocation)
    }

    // Credits the grant recorded at allocation time, not the caller's copy.
    #[instrument(skip(self, allocation), fields(allocation_id = %allocation.allocation_id))]
    pub fn release(&self, allocation: &Allocation) -> Result<(), ReleaseError> {
        let released = self.release_recorded(&allocation.allocation_id)?;
        info!("allocation released");
        self.events.publish(AllocationEventKind::AllocationReleased {
            allocation_id: released.allocation_id,
            resources: released.resources,
        });
        Ok(())
    }

    #[instrument(skip(self, request), fields(priority = %request.priority()))]
    pub fn quote(&self, request: &AllocationRequest) -> Result<Grant, AllocationError> {
        self.validate(request)?;
        self.pool
            .transaction(request.resource_types(), |txn| plan(request, txn))
            .map_err(pool_error)?
    }

    #[instrument(skip(self))]
    pub fn reap_expired(&self, now: DateTime<Utc>) -> Vec<Allocation> {
        let expired: Vec<AllocationId> = self
            .allocations
            .lock()
            .values()
            .filter(|allocation| allocation.is_expired(now))
            .map(|allocation| allocation.allocation_id.clone())
            .collect();

        let mut reaped = Vec::with_capacity(expired.len());
        for allocation_id in expired {
            match self.release_recorded(&allocation_id) {
                Ok(allocation) => {
                    info!(allocation_id = %allocation_id, "expired allocation reaped");
                    self.events.publish(AllocationEventKind::AllocationExpired {
                        allocation_id,
                        expired_at: allocation.expires_at.unwrap_or(now),
                    });
                    reaped.push(allocation);
                }
                Err(ReleaseError::UnknownAllocation(_)) => {
                    debug!(allocation_id = %allocation_id, "allocation released before reaping");
                }
                Err(error) => {
                    warn!(allocation_id = %allocation_id, error = %error, "failed to reap allocation");
                }
            }
        }
        reaped
    }

    pub fn active_allocations(&self) -> Vec<Allocation> {
        let mut active: Vec<Allocation> = self.allocations.lock().values().cloned().collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.allocation_id.cmp(&b.allocation_id))
        });
        active
    }

    pub fn allocation(&self, allocation_id: &AllocationId) -> Option<Allocation> {
        self.allocations.lock().get(allocation_id).cloned()
    }

    pub fn available_resources(&self) -> BTreeMap<ResourceType, Quantity> {
        self.pool.available_snapshot()
    }

    pub fn capacity(&self) -> BTreeMap<ResourceType, Capacity> {
        self.pool.capacity_snapshot()
    }

    pub fn events(&self) -> &AllocationEventHub {
        &self.events
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AllocationEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<AllocationEvent> {
        self.events.subscribe_stream()
    }

    fn validate(&self, request: &AllocationRequest) -> Result<(), AllocationError> {
        if request.is_empty() {
            return Err(AllocationError::EmptyRequest);
        }
        match request
            .resource_types()
            .find(|resource| !self.pool.contains(resource))
        {
            Some(unknown) => Err(AllocationError::UnknownResource(unknown.clone())),
            None => Ok(()),
        }
    }

    // On a pool failure the table entry is restored and the pool is untouched.
    fn release_recorded(&self, allocation_id: &AllocationId) -> Result<Allocation, ReleaseError> {
        let recorded = self
            .allocations
            .lock()
            .remove(allocation_id)
            .ok_or_else(|| ReleaseError::UnknownAllocation(allocation_id.clone()))?;

        let credited = self
            .pool
            .transaction(recorded.resources.keys(), |txn| credit(txn, &recorded.resources))
            .and_then(|outcome| outcome);

        match credited {
            Ok(()) => Ok(recorded),
            Err(error) => {
                error!(allocation_id = %allocation_id, error = %error, "release aborted");
                self.allocations
                    .lock()
                    .insert(recorded.allocation_id.clone(), recorded);
                Err(ReleaseError::Pool(error))
            }
        }
    }
}

impl Allocator for AllocationEngine {
    fn allocate(&self, request: &AllocationRequest) -> Result<Allocation, AllocationError> {
        AllocationEngine::allocate(self, request)
    }

    fn release(&self, allocation: &Allocation) -> Result<(), ReleaseError> {
        AllocationEngine::release(self, allocation)
    }

    fn quote(&self, request: &AllocationRequest) -> Result<Grant, AllocationError> {
        AllocationEngine::quote(self, request)
    }
}

fn pool_error(error: PoolError) -> AllocationError {
    match error {
        PoolError::UnknownResource(resource) => AllocationError::UnknownResource(resource),
        other => AllocationError::Conflict(other),
    }
}

fn plan(request: &AllocationRequest, txn: &PoolTransaction<'_>) -> Result<Grant, AllocationError> {
    let mut grant = Grant::new();
    let mut shortfall = ShortfallReport::default();

    for (resource, range) in request.resources() {
        let available = txn.available(resource).map_err(pool_error)?;
        let amount = range.preferred().min(available);
        debug!(
            resource = %resource,
            min = %range.min(),
            preferred = %range.preferred(),
            available = %available,
            grant = %amount,
            "dimension evaluated"
        );
        if amount < range.min() {
            shortfall.insert(
                resource.clone(),
                Shortfall {
                    requested: range.min(),
                    available,
                },
            );
        } else {
            grant.insert(resource.clone(), amount);
        }
    }

    if shortfall.is_empty() {
        Ok(grant)
    } else {
        Err(AllocationError::Shortfall(shortfall))
    }
}

// Reserve in order, undoing earlier reservations if a later one fails.
fn commit(txn: &mut PoolTransaction<'_>, grant: &Grant) -> Result<(), AllocationError> {
    let mut reserved: Vec<(&ResourceType, Quantity)> = Vec::with_capacity(grant.len());
    for (resource, amount) in grant {
        if let Err(cause) = txn.try_reserve(resource, *amount) {
            warn!(resource = %resource, error = %cause, "reservation failed, rolling back");
            for (done, amount) in reserved.into_iter().rev() {
                if let Err(rollback) = txn.release(done, amount) {
                    error!(resource = %done, error = %rollback, "rollback failed");
                }
            }
            return Err(AllocationError::Conflict(cause));
        }
        reserved.push((resource, *amount));
    }
    Ok(())
}

fn credit(txn: &mut PoolTransaction<'_>, resources: &Grant) -> Result<(), PoolError> {
    let mut credited: Vec<(&ResourceType, Quantity)> = Vec::with_capacity(resources.len());
    for (resource, amount) in resources {
        if let Err(cause) = txn.release(resource, *amount) {
            for (done, amount) in credited.into_iter().rev() {
                if let Err(rollback) = txn.try_reserve(done, amount) {
                    error!(resource = %done, error = %rollback, "rollback failed");
                }
            }
            return Err(cause);
        }
        credited.push((resource, *amount));
    }
    Ok(())
}
