use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use ration_protocol::{PoolError, Quantity, ResourceType};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Total and currently available amount of one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub total: Quantity,
    pub available: Quantity,
}

impl Capacity {
    pub fn new(total: Quantity) -> Self {
        Self {
            total,
            available: total,
        }
    }

    pub fn in_use(&self) -> Quantity {
        self.total.saturating_sub(self.available)
    }

    fn reserve(&mut self, resource: &ResourceType, quantity: Quantity) -> Result<(), PoolError> {
        match self.available.checked_sub(quantity) {
            Some(remaining) => {
                self.available = remaining;
                Ok(())
            }
            None => Err(PoolError::Insufficient {
                resource: resource.clone(),
                requested: quantity,
                available: self.available,
            }),
        }
    }

    fn credit(&mut self, resource: &ResourceType, quantity: Quantity) -> Result<(), PoolError> {
        match self.available.checked_add(quantity) {
            Some(restored) if restored <= self.total => {
                self.available = restored;
                Ok(())
            }
            _ => {
                error!(
                    resource = %resource,
                    released = %quantity,
                    available = %self.available,
                    total = %self.total,
                    "release would exceed pool total"
                );
                Err(PoolError::Consistency {
                    resource: resource.clone(),
                    released: quantity,
                    available: self.available,
                    total: self.total,
                })
            }
        }
    }
}

type Slot = Arc<Mutex<Capacity>>;

/// Named resource types and their capacity.
///
/// Each type sits behind its own lock. Multi-type operations go through
/// [`ResourcePool::transaction`], which locks types in ascending order.
#[derive(Debug, Default)]
pub struct ResourcePool {
    slots: RwLock<BTreeMap<ResourceType, Slot>>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `total` capacity for a resource type, with all of it available.
    ///
    /// Registering an existing type overwrites its total and resets available
    /// to the new total. Callers must not do this while allocations of that
    /// type are outstanding; later releases of those allocations would be
    /// rejected as consistency violations. Returns the previous capacity.
    pub fn register(&self, resource: impl Into<ResourceType>, total: Quantity) -> Option<Capacity> {
        let resource = resource.into();
        let mut slots = self.slots.write();
        let previous = match slots.entry(resource.clone()) {
            Entry::Occupied(entry) => {
                let mut capacity = entry.get().lock();
                let previous = *capacity;
                *capacity = Capacity::new(total);
                Some(previous)
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(Capacity::new(total))));
                None
            }
        };
        info!(resource = %resource, total = %total, replaced = previous.is_some(), "resource registered");
        previous
    }

    pub fn contains(&self, resource: &ResourceType) -> bool {
        self.slots.read().contains_key(resource)
    }

    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.slots.read().keys().cloned().collect()
    }

    pub fn capacity(&self, resource: &ResourceType) -> Option<Capacity> {
        self.slot(resource).map(|slot| *slot.lock())
    }

    pub fn available(&self, resource: &ResourceType) -> Option<Quantity> {
        self.capacity(resource).map(|capacity| capacity.available)
    }

    /// Copy of the available amount per type.
    pub fn available_snapshot(&self) -> BTreeMap<ResourceType, Quantity> {
        self.capacity_snapshot()
            .into_iter()
            .map(|(resource, capacity)| (resource, capacity.available))
            .collect()
    }

    /// Copy of total and available per type.
    ///
    /// Each type is read under its own lock, so the snapshot is consistent per
    /// type but not across types while allocations are in flight.
    pub fn capacity_snapshot(&self) -> BTreeMap<ResourceType, Capacity> {
        self.slots
            .read()
            .iter()
            .map(|(resource, slot)| (resource.clone(), *slot.lock()))
            .collect()
    }

    /// Take `quantity` from a type if that much is available. Fails without
    /// side effects otherwise.
    pub fn try_reserve(&self, resource: &ResourceType, quantity: Quantity) -> Result<(), PoolError> {
        let slot = self
            .slot(resource)
            .ok_or_else(|| PoolError::UnknownResource(resource.clone()))?;
        let mut capacity = slot.lock();
        capacity.reserve(resource, quantity)?;
        debug!(resource = %resource, reserved = %quantity, available = %capacity.available, "capacity reserved");
        Ok(())
    }

    /// Return `quantity` to a type. Fails without side effects if that would
    /// push available above total.
    pub fn release(&self, resource: &ResourceType, quantity: Quantity) -> Result<(), PoolError> {
        let slot = self
            .slot(resource)
            .ok_or_else(|| PoolError::UnknownResource(resource.clone()))?;
        let mut capacity = slot.lock();
        capacity.credit(resource, quantity)?;
        debug!(resource = %resource, released = %quantity, available = %capacity.available, "capacity released");
        Ok(())
    }

    /// Lock every listed type in ascending order and run `f` with exclusive
    /// access to them. No other caller can reserve or release those types
    /// until `f` returns.
    pub fn transaction<'r, R>(
        &self,
        resources: impl IntoIterator<Item = &'r ResourceType>,
        f: impl FnOnce(&mut PoolTransaction<'_>) -> R,
    ) -> Result<R, PoolError> {
        let ordered: BTreeSet<&ResourceType> = resources.into_iter().collect();
        let handles = {
            let slots = self.slots.read();
            ordered
                .into_iter()
                .map(|resource| {
                    slots
                        .get(resource)
                        .map(|slot| (resource.clone(), Arc::clone(slot)))
                        .ok_or_else(|| PoolError::UnknownResource(resource.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut transaction = PoolTransaction {
            guards: BTreeMap::new(),
        };
        for (resource, slot) in &handles {
            transaction.guards.insert(resource.clone(), slot.lock());
        }
        Ok(f(&mut transaction))
    }

    fn slot(&self, resource: &ResourceType) -> Option<Slot> {
        self.slots.read().get(resource).cloned()
    }
}

/// Exclusive access to a set of resource types for the duration of
/// [`ResourcePool::transaction`].
pub struct PoolTransaction<'a> {
    guards: BTreeMap<ResourceType, MutexGuard<'a, Capacity>>,
}

impl PoolTransaction<'_> {
    pub fn capacity(&self, resource: &ResourceType) -> Result<Capacity, PoolError> {
        self.guards
            .get(resource)
            .map(|guard| **guard)
            .ok_or_else(|| PoolError::UnknownResource(resource.clone()))
    }

    pub fn available(&self, resource: &ResourceType) -> Result<Quantity, PoolError> {
        self.capacity(resource).map(|capacity| capacity.available)
    }

    pub fn try_reserve(&mut self, resource: &ResourceType, quantity: Quantity) -> Result<(), PoolError> {
        self.guard(resource)?.reserve(resource, quantity)
    }

    pub fn release(&mut self, resource: &ResourceType, quantity: Quantity) -> Result<(), PoolError> {
        self.guard(resource)?.credit(resource, quantity)
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceType> {
        self.guards.keys()
    }

    fn guard(&mut self, resource: &ResourceType) -> Result<&mut Capacity, PoolError> {
        self.guards
            .get_mut(resource)
            .map(|guard| &mut **guard)
            .ok_or_else(|| PoolError::UnknownResource(resource.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    fn cpu() -> ResourceType {
        ResourceType::from("cpu")
    }

    fn pool_with(resources: &[(&str, u64)]) -> ResourcePool {
        let pool = ResourcePool::new();
        for (name, total) in resources {
            pool.register(*name, Quantity::new(*total));
        }
        pool
    }

    #[test]
    fn register_sets_available_to_total() {
        let pool = pool_with(&[("cpu", 16)]);
        assert_eq!(pool.capacity(&cpu()), Some(Capacity::new(Quantity::new(16))));
        assert_eq!(pool.available(&ResourceType::memory()), None);
    }

    #[test]
    fn re_register_overwrites_and_resets() {
        let pool = pool_with(&[("cpu", 16)]);
        pool.try_reserve(&cpu(), Quantity::new(10)).unwrap();

        let previous = pool.register("cpu", Quantity::new(32));
        assert_eq!(
            previous,
            Some(Capacity {
                total: Quantity::new(16),
                available: Quantity::new(6),
            })
        );
        assert_eq!(pool.available(&cpu()), Some(Quantity::new(32)));
    }

    #[test]
    fn try_reserve_is_all_or_nothing_per_type() {
        let pool = pool_with(&[("cpu", 4)]);
        pool.try_reserve(&cpu(), Quantity::new(3)).unwrap();

        let error = pool.try_reserve(&cpu(), Quantity::new(2)).unwrap_err();
        assert_eq!(
            error,
            PoolError::Insufficient {
                resource: cpu(),
                requested: Quantity::new(2),
                available: Quantity::new(1),
            }
        );
        assert_eq!(pool.available(&cpu()), Some(Quantity::new(1)));
    }

    #[test]
    fn unknown_types_are_rejected() {
        let pool = ResourcePool::new();
        assert_eq!(
            pool.try_reserve(&cpu(), Quantity::new(1)),
            Err(PoolError::UnknownResource(cpu()))
        );
        assert_eq!(
            pool.release(&cpu(), Quantity::new(1)),
            Err(PoolError::UnknownResource(cpu()))
        );
    }

    #[test]
    fn release_past_total_is_a_consistency_error() {
        let pool = pool_with(&[("cpu", 8)]);
        pool.try_reserve(&cpu(), Quantity::new(3)).unwrap();
        pool.release(&cpu(), Quantity::new(3)).unwrap();

        let error = pool.release(&cpu(), Quantity::new(3)).unwrap_err();
        assert!(matches!(error, PoolError::Consistency { .. }));
        assert_eq!(pool.available(&cpu()), Some(Quantity::new(8)));
    }

    #[test]
    fn snapshots_cover_every_type() {
        let pool = pool_with(&[("cpu", 8), ("memory", 1024)]);
        pool.try_reserve(&ResourceType::memory(), Quantity::new(24)).unwrap();

        let available = pool.available_snapshot();
        assert_eq!(available.get(&cpu()), Some(&Quantity::new(8)));
        assert_eq!(available.get(&ResourceType::memory()), Some(&Quantity::new(1000)));

        let capacity = pool.capacity_snapshot();
        assert_eq!(capacity[&ResourceType::memory()].in_use(), Quantity::new(24));
        assert_eq!(pool.resource_types(), vec![cpu(), ResourceType::memory()]);
    }

    #[test]
    fn transaction_locks_listed_types_only() {
        let pool = pool_with(&[("cpu", 8), ("memory", 64)]);
        let memory = ResourceType::memory();

        let reserved = pool
            .transaction([&cpu(), &memory], |txn| {
                let names: Vec<&str> = txn.resources().map(ResourceType::as_str).collect();
                assert_eq!(names, vec!["cpu", "memory"]);
                txn.try_reserve(&cpu(), Quantity::new(2))?;
                txn.try_reserve(&memory, Quantity::new(32))?;
                txn.available(&memory)
            })
            .unwrap()
            .unwrap();
        assert_eq!(reserved, Quantity::new(32));
        assert_eq!(pool.available(&cpu()), Some(Quantity::new(6)));

        let missing = pool.transaction([&ResourceType::gpu_memory()], |_| ());
        assert_eq!(
            missing,
            Err(PoolError::UnknownResource(ResourceType::gpu_memory()))
        );
    }

    #[test]
    fn transaction_guards_reject_unlisted_types() {
        let pool = pool_with(&[("cpu", 8), ("memory", 64)]);
        let outcome = pool
            .transaction([&cpu()], |txn| txn.try_reserve(&ResourceType::memory(), Quantity::new(1)))
            .unwrap();
        assert_eq!(
            outcome,
            Err(PoolError::UnknownResource(ResourceType::memory()))
        );
        assert_eq!(pool.available(&ResourceType::memory()), Some(Quantity::new(64)));
    }

    #[test]
    fn concurrent_reservations_never_oversubscribe() {
        let pool = pool_with(&[("cpu", 100)]);
        let granted = std::sync::atomic::AtomicU64::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if pool.try_reserve(&cpu(), Quantity::new(1)).is_ok() {
                            granted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(granted.into_inner(), 100);
        assert_eq!(pool.available(&cpu()), Some(Quantity::ZERO));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u64),
        Release(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..40).prop_map(Op::Reserve),
            (0u64..40).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn available_stays_within_bounds(total in 0u64..100, ops in prop::collection::vec(op(), 0..64)) {
            let pool = pool_with(&[("cpu", total)]);
            for op in ops {
                let before = pool.available(&cpu()).unwrap();
                let result = match op {
                    Op::Reserve(amount) => pool.try_reserve(&cpu(), Quantity::new(amount)),
                    Op::Release(amount) => pool.release(&cpu(), Quantity::new(amount)),
                };
                let after = pool.available(&cpu()).unwrap();
                prop_assert!(after.get() <= total);
                if result.is_err() {
                    prop_assert_eq!(before, after);
                }
            }
        }
    }
}
