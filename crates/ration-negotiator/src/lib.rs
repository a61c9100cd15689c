use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use ration_engine::{Allocator, Grant};
use ration_protocol::{Allocation, AllocationError, AllocationRequest, Quantity, ResourceRange};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationConfig {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Clone)]
pub struct Negotiator {
    allocator: Arc<dyn Allocator>,
    config: NegotiationConfig,
}

impl Negotiator {
    pub fn new(allocator: Arc<dyn Allocator>, config: NegotiationConfig) -> Self {
        Self { allocator, config }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    // Attempt 0 uses the request as given; the last attempt asks for the minimums.
    #[instrument(skip(self, request), fields(priority = %request.priority()))]
    pub fn negotiate(
        &self,
        request: &AllocationRequest,
        max_attempts: u32,
    ) -> Result<Allocation, AllocationError> {
        let attempts = max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let error = match self.attempt(request, attempt, attempts) {
                Ok(allocation) => return Ok(allocation),
                Err(error) => error,
            };
            attempt += 1;
            if error.shortfall().is_none() || attempt >= attempts {
                return Err(self.give_up(error, attempt));
            }
        }
    }

    #[instrument(skip(self, request), fields(priority = %request.priority()))]
    pub async fn negotiate_with_backoff(
        &self,
        request: &AllocationRequest,
    ) -> Result<Allocation, AllocationError> {
        let attempts = self.config.max_attempts.max(1);
        let give_up_at = request.time().and_then(|time| time.expires_at(Utc::now()));
        let mut attempt = 0;
        loop {
            let error = match self.attempt(request, attempt, attempts) {
                Ok(allocation) => return Ok(allocation),
                Err(error) => error,
            };
            attempt += 1;
            if error.shortfall().is_none() || attempt >= attempts {
                return Err(self.give_up(error, attempt));
            }

            let delay = self.backoff_delay(attempt - 1);
            if let Some(give_up_at) = give_up_at
                && TimeDelta::from_std(delay)
                    .ok()
                    .and_then(|delta| Utc::now().checked_add_signed(delta))
                    .is_none_or(|resume_at| resume_at >= give_up_at)
            {
                warn!(attempt, "request time bound reached, ending negotiation");
                return Err(error);
            }
            debug!(attempt, delay_ms = delay.as_millis(), "backing off before retry");
            tokio::time::sleep(delay).await;
        }
    }

    #[instrument(skip(self, request), fields(priority = %request.priority()))]
    pub fn counter_offer(&self, request: &AllocationRequest) -> Result<CounterOffer, AllocationError> {
        let offered = self.allocator.quote(request)?;
        Ok(CounterOffer {
            request: request.clone(),
            offered,
        })
    }

    pub fn accept(&self, offer: &CounterOffer) -> Result<Allocation, AllocationError> {
        offer.accept(self.allocator.as_ref())
    }

    fn attempt(
        &self,
        request: &AllocationRequest,
        attempt: u32,
        attempts: u32,
    ) -> Result<Allocation, AllocationError> {
        let candidate = relax(request, attempt, attempts);
        debug!(attempt, attempts, "negotiation attempt");
        let allocation = self.allocator.allocate(&candidate)?;
        info!(allocation_id = %allocation.allocation_id, attempt, "negotiation succeeded");
        Ok(allocation)
    }

    fn give_up(&self, error: AllocationError, attempts: u32) -> AllocationError {
        if error.shortfall().is_some() {
            warn!(attempts, error = %error, "negotiation exhausted");
        }
        error
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        self.config
            .backoff
            .saturating_mul(2_u32.saturating_pow(retry))
            .min(self.config.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterOffer {
    request: AllocationRequest,
    offered: Grant,
}

impl CounterOffer {
    pub fn request(&self) -> &AllocationRequest {
        &self.request
    }

    pub fn offered(&self) -> &Grant {
        &self.offered
    }

    pub fn is_full(&self) -> bool {
        self.request.resources().all(|(resource, range)| {
            self.offered.get(resource).copied() == Some(range.preferred())
        })
    }

    // Minimums stay as requested.
    pub fn pinned_request(&self) -> AllocationRequest {
        self.request.map_ranges(|resource, range| match self.offered.get(resource) {
            Some(offered) => range.with_preferred(*offered),
            None => *range,
        })
    }

    pub fn accept(&self, allocator: &dyn Allocator) -> Result<Allocation, AllocationError> {
        allocator.allocate(&self.pinned_request())
    }
}

fn relax(request: &AllocationRequest, attempt: u32, attempts: u32) -> AllocationRequest {
    if attempt == 0 {
        return request.clone();
    }
    request.map_ranges(|_, range| range.with_preferred(relaxed_preferred(range, attempt, attempts)))
}

// Linear from the requested preferred amount down to `min` on the last attempt.
fn relaxed_preferred(range: &ResourceRange, attempt: u32, attempts: u32) -> Quantity {
    if attempts <= 1 || attempt == 0 {
        return range.preferred();
    }
    let attempt = attempt.min(attempts - 1);
    let span = u128::from(range.preferred().get() - range.min().get());
    let step = span * u128::from(attempt) / u128::from(attempts - 1);
    let remaining = u64::try_from(span - step).unwrap_or_default();
    Quantity::new(range.min().get() + remaining)
}
