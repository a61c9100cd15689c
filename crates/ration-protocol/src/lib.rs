//! # ration-protocol: allocation contract types
//!
//! Shared types used by every ration crate: the quantity parser, resource
//! ranges and requests, granted allocations, shortfall reports, lifecycle
//! events, and the error taxonomy.
//!
//! Carries no runtime dependencies such as tokio or parking_lot, so a
//! transport that decodes allocation requests off the wire can depend on it
//! alone.
//!
//! ## Module Overview
//!
//! - [`ids`]: `AllocationId` and `ResourceType` keys
//! - [`quantity`]: `Quantity`, `QuantitySpec`, size and duration parsers
//! - [`range`]: `ResourceRange` (min / preferred / max)
//! - [`priority`]: `Priority` tiers with a total order
//! - [`request`]: `AllocationRequest`, `TimeConstraint`
//! - [`allocation`]: `Allocation` handles
//! - [`shortfall`]: `ShortfallReport`
//! - [`event`]: `AllocationEvent`
//! - [`error`]: `ParseError`, `RangeError`, `PoolError`, `AllocationError`, `ReleaseError`

pub mod allocation;
pub mod error;
pub mod event;
pub mod ids;
pub mod priority;
pub mod quantity;
pub mod range;
pub mod request;
pub mod shortfall;

// Re-export the most commonly used types at the crate root.
pub use allocation::Allocation;
pub use error::{AllocationError, ParseError, PoolError, RangeError, ReleaseError};
pub use event::{AllocationEvent, AllocationEventKind};
pub use ids::{AllocationId, ResourceType};
pub use priority::Priority;
pub use quantity::{Quantity, QuantitySpec, parse_duration, parse_size};
pub use range::ResourceRange;
pub use request::{AllocationRequest, TimeConstraint};
pub use shortfall::{Shortfall, ShortfallReport};
