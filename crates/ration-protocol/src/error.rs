//! Error types for the allocation protocol.

use serde_json::{Value, json};
use thiserror::Error;

use crate::ids::{AllocationId, ResourceType};
use crate::quantity::Quantity;
use crate::shortfall::ShortfallReport;

/// A quantity or duration string that could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty quantity")]
    Empty,
    #[error("no numeric value found in: {0}")]
    MissingMagnitude(String),
    #[error("invalid numeric value in quantity: {0}")]
    InvalidNumber(String),
    #[error("quantity must be non-negative: {0}")]
    Negative(String),
    #[error("quantity out of range: {0}")]
    Overflow(String),
    #[error("unknown quantity format: {0}, expected a number or a value like '4GB', '1024MB', '30s'")]
    UnknownFormat(String),
}

/// A resource range that could not be built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error(
        "invalid resource range: expected min <= preferred <= max, got {min} / {preferred} / {max}"
    )]
    OutOfOrder {
        min: Quantity,
        preferred: Quantity,
        max: Quantity,
    },
    #[error(transparent)]
    Quantity(#[from] ParseError),
}

/// Errors raised by the resource pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("unknown resource type: {0}")]
    UnknownResource(ResourceType),
    #[error("insufficient {resource}: requested {requested}, available {available}")]
    Insufficient {
        resource: ResourceType,
        requested: Quantity,
        available: Quantity,
    },
    /// Crediting capacity back would push `available` above `total`. This
    /// means a grant was released twice or bookkeeping diverged.
    #[error(
        "consistency violation on {resource}: releasing {released} onto {available} exceeds total {total}"
    )]
    Consistency {
        resource: ResourceType,
        released: Quantity,
        available: Quantity,
        total: Quantity,
    },
}

/// Errors returned by `allocate`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("{0}")]
    Shortfall(ShortfallReport),
    #[error("unknown resource type: {0}")]
    UnknownResource(ResourceType),
    #[error("allocation request names no resources")]
    EmptyRequest,
    #[error("reservation conflict: {0}")]
    Conflict(PoolError),
}

impl AllocationError {
    pub fn shortfall(&self) -> Option<&ShortfallReport> {
        match self {
            Self::Shortfall(report) => Some(report),
            _ => None,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Shortfall(_) => "RESOURCE_SHORTFALL",
            Self::UnknownResource(_) => "UNKNOWN_RESOURCE",
            Self::EmptyRequest => "EMPTY_REQUEST",
            Self::Conflict(_) => "RESERVATION_CONFLICT",
        }
    }

    /// Structured error payload in the shape agents receive over the broker:
    /// `{"errorType", "message", "details": {"shortfall": {...}}}`.
    pub fn to_payload(&self) -> Value {
        let details = match self {
            Self::Shortfall(report) => json!({ "shortfall": report }),
            Self::UnknownResource(resource) => json!({ "resource": resource }),
            Self::EmptyRequest => json!({}),
            Self::Conflict(error) => json!({ "cause": error.to_string() }),
        };
        json!({
            "errorType": self.error_type(),
            "message": self.to_string(),
            "details": details,
        })
    }
}

/// Errors returned by `release`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReleaseError {
    #[error("unknown allocation: {0}")]
    UnknownAllocation(AllocationId),
    #[error(transparent)]
    Pool(#[from] PoolError),
}
