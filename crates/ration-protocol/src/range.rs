//! Acceptable amounts for one resource dimension.

use serde::{Deserialize, Serialize};

use crate::error::RangeError;
use crate::quantity::{Quantity, QuantitySpec};

/// `{min, preferred, max}` for one resource dimension.
///
/// Always satisfies `min <= preferred <= max`. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct ResourceRange {
    min: Quantity,
    preferred: Quantity,
    max: Quantity,
}

impl ResourceRange {
    /// Build a range from canonical amounts.
    pub fn new(min: u64, preferred: u64, max: u64) -> Result<Self, RangeError> {
        Self::from_quantities(Quantity::new(min), Quantity::new(preferred), Quantity::new(max))
    }

    pub fn from_quantities(
        min: Quantity,
        preferred: Quantity,
        max: Quantity,
    ) -> Result<Self, RangeError> {
        if min > preferred || preferred > max {
            return Err(RangeError::OutOfOrder {
                min,
                preferred,
                max,
            });
        }
        Ok(Self {
            min,
            preferred,
            max,
        })
    }

    /// Build a range from caller-supplied values such as `("8GB", "16GB", "32GB")`.
    pub fn parse(
        min: impl Into<QuantitySpec>,
        preferred: impl Into<QuantitySpec>,
        max: impl Into<QuantitySpec>,
    ) -> Result<Self, RangeError> {
        Self::from_quantities(
            min.into().resolve()?,
            preferred.into().resolve()?,
            max.into().resolve()?,
        )
    }

    /// A range that accepts exactly one amount.
    pub fn exact(amount: Quantity) -> Self {
        Self {
            min: amount,
            preferred: amount,
            max: amount,
        }
    }

    pub fn min(&self) -> Quantity {
        self.min
    }

    pub fn preferred(&self) -> Quantity {
        self.preferred
    }

    pub fn max(&self) -> Quantity {
        self.max
    }

    pub fn contains(&self, amount: Quantity) -> bool {
        self.min <= amount && amount <= self.max
    }

    /// The same bounds with a different preferred amount, clamped into
    /// `[min, max]`.
    pub fn with_preferred(&self, preferred: Quantity) -> Self {
        Self {
            min: self.min,
            preferred: preferred.clamp(self.min, self.max),
            max: self.max,
        }
    }
}

/// Wire shape of a range. `preferred` falls back to `min` and `max` to
/// `preferred` when omitted.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRange {
    min: Quantity,
    #[serde(default)]
    preferred: Option<Quantity>,
    #[serde(default)]
    max: Option<Quantity>,
}

impl TryFrom<RawRange> for ResourceRange {
    type Error = RangeError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        let preferred = raw.preferred.unwrap_or(raw.min);
        let max = raw.max.unwrap_or(preferred);
        Self::from_quantities(raw.min, preferred, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misspelled_bound_keys_are_rejected() {
        let result = serde_json::from_str::<ResourceRange>(r#"{"min": 2, "prefered": 8, "max": 16}"#);
        assert!(result.is_err());

        let range: ResourceRange = serde_json::from_str(r#"{"min": 2, "max": 16}"#).unwrap();
        assert_eq!(range.preferred().get(), 2);
    }

    #[test]
    fn rejects_out_of_order_bounds() {
        assert!(ResourceRange::new(2, 4, 8).is_ok());
        assert!(ResourceRange::new(4, 4, 4).is_ok());
        let error = ResourceRange::new(5, 4, 8).unwrap_err();
        assert!(matches!(error, RangeError::OutOfOrder { min, .. } if min == Quantity::new(5)));
        assert!(ResourceRange::new(2, 9, 8).is_err());
    }

    #[test]
    fn with_preferred_clamps_into_bounds() {
        let range = ResourceRange::new(2, 4, 8).unwrap();
        assert_eq!(range.with_preferred(Quantity::new(1)).preferred().get(), 2);
        assert_eq!(range.with_preferred(Quantity::new(6)).preferred().get(), 6);
        assert_eq!(range.with_preferred(Quantity::new(20)).preferred().get(), 8);
    }

    #[test]
    fn parse_accepts_quantity_strings() {
        let range = ResourceRange::parse("1KB", "2KB", 4096).unwrap();
        assert_eq!(range.min().get(), 1024);
        assert_eq!(range.preferred().get(), 2048);
        assert_eq!(range.max().get(), 4096);
        assert!(matches!(
            ResourceRange::parse("lots", 1, 2),
            Err(RangeError::Quantity(_))
        ));
    }

    #[test]
    fn deserializes_quantity_strings_and_defaults() {
        let range: ResourceRange =
            serde_json::from_str(r#"{"min": "8GB", "preferred": "16GB", "max": "32GB"}"#).unwrap();
        assert_eq!(range.min().get(), 8 * 1024 * 1024 * 1024);
        assert_eq!(range.max().get(), 32 * 1024 * 1024 * 1024);

        let partial: ResourceRange = serde_json::from_str(r#"{"min": 1, "preferred": 10}"#).unwrap();
        assert_eq!(partial.max().get(), 10);

        let only_min: ResourceRange = serde_json::from_str(r#"{"min": 3}"#).unwrap();
        assert_eq!(only_min, ResourceRange::exact(Quantity::new(3)));
    }

    #[test]
    fn deserialization_enforces_ordering() {
        let result = serde_json::from_str::<ResourceRange>(r#"{"min": 8, "preferred": 4, "max": 16}"#);
        assert!(result.is_err());
    }

    #[test]
    fn serializes_all_three_bounds() {
        let range = ResourceRange::new(1, 2, 3).unwrap();
        let json = serde_json::to_value(range).unwrap();
        assert_eq!(json, serde_json::json!({"min": 1, "preferred": 2, "max": 3}));
    }
}
