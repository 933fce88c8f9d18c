//! Identifier types for feed entities
//!
//! Order ids are opaque strings assigned by the venue and are only ever
//! compared for equality. Product ids name a trading pair as `BASE-QUOTE`
//! and expose their two currency legs for cross-instrument conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TypeError;

/// Unique identifier for an order within one product.
///
/// The feed never reuses ids, but nothing else about their shape is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Product identifier (trading pair)
///
/// Format: "BASE-QUOTE" (e.g., "BTC-USD", "ETH-BTC"), always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Create a new ProductId from a string
    ///
    /// # Panics
    /// Panics if the format is invalid (must be two non-empty legs joined by '-')
    pub fn new(symbol: impl Into<String>) -> Self {
        match Self::parse(symbol) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }

    /// Parse and normalize a product id, upper-casing both legs.
    pub fn parse(symbol: impl Into<String>) -> Result<Self, TypeError> {
        let s = symbol.into().trim().to_uppercase();
        match s.split_once('-') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('-') => {
                Ok(Self(s))
            }
            _ => Err(TypeError::InvalidProductId(s)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base currency leg ("BTC" in "BTC-USD").
    pub fn base(&self) -> &str {
        self.legs().0
    }

    /// Quote currency leg ("USD" in "BTC-USD").
    pub fn quote(&self) -> &str {
        self.legs().1
    }

    /// Split into base and quote legs.
    pub fn legs(&self) -> (&str, &str) {
        // Validated on construction
        self.0.split_once('-').unwrap_or((self.0.as_str(), ""))
    }

    /// Whether either leg is the given asset.
    pub fn has_leg(&self, asset: &str) -> bool {
        let (base, quote) = self.legs();
        base == asset || quote == asset
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProductId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_is_opaque() {
        let id = OrderId::new("d50ec984-77a8-460a-b958-66f114b0de9b");
        assert_eq!(id.as_str(), "d50ec984-77a8-460a-b958-66f114b0de9b");
        assert_eq!(id, OrderId::from("d50ec984-77a8-460a-b958-66f114b0de9b"));
    }

    #[test]
    fn test_product_id_legs() {
        let product = ProductId::new("eth-btc");
        assert_eq!(product.as_str(), "ETH-BTC");
        assert_eq!(product.base(), "ETH");
        assert_eq!(product.quote(), "BTC");
        assert!(product.has_leg("BTC"));
        assert!(!product.has_leg("USD"));
    }

    #[test]
    fn test_product_id_rejects_malformed() {
        assert!(ProductId::parse("BTCUSD").is_err());
        assert!(ProductId::parse("BTC-").is_err());
        assert!(ProductId::parse("-USD").is_err());
        assert!(ProductId::parse("A-B-C").is_err());
    }

    #[test]
    #[should_panic(expected = "invalid product id")]
    fn test_product_id_new_panics_on_invalid() {
        ProductId::new("INVALID");
    }

    #[test]
    fn test_product_id_serialization() {
        let product = ProductId::new("LTC-USD");
        let json = serde_json::to_string(&product).unwrap();
        assert_eq!(json, "\"LTC-USD\"");

        let deserialized: ProductId = serde_json::from_str("\"ltc-usd\"").unwrap();
        assert_eq!(product, deserialized);
        assert!(serde_json::from_str::<ProductId>("\"LTCUSD\"").is_err());
    }
}
