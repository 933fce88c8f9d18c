//! Price-derived metrics: order competitiveness and cross-product size
//! normalization
//!
//! All arithmetic is exact decimal. Divisions are checked so a zero price
//! (e.g. a reference book that has not loaded yet) degrades to a fallback
//! instead of panicking.

use rust_decimal::Decimal;
use tokio::sync::watch;
use types::ids::ProductId;
use types::numeric::Price;

use crate::order::OrderKey;

/// Which currency leg two products share.
///
/// Named `<this product's leg><reference product's leg>`: `QuoteBase`
/// means this product's quote currency is the reference's base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegRelation {
    BaseBase,
    BaseQuote,
    QuoteBase,
    QuoteQuote,
    Unrelated,
}

impl LegRelation {
    /// Relation between `product` and `reference`, checking legs in the order
    /// base-base, base-quote, quote-base, quote-quote.
    pub fn between(product: &ProductId, reference: &ProductId) -> Self {
        let (base, quote) = product.legs();
        let (ref_base, ref_quote) = reference.legs();
        if base == ref_base {
            LegRelation::BaseBase
        } else if base == ref_quote {
            LegRelation::BaseQuote
        } else if quote == ref_base {
            LegRelation::QuoteBase
        } else if quote == ref_quote {
            LegRelation::QuoteQuote
        } else {
            LegRelation::Unrelated
        }
    }
}

/// Link to a related product's last-traded price.
#[derive(Debug, Clone)]
pub struct CrossConversion {
    pub reference: ProductId,
    pub relation: LegRelation,
    pub price: watch::Receiver<Price>,
}

impl CrossConversion {
    pub fn new(product: &ProductId, reference: ProductId, price: watch::Receiver<Price>) -> Self {
        let relation = LegRelation::between(product, &reference);
        Self {
            reference,
            relation,
            price,
        }
    }

    pub fn reference_price(&self) -> Price {
        *self.price.borrow()
    }
}

/// Multiplier converting `product` sizes into units of `canonical_asset`.
///
/// With no usable reference, sizes are already canonical when the base leg
/// is the canonical asset (multiplier 1); otherwise the product's own price
/// converts base units into quote units.
pub fn size_multiplier(
    product: &ProductId,
    own_price: Price,
    canonical_asset: &str,
    reference: Option<(LegRelation, Price)>,
) -> Decimal {
    let own = own_price.as_decimal();
    let fallback = if product.base() == canonical_asset {
        Decimal::ONE
    } else {
        own
    };
    let Some((relation, reference_price)) = reference else {
        return fallback;
    };
    let other = reference_price.as_decimal();
    let derived = match relation {
        LegRelation::BaseBase => Some(other),
        LegRelation::BaseQuote => Decimal::ONE.checked_div(other),
        LegRelation::QuoteBase => own.checked_mul(other),
        LegRelation::QuoteQuote => own.checked_div(other),
        LegRelation::Unrelated => None,
    };
    derived.unwrap_or(fallback)
}

/// Cached first and last visible keys of one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideBoundary {
    /// Best visible order.
    pub min: Option<OrderKey>,
    /// Worst order still inside the visible head.
    pub max: Option<OrderKey>,
}

/// Where `price` sits within the visible range: 0 at the best visible order,
/// 1 at the worst. Clamped to `[0, 1]`; 0 when the range is empty or flat.
pub fn competitiveness(price: Option<Price>, boundary: &SideBoundary) -> Decimal {
    let (Some(price), Some(min), Some(max)) = (price, &boundary.min, &boundary.max) else {
        return Decimal::ZERO;
    };
    let range = max.price.as_decimal() - min.price.as_decimal();
    if range.is_zero() {
        return Decimal::ZERO;
    }
    let offset = price.as_decimal() - min.price.as_decimal();
    offset
        .checked_div(range)
        .unwrap_or(Decimal::ZERO)
        .clamp(Decimal::ZERO, Decimal::ONE)
}
