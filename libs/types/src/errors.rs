//! Error types for parsing shared value types
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Failure to construct a value type from its textual form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid product id: {0:?} (expected BASE-QUOTE)")]
    InvalidProductId(String),

    #[error("invalid decimal: {0:?}")]
    InvalidDecimal(String),

    #[error("size must not be negative: {0}")]
    NegativeSize(String),
}
