//! Types library for the order-book synchronization services
//!
//! Value types shared between the feed wire format and the engine, so that
//! prices and sizes are exact decimals everywhere and never plain floats.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, ProductId)
//! - `numeric`: Fixed-point decimal types (Price, Size)
//! - `order`: Order side and type
//! - `errors`: Parse error taxonomy

pub mod errors;
pub mod ids;
pub mod numeric;
pub mod order;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
}
