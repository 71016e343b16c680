//! Value model and storage.
//!
//! Every value a recording refers to is an owned copy held by the
//! `ValueStore`. Host memory is never aliased, which is what keeps history
//! intact when the host reuses an address for a new object.

mod store;
mod value;

pub use store::ValueStore;
pub use value::{Observed, Shape, Value};
