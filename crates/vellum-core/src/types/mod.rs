//! Core data types.

mod key;
mod value;

pub use key::DocKey;
pub use value::Value;
