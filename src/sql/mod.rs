//! Parameter binding and row decoding for tenant queries. Values always travel as bind
//! parameters, never spliced into SQL text.

pub mod params;
pub mod row;
pub use params::*;
pub use row::*;
