//! API request/response types shared between the ingestion client and
//! anything observing it.

pub mod types;

pub use types::*;
