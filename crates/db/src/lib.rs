//! Project persistence: one JSON document per project on local disk,
//! with a per-project lock serializing every mutation.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{LoadReport, ProjectStore};
