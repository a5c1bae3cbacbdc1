//! Coverage data model and persistence.
//!
//! The aggregation code only relies on `load`, `save` and
//! [`ProjectData::merge`]; everything else here serves reports and checks.

pub mod data;
pub mod store;

pub use data::*;
pub use store::{load, save, CoverageError};
