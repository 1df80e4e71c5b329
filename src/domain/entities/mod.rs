//! Core domain entities.
//!
//! - [`Mapping`] - A short code to long URL mapping
//! - [`NewMapping`] - Input for inserting a mapping with a known code
//! - [`PendingMapping`] - A sequential-strategy row awaiting its code

pub mod mapping;

pub use mapping::{Mapping, NewMapping, PendingMapping};
