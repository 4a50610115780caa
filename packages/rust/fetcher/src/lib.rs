//! HTTP retrieval of remote tracker lists.
//!
//! This crate provides:
//! - [`Fetcher`] — shared-client fetcher with bounded, order-preserving fan-out
//! - [`bootstrap`] — one-shot download of the seed list

pub mod bootstrap;
pub mod fetch;

pub use bootstrap::BootstrapOutcome;
pub use fetch::{Fetcher, parse_well_formed};
