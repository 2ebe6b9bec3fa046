//! Domain entities
//!
//! Pure domain models for the renewal lifecycle.

pub mod batch_result;
pub mod listing;

pub use batch_result::{BatchResult, ListingResult};
pub use listing::{Listing, ListingId, Outcome, Stage, MAX_ATTEMPTS};
