//! Domain layer
//!
//! Contains pure business logic with no external dependencies.
//! - `entities`: Listing lifecycle types and batch results
//! - `ports`: Trait definitions for the UI driver and the clock

pub mod entities;
pub mod ports;
