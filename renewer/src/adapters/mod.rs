//! Adapters layer
//!
//! Implementations of port traits for external systems.

pub mod clock;
pub mod webdriver;

pub use clock::TokioClock;
pub use webdriver::WebDriverClient;
