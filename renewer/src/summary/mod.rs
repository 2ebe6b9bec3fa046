//! Batch summary
//!
//! Human-readable rendering of a finished batch.

pub mod renderer;

pub use renderer::render_summary;
