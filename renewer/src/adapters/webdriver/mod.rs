//! WebDriver adapter
//!
//! Implementation of the UI driver over the W3C WebDriver protocol.

pub mod client;

pub use client::WebDriverClient;
