//! Domain ports (traits)
//!
//! Port traits define interfaces that the domain layer requires.
//! Adapters provide concrete implementations of these traits.

pub mod clock;
pub mod ui_driver;

pub use clock::Clock;
pub use ui_driver::{
    Dialog, DialogHandler, DialogResponse, ElementHandle, ElementState, UiDriver,
};
