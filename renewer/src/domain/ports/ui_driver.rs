//! UI driver port trait
//!
//! Defines the browser capabilities the renewal pipeline consumes. Selectors
//! starting with `//` are XPath, anything else is CSS.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;

/// Opaque reference to an element on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element state to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Present in the DOM
    Attached,
    /// Present and displayed
    Visible,
}

/// A native modal dialog raised by the page.
///
/// Only the text is known. WebDriver does not report whether an open dialog
/// is an alert, a confirm or a prompt, so handlers cannot branch on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub message: String,
}

/// How the driver should close a dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogResponse {
    Accept,
    /// Type `text` first, then accept. Drivers ignore the text when the
    /// dialog turns out not to be a prompt.
    AcceptWith(String),
}

/// Synchronous dialog callback; must decide immediately
pub type DialogHandler = Arc<dyn Fn(&Dialog) -> DialogResponse + Send + Sync>;

/// Port trait for driving the portal's web interface
#[async_trait]
pub trait UiDriver: Send + Sync {
    // Navigation

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    // Element lookup

    /// Wait until `selector` reaches `state`, failing with `DriverError::Timeout`
    async fn wait_for_element(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError>;

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, DriverError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError>;

    /// Lookup scoped to descendants of `parent`
    async fn query_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError>;

    // Interaction

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    async fn get_text(&self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn get_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn run_script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError>;

    // Session-level

    /// Register the dialog callback; replaces any previous handler
    fn on_dialog(&self, handler: DialogHandler);

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;
}
