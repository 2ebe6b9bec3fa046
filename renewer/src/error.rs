//! Unified error types for the renewal runner
//!
//! This module defines error types for each layer:
//! - `DriverError`: UI driver (WebDriver) faults
//! - `ConfigError`: environment/flag loading faults
//! - `RenewalError`: Application layer errors (the only ones that abort a batch)

use thiserror::Error;

/// How a driver fault should be treated by the stage pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Selector not yet present, slow navigation. Retried locally.
    Transient,
    /// Expected control entirely absent. Immediate stage failure.
    Structural,
    /// Browser/session gone. Aborts the whole batch.
    Session,
}

/// UI driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("WebDriver error: {status} {error} - {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Element not found: {0}")]
    NoSuchElement(String),

    #[error("Timed out after {timeout_ms}ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("Unexpected dialog open: {0}")]
    UnexpectedDialog(String),

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub fn kind(&self) -> FaultKind {
        match self {
            DriverError::SessionUnavailable(_) => FaultKind::Session,
            DriverError::Request(e) if e.is_connect() => FaultKind::Session,
            DriverError::Protocol { error, .. } if error == "invalid session id" => {
                FaultKind::Session
            }
            DriverError::Timeout { .. }
            | DriverError::UnexpectedDialog(_)
            | DriverError::Request(_) => FaultKind::Transient,
            DriverError::Protocol { error, .. }
                if error == "stale element reference" || error == "element click intercepted" =>
            {
                FaultKind::Transient
            }
            _ => FaultKind::Structural,
        }
    }

    pub fn is_session(&self) -> bool {
        self.kind() == FaultKind::Session
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Application layer errors - anything that reaches here ends the batch
#[derive(Debug, Error)]
pub enum RenewalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),
}
