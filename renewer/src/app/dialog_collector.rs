//! Dialog Collector
//!
//! Buffers native dialog texts raised by the page. The driver delivers
//! dialogs on its own schedule; stages reconcile by polling the buffer after
//! the triggering call returns.
//!
//! Callers must `clear()` immediately before any action expected to raise a
//! dialog, otherwise stale messages from an earlier action may be matched.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::app::wait::{wait_for, WaitTimeout};
use crate::domain::ports::{Clock, Dialog, DialogHandler, DialogResponse};

/// One observed dialog, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogMessage {
    pub text: String,
}

#[derive(Debug, Default)]
struct Buffer {
    messages: Vec<DialogMessage>,
}

/// Shared dialog buffer; cloning shares the same buffer
#[derive(Debug, Clone, Default)]
pub struct DialogCollector {
    inner: Arc<Mutex<Buffer>>,
}

impl DialogCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // A panicking handler cannot leave the Vec half-written; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop every buffered message
    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    pub fn append(&self, text: &str) {
        self.lock().messages.push(DialogMessage {
            text: text.to_string(),
        });
    }

    pub fn texts(&self) -> Vec<String> {
        self.lock().messages.iter().map(|m| m.text.clone()).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lock().messages.iter().any(|m| m.text.contains(needle))
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Poll the buffer until `predicate` picks something out of it.
    ///
    /// The predicate sees every buffered message in arrival order, so unrelated
    /// dialogs interleaved with the awaited one are simply skipped over.
    pub async fn poll_until<C, T, P>(
        &self,
        clock: &C,
        timeout: Duration,
        interval: Duration,
        mut predicate: P,
    ) -> Result<T, WaitTimeout>
    where
        C: Clock + ?Sized,
        P: FnMut(&[DialogMessage]) -> Option<T>,
    {
        wait_for(clock, timeout, interval, || {
            let found = predicate(&self.lock().messages);
            std::future::ready(found)
        })
        .await
    }

    /// Driver callback that records every dialog and always accepts it.
    ///
    /// The dialog kind is not observable, so every dialog gets the empty
    /// prompt answer; alerts and confirms ignore it.
    pub fn handler(&self) -> DialogHandler {
        let collector = self.clone();
        Arc::new(move |dialog: &Dialog| {
            tracing::debug!(message = %dialog.message, "Dialog observed");
            collector.append(&dialog.message);
            DialogResponse::AcceptWith(String::new())
        })
    }
}
