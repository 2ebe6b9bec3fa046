//! Best-effort screenshot capture
//!
//! Screenshots never influence control flow: every failure is logged and
//! swallowed.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::ports::UiDriver;

/// `{dir}/{label}_{timestamp}.png`, with the label reduced to file-safe characters
pub fn screenshot_path(dir: &Path, label: &str) -> PathBuf {
    let label: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
    dir.join(format!("{}_{}.png", label, stamp))
}

/// Capture the current page into `dir`; returns the written path on success
pub async fn capture_screenshot<D>(driver: &D, dir: &Path, label: &str) -> Option<PathBuf>
where
    D: UiDriver + ?Sized,
{
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "Cannot create screenshot directory");
        return None;
    }
    let path = screenshot_path(dir, label);
    match driver.screenshot(&path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Screenshot saved");
            Some(path)
        }
        Err(e) => {
            warn!(label, error = %e, "Screenshot failed");
            None
        }
    }
}
