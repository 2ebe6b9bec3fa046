//! Timing constants
//!
//! Every wait in the pipeline is bounded by one of these.

use std::time::Duration;

/// Full page navigation
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Listing table rows to render after navigation
pub const TABLE_TIMEOUT: Duration = Duration::from_secs(30);

/// A single control (button, filter tab, checkbox) to appear
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Registration page to appear after the re-register click
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows to re-render after a page turn
pub const PAGE_TURN_TIMEOUT: Duration = Duration::from_secs(8);

/// Runaway guard for table scans with no known page count
pub const PAGE_SCAN_LIMIT: u32 = 500;

/// Login redirect to the listing table
pub const LOGIN_REDIRECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before re-trying a transient wait
pub const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Attempts for a transient wait before the stage gives up
pub const TRANSIENT_ATTEMPTS: u32 = 2;

/// Short settle after a click that triggers a dialog or a re-render
pub const CLICK_SETTLE: Duration = Duration::from_millis(1000);

/// Polling interval while an exposure-end click settles
pub const EXPOSURE_END_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Settle after a page turn before reading rows
pub const PAGE_TURN_SETTLE: Duration = Duration::from_millis(2000);

/// Server-side reflection of ended listings in the ended table
pub const ENDED_TABLE_SETTLE: Duration = Duration::from_millis(2000);

/// Browser settle after login
pub const LOGIN_SETTLE: Duration = Duration::from_millis(2000);

/// Pause between consent clicks and their read-back
pub const CONSENT_READBACK_DELAY: Duration = Duration::from_millis(500);

/// Consent click attempts before the payment stage gives up
pub const CONSENT_ATTEMPTS: u32 = 3;

/// Payment confirmation polling interval
pub const PAYMENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound for the terminal payment confirmation
pub const PAYMENT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(20);

/// Pause between listings so the shared session settles
pub const BETWEEN_LISTINGS: Duration = Duration::from_millis(1000);

/// Fixed delay standing in for each transition in simulate mode
pub const SIMULATED_TRANSITION: Duration = Duration::from_millis(1000);
