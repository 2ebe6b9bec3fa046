//! Stage Executor
//!
//! Runs a contiguous range of lifecycle stages for one listing. Each stage
//! reports whether it advanced; the first stage that does not advance ends
//! the attempt. Stage-local faults become a non-advanced report, only
//! session faults escape.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::entities::{Listing, Stage};
use crate::error::DriverError;

/// Extra information a stage attaches to its report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    None,
    /// The listing row could not be found on any page
    NotFound,
    /// The row was found but its advertisement type is not renewable
    Ineligible,
    /// Terminal payment confirmation observed
    PaymentConfirmed,
    /// Only the intermediate "saved" acknowledgement was observed
    SavedOnly,
    /// The portal demanded consent after submission
    ConsentRequired,
}

/// Result of running one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub advanced: bool,
    pub diagnostic: String,
    pub signal: Signal,
}

impl StageReport {
    pub fn advanced(diagnostic: impl Into<String>) -> Self {
        Self {
            advanced: true,
            diagnostic: diagnostic.into(),
            signal: Signal::None,
        }
    }

    pub fn stalled(diagnostic: impl Into<String>) -> Self {
        Self {
            advanced: false,
            diagnostic: diagnostic.into(),
            signal: Signal::None,
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }
}

/// Something that can perform lifecycle stages against the portal
#[async_trait]
pub trait StageRunner: Send {
    /// Perform `stage` for `listing`. `entry` is the first stage of the
    /// current attempt, so a stage can tell it is being resumed directly.
    async fn run_stage(
        &mut self,
        stage: Stage,
        listing: &mut Listing,
        entry: Stage,
    ) -> Result<StageReport, DriverError>;

    /// Show the ended-listings table once for the whole batch
    async fn end_advertisements(&mut self) -> Result<StageReport, DriverError>;

    /// Best-effort diagnostic capture; must never fail the caller
    async fn capture_diagnostics(&mut self, _label: &str) {}

    async fn pause_between_listings(&mut self) {}
}

/// Run `from..=to` for `listing`, stopping at the first stage that does not
/// advance. Returns the report of the last stage entered.
pub async fn run_pipeline<R>(
    runner: &mut R,
    listing: &mut Listing,
    from: Stage,
    to: Stage,
) -> Result<StageReport, DriverError>
where
    R: StageRunner + ?Sized,
{
    let mut last = StageReport::stalled("no stage entered");
    for stage in from.through(to) {
        listing.enter(stage);
        let report = match runner.run_stage(stage, listing, from).await {
            Ok(report) => report,
            Err(e) if e.is_session() => return Err(e),
            Err(e) => {
                warn!(listing = %listing.id, %stage, error = %e, "Stage fault");
                runner
                    .capture_diagnostics(&format!("{}_{}", listing.id, stage))
                    .await;
                StageReport::stalled(e.to_string())
            }
        };

        if report.signal == Signal::SavedOnly {
            listing.mark_saved();
        }
        if report.signal == Signal::Ineligible {
            listing.mark_ineligible();
        }

        if report.advanced {
            listing.commit(stage);
            info!(listing = %listing.id, %stage, diagnostic = %report.diagnostic, "Stage advanced");
            last = report;
        } else {
            warn!(listing = %listing.id, %stage, diagnostic = %report.diagnostic, "Stage did not advance");
            last = report;
            break;
        }
    }
    Ok(last)
}
