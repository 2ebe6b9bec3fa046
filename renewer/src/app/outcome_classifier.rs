//! Outcome classification and resume rules
//!
//! Maps the progress a listing made (and the report of the last stage it
//! entered) to an `Outcome`, and an `Outcome` to the stage a retry resumes at.

use crate::app::stage_executor::{Signal, StageReport};
use crate::domain::entities::{Listing, Outcome, Stage};

/// Classify an attempt from the listing's recorded progress and the report
/// of the last stage entered
pub fn classify(listing: &Listing, last: &StageReport) -> Outcome {
    match last.signal {
        Signal::PaymentConfirmed => return Outcome::Success,
        Signal::ConsentRequired | Signal::Ineligible => return Outcome::Failed,
        Signal::SavedOnly => return Outcome::Saved,
        Signal::NotFound if listing.committed().is_none() => return Outcome::NotFound,
        _ => {}
    }

    if listing.is_saved() {
        Outcome::Saved
    } else if listing.exposure_ended() {
        Outcome::ExposureEndedOnly
    } else {
        Outcome::Failed
    }
}

/// Where a retry of `listing` should start, if it should be retried at all
pub fn resume_stage(listing: &Listing) -> Option<Stage> {
    match listing.outcome? {
        Outcome::Success => None,
        Outcome::ExposureEndedOnly => Some(Stage::AdEnd),
        // Without the display name the unpaid row cannot be found again
        Outcome::Saved => listing.display_name().map(|_| Stage::Payment),
        Outcome::Failed | Outcome::NotFound if listing.is_ineligible() => None,
        Outcome::Failed | Outcome::NotFound => Some(Stage::ExposureEnd),
    }
}
