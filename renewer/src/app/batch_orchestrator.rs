//! Batch Orchestrator
//!
//! Drives a batch of listings through three passes:
//! - Sweep: end exposure of every listing
//! - Renewal: one global ad-end, then re-register through payment per listing
//! - Retry: one more attempt for everything not yet successful
//!
//! Listings are processed strictly one at a time in input order; they share
//! a single browser session.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};

use crate::app::outcome_classifier::{classify, resume_stage};
use crate::app::simulated_stages::SimulatedStages;
use crate::app::stage_executor::{run_pipeline, StageReport, StageRunner};
use crate::domain::entities::{BatchResult, Listing, Outcome, Stage};
use crate::domain::ports::Clock;
use crate::error::{DriverError, RenewalError};

/// Per-run switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RenewOptions {
    /// Replace every stage with a fixed delay instead of driving the portal
    pub simulate: bool,
}

pub struct BatchOrchestrator<R: StageRunner, C: Clock> {
    stages: R,
    clock: Arc<C>,
}

impl<C: Clock> BatchOrchestrator<SimulatedStages<C>, C> {
    /// Orchestrator that never touches the portal
    pub fn simulated(clock: Arc<C>) -> Self {
        Self::new(SimulatedStages::new(clock.clone()), clock)
    }
}

impl<R: StageRunner, C: Clock> BatchOrchestrator<R, C> {
    pub fn new(stages: R, clock: Arc<C>) -> Self {
        Self { stages, clock }
    }

    pub fn stages(&self) -> &R {
        &self.stages
    }

    /// Renew `ids` in order. Only configuration and session faults are
    /// returned as errors; everything else ends up in the per-listing outcome.
    pub async fn renew_batch(
        &mut self,
        ids: &[String],
        options: RenewOptions,
    ) -> Result<BatchResult, RenewalError> {
        let listings = unique_listings(ids);
        info!(count = listings.len(), simulate = options.simulate, "Starting batch");

        if options.simulate {
            let mut simulated = SimulatedStages::new(self.clock.clone());
            return run_batch(&mut simulated, listings).await;
        }
        run_batch(&mut self.stages, listings).await
    }
}

fn unique_listings(ids: &[String]) -> Vec<Listing> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| {
            let first = seen.insert(id.to_string());
            if !first {
                warn!(listing = %id, "Duplicate listing id ignored");
            }
            first
        })
        .map(Listing::new)
        .collect()
}

async fn run_batch<R>(stages: &mut R, mut listings: Vec<Listing>) -> Result<BatchResult, RenewalError>
where
    R: StageRunner + ?Sized,
{
    // Pass 1: sweep
    info!("Pass 1: ending exposure");
    for (index, listing) in listings.iter_mut().enumerate() {
        if index > 0 {
            stages.pause_between_listings().await;
        }
        listing.begin_attempt();
        let span = info_span!("sweep", listing = %listing.id);
        let report = attempt(stages, listing, Stage::ExposureEnd, Stage::ExposureEnd)
            .instrument(span)
            .await?;
        if !listing.exposure_ended() {
            listing.outcome = Some(classify(listing, &report));
        }
    }

    let ended = listings.iter().filter(|l| l.exposure_ended()).count();
    if ended == 0 {
        warn!("No listing left exposure, skipping renewal and retry");
        stages.capture_diagnostics("batch_end").await;
        return Ok(finish(&listings, true));
    }

    // Pass 2: renewal
    info!(ended, "Pass 2: renewing");
    let ad_end = match stages.end_advertisements().await {
        Ok(report) => report,
        Err(e) if e.is_session() => return Err(session_lost(stages, e).await),
        Err(e) => StageReport::stalled(e.to_string()),
    };
    if ad_end.advanced {
        let mut first = true;
        for listing in listings.iter_mut().filter(|l| l.outcome.is_none()) {
            if !first {
                stages.pause_between_listings().await;
            }
            first = false;
            listing.commit(Stage::AdEnd);
            let span = info_span!("renew", listing = %listing.id);
            let report = attempt(stages, listing, Stage::ReRegister, Stage::Payment)
                .instrument(span)
                .await?;
            listing.outcome = Some(classify(listing, &report));
        }
    } else {
        warn!(diagnostic = %ad_end.diagnostic, "Ended table unavailable, no listing renewed");
        stages.capture_diagnostics("ad_end").await;
        for listing in listings.iter_mut().filter(|l| l.outcome.is_none()) {
            listing.enter(Stage::AdEnd);
            listing.outcome = Some(classify(listing, &ad_end));
        }
    }

    // Pass 3: retry
    let pending: Vec<usize> = listings
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.is_success())
        .map(|(i, _)| i)
        .collect();
    info!(pending = pending.len(), "Pass 3: retrying");
    let mut first = true;
    for index in pending {
        let listing = &mut listings[index];
        let Some(from) = resume_stage(listing) else {
            info!(listing = %listing.id, outcome = ?listing.outcome, "Not retryable");
            continue;
        };
        if !listing.begin_attempt() {
            continue;
        }
        if !first {
            stages.pause_between_listings().await;
        }
        first = false;
        let span = info_span!("retry", listing = %listing.id, %from);
        let report = attempt(stages, listing, from, Stage::Payment)
            .instrument(span)
            .await?;
        let outcome = classify(listing, &report);
        info!(listing = %listing.id, %outcome, "Retry finished");
        listing.outcome = Some(outcome);
    }

    stages.capture_diagnostics("batch_end").await;
    Ok(finish(&listings, false))
}

/// One pipeline run. The pipeline only lets session faults through, and
/// those abort the batch.
async fn attempt<R>(
    stages: &mut R,
    listing: &mut Listing,
    from: Stage,
    to: Stage,
) -> Result<StageReport, RenewalError>
where
    R: StageRunner + ?Sized,
{
    match run_pipeline(stages, listing, from, to).await {
        Ok(report) => Ok(report),
        Err(e) => Err(session_lost(stages, e).await),
    }
}

async fn session_lost<R>(stages: &mut R, e: DriverError) -> RenewalError
where
    R: StageRunner + ?Sized,
{
    error!(error = %e, "Browser session lost, aborting batch");
    stages.capture_diagnostics("session_lost").await;
    RenewalError::SessionUnavailable(e.to_string())
}

fn finish(listings: &[Listing], short_circuited: bool) -> BatchResult {
    let result = BatchResult::from_listings(listings, short_circuited);
    for listing in &result.listings {
        match listing.outcome {
            Outcome::Success => info!(listing = %listing.id, "Renewed"),
            outcome => warn!(listing = %listing.id, %outcome, stage = ?listing.stage_reached, "Not renewed"),
        }
    }
    info!(
        renewed = result.success_count(),
        total = result.listings.len(),
        "Batch finished"
    );
    result
}
