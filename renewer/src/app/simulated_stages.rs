//! Simulated Stages
//!
//! Stand-in for the portal: every transition is a fixed delay that always
//! succeeds. Exercises the orchestration end to end without a browser.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::app::stage_executor::{Signal, StageReport, StageRunner};
use crate::app::timing::SIMULATED_TRANSITION;
use crate::domain::entities::{Listing, Stage};
use crate::domain::ports::Clock;
use crate::error::DriverError;

pub struct SimulatedStages<C: Clock> {
    clock: Arc<C>,
}

impl<C: Clock> SimulatedStages<C> {
    pub fn new(clock: Arc<C>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl<C: Clock> StageRunner for SimulatedStages<C> {
    async fn run_stage(
        &mut self,
        stage: Stage,
        listing: &mut Listing,
        _entry: Stage,
    ) -> Result<StageReport, DriverError> {
        info!(listing = %listing.id, %stage, "Simulating stage");
        self.clock.sleep(SIMULATED_TRANSITION).await;
        let report = StageReport::advanced(format!("simulated {}", stage));
        Ok(match stage {
            Stage::Payment => report.with_signal(Signal::PaymentConfirmed),
            _ => report,
        })
    }

    async fn end_advertisements(&mut self) -> Result<StageReport, DriverError> {
        info!("Simulating ended table");
        self.clock.sleep(SIMULATED_TRANSITION).await;
        Ok(StageReport::advanced("simulated ended table"))
    }
}
