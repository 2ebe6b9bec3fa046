//! Application layer
//!
//! Contains the renewal pipeline and batch orchestration.
//! Stages coordinate between domain entities, ports, and the portal pages.

pub mod batch_orchestrator;
pub mod diagnostics;
pub mod dialog_collector;
pub mod listing_locator;
pub mod outcome_classifier;
pub mod portal_page;
pub mod portal_stages;
pub mod simulated_stages;
pub mod stage_executor;
pub mod timing;
pub mod wait;

pub use batch_orchestrator::{BatchOrchestrator, RenewOptions};
pub use portal_page::login;
pub use portal_stages::PortalStages;
#[allow(unused_imports)]
pub use stage_executor::{run_pipeline, Signal, StageReport, StageRunner};
