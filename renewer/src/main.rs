//! Listing renewal runner
//!
//! Renews real-estate advertisements on the partner portal: ends exposure,
//! re-registers, and pays for each listing in a batch, then retries whatever
//! did not complete.
//! Uses hexagonal (ports & adapters) architecture: the pipeline only sees the
//! `UiDriver` and `Clock` ports.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod adapters;
mod app;
mod config;
mod domain;
mod error;
mod summary;



use adapters::{TokioClock, WebDriverClient};
use app::{login, BatchOrchestrator, PortalStages, RenewOptions};
use config::{parse_listing_ids, Config};
use domain::entities::BatchResult;
use error::RenewalError;

#[derive(Parser)]
#[command(name = "adrenew")]
#[command(about = "Renew listing advertisements on the partner portal")]
struct Cli {
    /// Replace every portal interaction with a fixed delay
    #[arg(long)]
    simulate: bool,

    /// Comma separated listing ids (overrides LISTING_IDS)
    #[arg(long)]
    listings: Option<String>,

    /// WebDriver endpoint (overrides WEBDRIVER_URL)
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Also write the batch result as JSON to this file
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout is reserved for the summary
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,adrenew=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("loading configuration")?;
    if cli.simulate {
        config.simulate = true;
    }
    if let Some(listings) = &cli.listings {
        config.listing_ids = parse_listing_ids(listings);
    }
    if let Some(url) = cli.webdriver_url {
        config.webdriver_url = url;
    }
    config.validate().context("validating configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("batch", %run_id);
    let result = run(&config).instrument(span).await?;

    println!("{}", summary::render_summary(&result));

    if let Some(path) = cli.summary_json {
        let json = serde_json::to_string_pretty(&result)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "Summary written");
    }

    Ok(())
}

async fn run(config: &Config) -> Result<BatchResult, RenewalError> {
    let clock = Arc::new(TokioClock::new());

    if config.simulate {
        tracing::info!("Simulate mode, the portal is not contacted");
        return BatchOrchestrator::simulated(clock)
            .renew_batch(&config.listing_ids, RenewOptions { simulate: true })
            .await;
    }

    let driver = WebDriverClient::connect(&config.webdriver_url, config.headless)
        .await
        .map_err(|e| RenewalError::SessionUnavailable(e.to_string()))?;
    let driver = Arc::new(driver);

    let result = renew(config, driver.clone(), clock).await;

    if let Err(e) = driver.close().await {
        tracing::warn!(error = %e, "Browser session did not close cleanly");
    }
    result
}

async fn renew(
    config: &Config,
    driver: Arc<WebDriverClient>,
    clock: Arc<TokioClock>,
) -> Result<BatchResult, RenewalError> {
    // Registers the dialog handler before any page is opened
    let stages = PortalStages::new(
        driver.clone(),
        clock.clone(),
        config.portal.clone(),
        config.screenshot_dir.clone(),
    );

    login(
        driver.as_ref(),
        clock.as_ref(),
        &config.portal,
        &config.login_id,
        &config.login_password,
    )
    .await?;

    BatchOrchestrator::new(stages, clock)
        .renew_batch(&config.listing_ids, RenewOptions::default())
        .await
}
