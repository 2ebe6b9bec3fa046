//! Portal Stages
//!
//! The five lifecycle stages performed against the live portal through a
//! `UiDriver`. Each stage re-establishes the page it needs instead of trusting
//! where the previous one left the browser, except that re-registration
//! reuses the ended table when it is already showing.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::app::diagnostics::capture_screenshot;
use crate::app::dialog_collector::DialogCollector;
use crate::app::listing_locator::{ListingTable, LocateResult, LookupKey, RowMatch};
use crate::app::portal_page::PortalPage;
use crate::app::stage_executor::{Signal, StageReport, StageRunner};
use crate::app::timing::{
    BETWEEN_LISTINGS, CLICK_SETTLE, CONSENT_ATTEMPTS, CONSENT_READBACK_DELAY, CONTROL_TIMEOUT,
    EXPOSURE_END_POLL_INTERVAL, PAYMENT_CONFIRM_TIMEOUT, PAYMENT_POLL_INTERVAL,
    REGISTRATION_TIMEOUT, TRANSIENT_ATTEMPTS, TRANSIENT_RETRY_DELAY,
};
use crate::app::wait::{retry_transient, wait_for};
use crate::config::{DialogPhrases, PortalConfig};
use crate::domain::entities::{Listing, Stage};
use crate::domain::ports::{Clock, ElementState, UiDriver};
use crate::error::DriverError;

/// Which table the browser is known to be showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortalView {
    Unknown,
    Listings,
    Ended,
}

pub struct PortalStages<D: UiDriver, C: Clock> {
    driver: Arc<D>,
    clock: Arc<C>,
    portal: PortalConfig,
    dialogs: DialogCollector,
    screenshot_dir: PathBuf,
    view: PortalView,
}

impl<D: UiDriver, C: Clock> PortalStages<D, C> {
    /// Registers the dialog collector with the driver
    pub fn new(driver: Arc<D>, clock: Arc<C>, portal: PortalConfig, screenshot_dir: PathBuf) -> Self {
        let dialogs = DialogCollector::new();
        driver.on_dialog(dialogs.handler());
        Self {
            driver,
            clock,
            portal,
            dialogs,
            screenshot_dir,
            view: PortalView::Unknown,
        }
    }

    pub fn dialogs(&self) -> &DialogCollector {
        &self.dialogs
    }

    fn page(&self) -> PortalPage<'_, D, C> {
        PortalPage::new(self.driver.as_ref(), self.clock.as_ref(), &self.portal)
    }

    async fn exposure_end(&mut self, listing: &mut Listing) -> Result<StageReport, DriverError> {
        self.view = PortalView::Unknown;
        self.page().open_listing_table().await?;
        self.view = PortalView::Listings;

        let key = LookupKey::Id(listing.id.clone());
        let located = self.page().locator().locate(ListingTable::Active, &key).await?;
        let found = match unlocated(located) {
            Ok(found) => found,
            Err(report) => return Ok(report),
        };
        self.page().log_listing_info(&found.row, &listing.id).await;

        let selectors = &self.portal.selectors;
        let Some(button) = self
            .driver
            .query_within(&found.row, &selectors.exposure_end_button)
            .await?
        else {
            return Ok(StageReport::stalled("exposure-end control missing on row"));
        };

        self.dialogs.clear();
        self.driver.click(&button).await?;

        // The filter tab is always on this page, so it proves nothing; only a
        // dialog or the row losing its control counts
        let driver = self.driver.as_ref();
        let dialogs = &self.dialogs;
        let phrases = &self.portal.phrases;
        let row = &found.row;
        let end_control = selectors.exposure_end_button.as_str();
        let evidence = wait_for(
            self.clock.as_ref(),
            CONTROL_TIMEOUT,
            EXPOSURE_END_POLL_INTERVAL,
            move || async move {
                if let Some(evidence) = exposure_end_dialog(dialogs, phrases) {
                    return Some(Ok(evidence));
                }
                match driver.query_within(row, end_control).await {
                    Ok(None) => Some(Ok(ExposureEvidence::ControlWithdrawn)),
                    Ok(Some(_)) => None,
                    Err(e) if e.is_session() => Some(Err(e)),
                    Err(_) => None,
                }
            },
        )
        .await;

        match evidence {
            Ok(Ok(ExposureEvidence::Confirmed(text))) => Ok(StageReport::advanced(format!(
                "exposure ended (page {}): {}",
                found.page, text
            ))),
            Ok(Ok(ExposureEvidence::ControlWithdrawn)) => Ok(StageReport::advanced(format!(
                "exposure ended (page {}), control withdrawn",
                found.page
            ))),
            Ok(Ok(ExposureEvidence::Failed(phrase))) => Ok(StageReport::stalled(format!(
                "portal reported exposure-end failure: {}",
                phrase
            ))),
            Ok(Err(e)) => Err(e),
            Err(timeout) => Ok(StageReport::stalled(format!(
                "exposure end not corroborated within {:?}",
                timeout.timeout
            ))),
        }
    }

    async fn show_ended_table(&mut self) -> Result<StageReport, DriverError> {
        self.view = PortalView::Unknown;
        match self.page().open_ended_table().await {
            Ok(()) => {
                self.view = PortalView::Ended;
                Ok(StageReport::advanced("ended table shown"))
            }
            Err(e) if e.is_session() => Err(e),
            Err(e) => Ok(StageReport::stalled(format!(
                "ended table unavailable: {}",
                e
            ))),
        }
    }

    async fn re_register(&mut self, listing: &mut Listing) -> Result<StageReport, DriverError> {
        // Anything below may move the table off page 1
        let reuse = self.view == PortalView::Ended;
        self.view = PortalView::Unknown;
        if !reuse {
            debug!(listing = %listing.id, "Reopening ended table");
            self.page().open_ended_table().await?;
        }

        let key = LookupKey::Id(listing.id.clone());
        let located = self.page().locator().locate(ListingTable::Ended, &key).await?;
        let found = match unlocated(located) {
            Ok(found) => found,
            Err(report) => return Ok(report),
        };
        self.page().dismiss_overlays().await;

        match self.page().read_display_name(&found.row).await {
            Ok(Some(name)) => {
                if listing.capture_display_name(&name) {
                    info!(listing = %listing.id, display_name = %name, "Display name captured");
                }
            }
            Ok(None) => {
                warn!(listing = %listing.id, "No display name on row, a payment retry will not be possible")
            }
            Err(e) if e.is_session() => return Err(e),
            Err(e) => warn!(listing = %listing.id, error = %e, "Display name unreadable"),
        }

        let Some(button) = self
            .driver
            .query_within(&found.row, &self.portal.selectors.re_register_button)
            .await?
        else {
            return Ok(StageReport::stalled("re-register control missing on row"));
        };
        self.dialogs.clear();
        self.driver.click(&button).await?;
        self.clock.sleep(CLICK_SETTLE).await;
        Ok(StageReport::advanced(format!(
            "re-registration opened (page {})",
            found.page
        )))
    }

    async fn ad_submit(&mut self) -> Result<StageReport, DriverError> {
        self.view = PortalView::Unknown;
        let driver = self.driver.as_ref();
        let selectors = &self.portal.selectors;
        let submit = selectors.submit_ad_button.as_str();

        let button = match retry_transient(
            self.clock.as_ref(),
            TRANSIENT_ATTEMPTS,
            TRANSIENT_RETRY_DELAY,
            move || async move {
                driver
                    .wait_for_element(submit, ElementState::Visible, REGISTRATION_TIMEOUT)
                    .await
            },
        )
        .await
        {
            Ok(button) => button,
            Err(e) if e.is_session() => return Err(e),
            Err(e) => {
                return Ok(StageReport::stalled(format!(
                    "registration page not shown: {}",
                    e
                )))
            }
        };

        self.dialogs.clear();
        self.driver.click(&button).await?;
        match self
            .driver
            .wait_for_element(&selectors.consent_checkbox, ElementState::Attached, CONTROL_TIMEOUT)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_session() => return Err(e),
            Err(e) => warn!(error = %e, "Payment page slow to settle, continuing"),
        }
        self.clock.sleep(CLICK_SETTLE).await;
        Ok(StageReport::advanced("registration submitted"))
    }

    async fn payment(&mut self, listing: &mut Listing, entry: Stage) -> Result<StageReport, DriverError> {
        if entry == Stage::Payment {
            if let Some(report) = self.reopen_saved(listing).await? {
                return Ok(report);
            }
        }

        if !self.check_consent().await? {
            return Ok(StageReport::stalled("consent control could not be checked"));
        }
        if !self.ensure_payment_method().await? {
            return Ok(StageReport::stalled("no payment method selectable"));
        }

        let Some(submit) = self.driver.query(&self.portal.selectors.payment_submit).await? else {
            return Ok(StageReport::stalled("payment submit control missing"));
        };
        self.dialogs.clear();
        if let Err(e) = self.driver.click(&submit).await {
            if e.is_session() {
                return Err(e);
            }
            // The submission may still have gone through; the dialogs decide
            warn!(listing = %listing.id, error = %e, "Payment submit reported a fault");
        }
        Ok(self.await_confirmation().await)
    }

    /// Open the payment page of a saved-but-unpaid listing, found by display
    /// name. Returns a report when the page could not be reached.
    async fn reopen_saved(&mut self, listing: &Listing) -> Result<Option<StageReport>, DriverError> {
        let Some(name) = listing.display_name().map(str::to_string) else {
            return Ok(Some(StageReport::stalled("no display name captured")));
        };
        info!(listing = %listing.id, display_name = %name, "Resuming payment of saved listing");

        self.view = PortalView::Unknown;
        self.page().open_listing_table().await?;
        let key = LookupKey::DisplayName(name);
        let located = self.page().locator().locate(ListingTable::Active, &key).await?;
        let found = match unlocated(located) {
            Ok(found) => found,
            Err(report) => return Ok(Some(report)),
        };

        let Some(button) = self
            .driver
            .query_within(&found.row, &self.portal.selectors.row_place_ad_button)
            .await?
        else {
            return Ok(Some(StageReport::stalled("place-ad control missing on row")));
        };
        self.page().dismiss_overlays().await;
        self.dialogs.clear();
        self.driver.click(&button).await?;
        self.clock.sleep(CLICK_SETTLE).await;

        match self
            .driver
            .wait_for_element(
                &self.portal.selectors.consent_checkbox,
                ElementState::Attached,
                REGISTRATION_TIMEOUT,
            )
            .await
        {
            Ok(_) => Ok(None),
            Err(e) if e.is_session() => Err(e),
            Err(e) => Ok(Some(StageReport::stalled(format!(
                "payment page not shown: {}",
                e
            )))),
        }
    }

    /// Make sure the consent checkbox ends up checked. A box that is already
    /// checked is never clicked, since a click would uncheck it.
    async fn check_consent(&self) -> Result<bool, DriverError> {
        let selector = self.portal.selectors.consent_checkbox.as_str();
        let page = self.page();

        for attempt in 1..=CONSENT_ATTEMPTS {
            match self
                .driver
                .wait_for_element(selector, ElementState::Attached, CONTROL_TIMEOUT)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_session() => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "Consent control not present");
                    self.clock.sleep(CONSENT_READBACK_DELAY).await;
                    continue;
                }
            }

            match page.is_checked(selector).await {
                Ok(true) => {
                    debug!(attempt, "Consent already checked");
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) if e.is_session() => return Err(e),
                Err(e) => warn!(attempt, error = %e, "Consent state unreadable"),
            }

            if let Err(e) = page.click_checkbox(selector).await {
                if e.is_session() {
                    return Err(e);
                }
                warn!(attempt, error = %e, "Consent click failed");
            }
            self.clock.sleep(CONSENT_READBACK_DELAY).await;

            match page.is_checked(selector).await {
                Ok(true) => {
                    info!(attempt, "Consent checked");
                    return Ok(true);
                }
                Ok(false) => warn!(attempt, "Consent click did not stick"),
                Err(e) if e.is_session() => return Err(e),
                Err(e) => warn!(attempt, error = %e, "Consent state unreadable"),
            }
            self.clock.sleep(CONSENT_READBACK_DELAY).await;
        }
        Ok(false)
    }

    async fn ensure_payment_method(&self) -> Result<bool, DriverError> {
        let selectors = &self.portal.selectors;
        match self
            .driver
            .wait_for_element(
                &selectors.payment_method_checked,
                ElementState::Attached,
                CONTROL_TIMEOUT,
            )
            .await
        {
            Ok(_) => return Ok(true),
            Err(e) if e.is_session() => return Err(e),
            Err(_) => info!("No payment method selected, choosing the default"),
        }

        let Some(default) = self.driver.query(&selectors.default_payment_method).await? else {
            return Ok(false);
        };
        self.driver.click(&default).await?;
        self.clock.sleep(CONSENT_READBACK_DELAY).await;
        Ok(true)
    }

    /// Poll dialogs until the terminal confirmation, a consent demand, or the
    /// bound. The intermediate "saved" acknowledgement is only remembered.
    async fn await_confirmation(&self) -> StageReport {
        let phrases = &self.portal.phrases;
        let mut saved_seen = false;

        let verdict = self
            .dialogs
            .poll_until(
                self.clock.as_ref(),
                PAYMENT_CONFIRM_TIMEOUT,
                PAYMENT_POLL_INTERVAL,
                |messages| {
                    let seen = |phrase: &str| messages.iter().any(|m| m.text.contains(phrase));
                    if seen(phrases.transmission_complete.as_str()) {
                        return Some(Signal::PaymentConfirmed);
                    }
                    if seen(phrases.listing_saved.as_str()) {
                        saved_seen = true;
                    }
                    if seen(phrases.consent_required.as_str()) {
                        return Some(Signal::ConsentRequired);
                    }
                    None
                },
            )
            .await;

        match verdict {
            Ok(Signal::PaymentConfirmed) => {
                StageReport::advanced("transmission complete").with_signal(Signal::PaymentConfirmed)
            }
            Ok(signal) => StageReport::stalled("portal requires consent").with_signal(signal),
            Err(timeout) if saved_seen => StageReport::stalled(format!(
                "saved but not confirmed within {:?}",
                timeout.timeout
            ))
            .with_signal(Signal::SavedOnly),
            Err(timeout) => StageReport::stalled(format!(
                "no confirmation within {:?}",
                timeout.timeout
            )),
        }
    }
}

/// What settled an exposure-end click
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExposureEvidence {
    Confirmed(String),
    ControlWithdrawn,
    Failed(String),
}

/// Read the exposure-end verdict out of the dialogs raised since the click.
/// Failure phrases win over the success phrase within one message.
fn exposure_end_dialog(dialogs: &DialogCollector, phrases: &DialogPhrases) -> Option<ExposureEvidence> {
    dialogs.texts().into_iter().find_map(|text| {
        if let Some(phrase) = phrases
            .exposure_end_failed
            .iter()
            .find(|phrase| text.contains(phrase.as_str()))
        {
            return Some(ExposureEvidence::Failed(phrase.clone()));
        }
        text.contains(phrases.exposure_ended.as_str())
            .then(|| ExposureEvidence::Confirmed(text))
    })
}

/// Split a locate result into the matched row or the report explaining why
/// there is none
fn unlocated(result: LocateResult) -> Result<RowMatch, StageReport> {
    match result {
        LocateResult::Found(found) => Ok(found),
        LocateResult::Ineligible { ad_type, .. } => Err(StageReport::stalled(format!(
            "advertisement type '{}' is not renewable",
            ad_type
        ))
        .with_signal(Signal::Ineligible)),
        LocateResult::NotFound { pages_searched } => Err(StageReport::stalled(format!(
            "row not found in {} page(s)",
            pages_searched
        ))
        .with_signal(Signal::NotFound)),
    }
}

#[async_trait]
impl<D: UiDriver, C: Clock> StageRunner for PortalStages<D, C> {
    async fn run_stage(
        &mut self,
        stage: Stage,
        listing: &mut Listing,
        entry: Stage,
    ) -> Result<StageReport, DriverError> {
        debug!(listing = %listing.id, %stage, %entry, "Entering stage");
        match stage {
            Stage::ExposureEnd => self.exposure_end(listing).await,
            Stage::AdEnd => self.show_ended_table().await,
            Stage::ReRegister => self.re_register(listing).await,
            Stage::AdSubmit => self.ad_submit().await,
            Stage::Payment => self.payment(listing, entry).await,
        }
    }

    async fn end_advertisements(&mut self) -> Result<StageReport, DriverError> {
        self.show_ended_table().await
    }

    async fn capture_diagnostics(&mut self, label: &str) {
        capture_screenshot(self.driver.as_ref(), &self.screenshot_dir, label).await;
    }

    async fn pause_between_listings(&mut self) {
        self.clock.sleep(BETWEEN_LISTINGS).await;
    }
}
