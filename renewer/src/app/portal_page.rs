//! Portal page helpers
//!
//! Navigation to the listing tables, overlay removal, login, and the small
//! scripts run inside the page.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::listing_locator::ListingLocator;
use crate::app::timing::{
    CONTROL_TIMEOUT, ENDED_TABLE_SETTLE, LOGIN_REDIRECT_TIMEOUT, LOGIN_SETTLE, TABLE_TIMEOUT,
    TRANSIENT_ATTEMPTS, TRANSIENT_RETRY_DELAY,
};
use crate::app::wait::{retry_transient, wait_for};
use crate::config::PortalConfig;
use crate::domain::entities::ListingId;
use crate::domain::ports::{Clock, ElementHandle, ElementState, UiDriver};
use crate::error::{DriverError, RenewalError};

/// Hides promotional popups and any high z-index layer covering the table
pub const DISMISS_OVERLAYS_SCRIPT: &str = r#"
const popups = document.querySelectorAll('img[src*="popup"], div[class*="popup"], div[id*="popup"], .modal, .overlay');
popups.forEach(el => { el.style.display = 'none'; el.style.visibility = 'hidden'; el.remove(); });
document.querySelectorAll('*').forEach(el => {
    const z = parseInt(window.getComputedStyle(el).zIndex);
    if (z > 1000) { el.style.display = 'none'; el.remove(); }
});
return null;
"#;

/// Clicks the checkbox matched by `arguments[0]` and returns its checked state
pub const CLICK_CHECKBOX_SCRIPT: &str = r#"
const box = document.querySelector(arguments[0]);
if (!box) { return false; }
box.click();
return box.checked;
"#;

/// Reads the checked state of `arguments[0]`
pub const READ_CHECKED_SCRIPT: &str = r#"
const box = document.querySelector(arguments[0]);
return box ? box.checked : false;
"#;

/// Borrowed view of the portal through a driver
pub struct PortalPage<'a, D: ?Sized, C: ?Sized> {
    driver: &'a D,
    clock: &'a C,
    portal: &'a PortalConfig,
}

impl<'a, D, C> PortalPage<'a, D, C>
where
    D: UiDriver + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(driver: &'a D, clock: &'a C, portal: &'a PortalConfig) -> Self {
        Self {
            driver,
            clock,
            portal,
        }
    }

    pub fn locator(&self) -> ListingLocator<'a, D, C> {
        ListingLocator::new(self.driver, self.clock, self.portal)
    }

    /// Remove overlays; failures are logged and ignored
    pub async fn dismiss_overlays(&self) {
        if let Err(e) = self
            .driver
            .run_script(DISMISS_OVERLAYS_SCRIPT, Vec::new())
            .await
        {
            debug!(error = %e, "Overlay removal failed");
        }
    }

    /// Navigate to the active listing table and wait for its rows
    pub async fn open_listing_table(&self) -> Result<(), DriverError> {
        let url = self.portal.listing_url();
        let url = url.as_str();
        let rows = self.portal.selectors.table_rows.as_str();
        let driver = self.driver;
        retry_transient(self.clock, TRANSIENT_ATTEMPTS, TRANSIENT_RETRY_DELAY, move || async move {
            driver.navigate(url).await?;
            driver
                .wait_for_element(rows, ElementState::Visible, TABLE_TIMEOUT)
                .await
        })
        .await?;
        self.dismiss_overlays().await;
        Ok(())
    }

    /// Show the table of listings whose exposure has ended
    pub async fn open_ended_table(&self) -> Result<(), DriverError> {
        self.open_listing_table().await?;
        let selectors = &self.portal.selectors;
        let filter = self
            .driver
            .wait_for_element(&selectors.ad_end_filter, ElementState::Visible, CONTROL_TIMEOUT)
            .await?;
        self.driver.click(&filter).await?;
        self.driver
            .wait_for_element(&selectors.table_rows, ElementState::Visible, CONTROL_TIMEOUT)
            .await?;
        self.clock.sleep(ENDED_TABLE_SETTLE).await;
        self.dismiss_overlays().await;
        Ok(())
    }

    /// First non-empty display-name text of a row
    pub async fn read_display_name(
        &self,
        row: &ElementHandle,
    ) -> Result<Option<String>, DriverError> {
        for selector in &self.portal.selectors.display_name_cells {
            let Some(cell) = self.driver.query_within(row, selector).await? else {
                continue;
            };
            let text = self.driver.get_text(&cell).await?;
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
        Ok(None)
    }

    /// Log the informational cells of a matched row; missing cells are fine
    pub async fn log_listing_info(&self, row: &ElementHandle, id: &ListingId) {
        let selectors = &self.portal.selectors;
        let name = self.cell_text(row, &selectors.name_cell).await;
        let trade = self.cell_text(row, &selectors.trade_type_cell).await;
        let price = self.cell_text(row, &selectors.price_cell).await;
        info!(
            listing = %id,
            name = name.as_deref().unwrap_or("-"),
            trade = trade.as_deref().unwrap_or("-"),
            price = price.as_deref().unwrap_or("-"),
            "Listing row matched"
        );
    }

    async fn cell_text(&self, row: &ElementHandle, selector: &str) -> Option<String> {
        let cell = self.driver.query_within(row, selector).await.ok()??;
        let text = self.driver.get_text(&cell).await.ok()?;
        Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// Read the checked state of a checkbox
    pub async fn is_checked(&self, selector: &str) -> Result<bool, DriverError> {
        let value = self
            .driver
            .run_script(READ_CHECKED_SCRIPT, vec![Value::from(selector)])
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Click a checkbox through the page, returning the state it reports
    pub async fn click_checkbox(&self, selector: &str) -> Result<bool, DriverError> {
        let value = self
            .driver
            .run_script(CLICK_CHECKBOX_SCRIPT, vec![Value::from(selector)])
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Authenticate against the portal.
///
/// Success is the redirect to the listing table; landing anywhere other than
/// the login page also counts. Still being on the login page is a rejection.
pub async fn login<D, C>(
    driver: &D,
    clock: &C,
    portal: &PortalConfig,
    login_id: &str,
    password: &str,
) -> Result<(), RenewalError>
where
    D: UiDriver + ?Sized,
    C: Clock + ?Sized,
{
    let selectors = &portal.selectors;
    info!(url = %portal.login_url(), "Logging in");

    driver.navigate(&portal.login_url()).await?;
    let id_field = driver
        .wait_for_element(&selectors.login_id_field, ElementState::Visible, TABLE_TIMEOUT)
        .await?;
    driver.fill(&id_field, login_id).await?;
    let password_field = driver
        .wait_for_element(
            &selectors.login_password_field,
            ElementState::Visible,
            CONTROL_TIMEOUT,
        )
        .await?;
    driver.fill(&password_field, password).await?;
    let button = driver
        .wait_for_element(&selectors.login_button, ElementState::Visible, CONTROL_TIMEOUT)
        .await?;
    driver.click(&button).await?;

    let listing_path = portal.listing_path();
    let redirected = wait_for(
        clock,
        LOGIN_REDIRECT_TIMEOUT,
        Duration::from_millis(500),
        move || async move {
            match driver.current_url().await {
                Ok(url) if url.contains(listing_path) => Some(Ok(url)),
                Ok(_) => None,
                Err(e) if e.is_session() => Some(Err(e)),
                Err(_) => None,
            }
        },
    )
    .await;

    match redirected {
        Ok(url) => {
            let url = url?;
            info!(%url, "Login complete");
        }
        Err(_) => {
            let url = driver.current_url().await?;
            if url.contains(portal.login_path()) {
                return Err(RenewalError::LoginRejected(format!(
                    "still on the login page after {:?}: {}",
                    LOGIN_REDIRECT_TIMEOUT, url
                )));
            }
            warn!(%url, "Login redirect timed out, continuing from alternate page");
        }
    }

    clock.sleep(LOGIN_SETTLE).await;
    Ok(())
}
