//! Listing Locator
//!
//! Finds a listing row in a paginated table. The page bound comes from the
//! total-count indicator; when that cannot be read the active table uses a
//! fixed cap and the ended table follows the next-page control.
//! Pages are always scanned in ascending order starting from the first.

use tracing::{debug, info, warn};

use crate::app::portal_page::PortalPage;
use crate::app::timing::{PAGE_SCAN_LIMIT, PAGE_TURN_SETTLE, PAGE_TURN_TIMEOUT};
use crate::config::PortalConfig;
use crate::domain::entities::ListingId;
use crate::domain::ports::{Clock, ElementHandle, ElementState, UiDriver};
use crate::error::DriverError;

/// Which table the rows come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingTable {
    /// The default listing table
    Active,
    /// The table filtered to listings whose exposure has ended
    Ended,
}

/// What identifies the row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// Substring of the trimmed id cell
    Id(ListingId),
    /// Exact match against the trimmed display name
    DisplayName(String),
}

impl std::fmt::Display for LookupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupKey::Id(id) => write!(f, "id {}", id),
            LookupKey::DisplayName(name) => write!(f, "name '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMatch {
    pub row: ElementHandle,
    /// 1-based page the row was found on
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateResult {
    Found(RowMatch),
    /// Id matched but the advertisement type is not renewable
    Ineligible { ad_type: String, page: u32 },
    NotFound { pages_searched: u32 },
}

pub struct ListingLocator<'a, D: ?Sized, C: ?Sized> {
    driver: &'a D,
    clock: &'a C,
    portal: &'a PortalConfig,
}

impl<'a, D, C> ListingLocator<'a, D, C>
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

    /// Search every page of `table`, which must already be showing page 1
    pub async fn locate(
        &self,
        table: ListingTable,
        key: &LookupKey,
    ) -> Result<LocateResult, DriverError> {
        let bound = self.page_bound(table).await?;
        info!(%key, ?table, pages = bound, "Searching listing table");

        let mut page = 1;
        loop {
            if let Some(result) = self.scan_page(table, key, page).await? {
                return Ok(result);
            }
            if page >= bound {
                break;
            }
            if !self.turn_page(page).await? {
                debug!(page, "No further pages");
                break;
            }
            page += 1;
        }

        warn!(%key, pages_searched = page, "Listing not found");
        Ok(LocateResult::NotFound {
            pages_searched: page,
        })
    }

    /// ceil(total / page size) when the count can be read. Otherwise the
    /// active table stops at the fallback cap, and the ended table runs until
    /// the next-page control gives out.
    pub async fn page_bound(&self, table: ListingTable) -> Result<u32, DriverError> {
        let fallback = match table {
            ListingTable::Active => self.portal.fallback_page_cap,
            ListingTable::Ended => PAGE_SCAN_LIMIT,
        };
        let Some(counter) = self.driver.query(&self.portal.selectors.total_count).await? else {
            warn!(?table, fallback, "Total count not shown");
            return Ok(fallback);
        };
        let text = self.driver.get_text(&counter).await?;
        match parse_count(&text) {
            Some(total) => Ok(pages_for(total, self.portal.page_size)),
            None => {
                warn!(?table, text = %text, fallback, "Unreadable total count");
                Ok(fallback)
            }
        }
    }

    async fn scan_page(
        &self,
        table: ListingTable,
        key: &LookupKey,
        page: u32,
    ) -> Result<Option<LocateResult>, DriverError> {
        let selectors = &self.portal.selectors;
        let row_selector = match (table, key) {
            (ListingTable::Active, LookupKey::Id(_)) => &selectors.active_rows,
            _ => &selectors.table_rows,
        };
        let rows = self.driver.query_all(row_selector).await?;
        debug!(page, rows = rows.len(), "Scanning page");

        for row in rows {
            let matched = match self.match_row(table, key, &row).await {
                Ok(matched) => matched,
                Err(e) if e.is_session() => return Err(e),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable row");
                    continue;
                }
            };
            if !matched {
                continue;
            }

            if table == ListingTable::Active && matches!(key, LookupKey::Id(_)) {
                if let Some(ad_type) = self.ineligible_ad_type(&row).await? {
                    warn!(%key, %ad_type, "Listing is not a renewable advertisement type");
                    return Ok(Some(LocateResult::Ineligible { ad_type, page }));
                }
            }
            info!(%key, page, "Listing found");
            return Ok(Some(LocateResult::Found(RowMatch { row, page })));
        }
        Ok(None)
    }

    async fn match_row(
        &self,
        table: ListingTable,
        key: &LookupKey,
        row: &ElementHandle,
    ) -> Result<bool, DriverError> {
        let selectors = &self.portal.selectors;
        match key {
            LookupKey::Id(id) => {
                let Some(cell) = self.driver.query_within(row, &selectors.id_cell).await? else {
                    return Ok(false);
                };
                let text = self.driver.get_text(&cell).await?;
                Ok(text.trim().contains(id.as_str()))
            }
            LookupKey::DisplayName(name) => {
                if table == ListingTable::Active
                    && self
                        .driver
                        .query_within(row, &selectors.row_place_ad_button)
                        .await?
                        .is_none()
                {
                    return Ok(false);
                }
                let page = PortalPage::new(self.driver, self.clock, self.portal);
                let shown = page.read_display_name(row).await?;
                Ok(shown.as_deref() == Some(name.trim()))
            }
        }
    }

    /// The row's ad type when it is not the renewable one
    async fn ineligible_ad_type(&self, row: &ElementHandle) -> Result<Option<String>, DriverError> {
        let Some(cell) = self
            .driver
            .query_within(row, &self.portal.selectors.ad_type_cell)
            .await?
        else {
            debug!("Ad type cell missing, assuming renewable");
            return Ok(None);
        };
        let text = self.driver.get_text(&cell).await?;
        let text = text.trim();
        if text.contains(self.portal.ad_type.as_str()) {
            Ok(None)
        } else {
            Ok(Some(text.to_string()))
        }
    }

    /// Advance from `current`. Returns false when there is no later page.
    async fn turn_page(&self, current: u32) -> Result<bool, DriverError> {
        let selectors = &self.portal.selectors;
        let Some(next) = self.driver.query(&selectors.next_page).await? else {
            return Ok(false);
        };
        let class = self.driver.get_attribute(&next, "class").await?;
        if class.is_some_and(|c| c.contains("disabled")) {
            return Ok(false);
        }
        let target = self.driver.get_attribute(&next, "data-value").await?;
        if let Some(target) = target.and_then(|v| v.trim().parse::<u32>().ok()) {
            if target <= current {
                return Ok(false);
            }
        }

        self.driver.click(&next).await?;
        self.clock.sleep(PAGE_TURN_SETTLE).await;
        match self
            .driver
            .wait_for_element(&selectors.table_rows, ElementState::Attached, PAGE_TURN_TIMEOUT)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_session() => return Err(e),
            Err(e) => {
                warn!(page = current + 1, error = %e, "Rows did not load after page turn");
                return Ok(false);
            }
        }
        PortalPage::new(self.driver, self.clock, self.portal)
            .dismiss_overlays()
            .await;
        Ok(true)
    }
}

/// Parse a displayed count such as "1,234" or "총 57건"
fn parse_count(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn pages_for(total: u32, page_size: u32) -> u32 {
    total.div_ceil(page_size.max(1)).max(1)
}
