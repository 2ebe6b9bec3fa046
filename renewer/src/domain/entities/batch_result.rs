//! Batch result
//!
//! Final per-listing outcomes of one run, in input order.

use serde::Serialize;

use super::listing::{Listing, ListingId, Outcome, Stage};

/// Final state of one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingResult {
    pub id: ListingId,
    pub outcome: Outcome,
    pub stage_reached: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub attempts: u32,
}

impl From<&Listing> for ListingResult {
    fn from(listing: &Listing) -> Self {
        ListingResult {
            id: listing.id.clone(),
            outcome: listing.outcome.unwrap_or(Outcome::Failed),
            stage_reached: listing.stage_reached(),
            display_name: listing.display_name().map(str::to_string),
            attempts: listing.attempts(),
        }
    }
}

/// Results of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub listings: Vec<ListingResult>,
    /// Passes 2 and 3 were skipped because nothing left the sweep
    pub short_circuited: bool,
}

impl BatchResult {
    pub fn from_listings(listings: &[Listing], short_circuited: bool) -> Self {
        Self {
            listings: listings.iter().map(ListingResult::from).collect(),
            short_circuited,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ListingResult> {
        self.listings.iter().find(|r| r.id.as_str() == id)
    }

    pub fn success_count(&self) -> usize {
        self.listings
            .iter()
            .filter(|r| r.outcome == Outcome::Success)
            .count()
    }

    /// True only when every input listing ended at Success
    pub fn is_fully_successful(&self) -> bool {
        !self.listings.is_empty() && self.success_count() == self.listings.len()
    }

    pub fn unsuccessful(&self) -> impl Iterator<Item = &ListingResult> {
        self.listings
            .iter()
            .filter(|r| r.outcome != Outcome::Success)
    }
}
