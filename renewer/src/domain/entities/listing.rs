//! Listing domain entity
//!
//! A real-estate advertisement tracked through the renewal lifecycle.

use serde::{Deserialize, Serialize};

/// Maximum attempts per listing in one run (the first pass plus one retry)
pub const MAX_ATTEMPTS: u32 = 2;

/// Portal-native listing identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl ListingId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListingId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ListingId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Renewal lifecycle stage, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExposureEnd,
    AdEnd,
    ReRegister,
    AdSubmit,
    Payment,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ExposureEnd,
        Stage::AdEnd,
        Stage::ReRegister,
        Stage::AdSubmit,
        Stage::Payment,
    ];

    /// Stages from `self` through `last`, inclusive
    pub fn through(self, last: Stage) -> impl Iterator<Item = Stage> {
        Stage::ALL
            .into_iter()
            .filter(move |s| *s >= self && *s <= last)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::ExposureEnd => write!(f, "exposure_end"),
            Stage::AdEnd => write!(f, "ad_end"),
            Stage::ReRegister => write!(f, "re_register"),
            Stage::AdSubmit => write!(f, "ad_submit"),
            Stage::Payment => write!(f, "payment"),
        }
    }
}

/// Classified result of a listing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    ExposureEndedOnly,
    Saved,
    Failed,
    NotFound,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::ExposureEndedOnly => write!(f, "exposure_ended_only"),
            Outcome::Saved => write!(f, "saved"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::NotFound => write!(f, "not_found"),
        }
    }
}

/// A listing being renewed in the current run
#[derive(Debug, Clone)]
pub struct Listing {
    pub id: ListingId,
    /// Captured once at re-registration; the only reliable key afterwards
    display_name: Option<String>,
    /// Furthest stage entered in the current attempt
    stage_reached: Option<Stage>,
    /// Furthest stage that advanced anywhere in this run (portal-side progress)
    committed: Option<Stage>,
    /// The portal acknowledged the listing as saved but not yet paid
    saved: bool,
    /// Row found but not renewable (wrong advertisement type)
    ineligible: bool,
    pub outcome: Option<Outcome>,
    attempts: u32,
}

impl Listing {
    pub fn new(id: impl Into<ListingId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            stage_reached: None,
            committed: None,
            saved: false,
            ineligible: false,
            outcome: None,
            attempts: 0,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Store the display name. Later captures never overwrite the first one.
    pub fn capture_display_name(&mut self, name: &str) -> bool {
        let name = name.trim();
        if self.display_name.is_some() || name.is_empty() {
            return false;
        }
        self.display_name = Some(name.to_string());
        true
    }

    pub fn stage_reached(&self) -> Option<Stage> {
        self.stage_reached
    }

    pub fn committed(&self) -> Option<Stage> {
        self.committed
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    pub fn is_ineligible(&self) -> bool {
        self.ineligible
    }

    pub fn mark_ineligible(&mut self) {
        self.ineligible = true;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Some(Outcome::Success)
    }

    /// Open a new attempt. Returns false once the attempt budget is spent.
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempts >= MAX_ATTEMPTS || self.is_success() {
            return false;
        }
        self.attempts += 1;
        self.stage_reached = None;
        true
    }

    /// Record entry into a stage. Never moves backwards within an attempt.
    pub fn enter(&mut self, stage: Stage) {
        if self.stage_reached.map_or(true, |s| stage > s) {
            self.stage_reached = Some(stage);
        }
    }

    /// Record that a stage advanced
    pub fn commit(&mut self, stage: Stage) {
        self.enter(stage);
        if self.committed.map_or(true, |s| stage > s) {
            self.committed = Some(stage);
        }
    }

    pub fn exposure_ended(&self) -> bool {
        self.committed.is_some()
    }
}
