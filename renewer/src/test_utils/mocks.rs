//! Mock implementations of port traits
//!
//! These are in-memory implementations that can be configured for testing.
//! `FakePortal` keeps a small model of the partner portal (tables, pages,
//! dialogs, payment page) and answers the driver calls the pipeline makes.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::app::portal_page::{CLICK_CHECKBOX_SCRIPT, DISMISS_OVERLAYS_SCRIPT, READ_CHECKED_SCRIPT};
use crate::app::stage_executor::{Signal, StageReport, StageRunner};
use crate::config::PortalConfig;
use crate::domain::entities::{Listing, Stage};
use crate::domain::ports::{
    Clock, Dialog, DialogHandler, ElementHandle, ElementState, UiDriver,
};
use crate::error::DriverError;

// ============================================================================
// Fake Clock
// ============================================================================

type Scheduled = (Duration, Box<dyn FnOnce() + Send>);

#[derive(Default)]
struct FakeClockState {
    now: Duration,
    scheduled: Vec<Scheduled>,
}

/// Virtual time: `sleep` returns immediately after advancing `now`
#[derive(Clone, Default)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` once virtual time reaches `now + delay`
    pub fn schedule(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        let at = state.now + delay;
        state.scheduled.push((at, Box::new(callback)));
    }

    pub fn advance(&self, by: Duration) {
        let due = {
            let mut state = self.state.lock().unwrap();
            state.now += by;
            let now = state.now;
            let (mut due, pending): (Vec<_>, Vec<_>) =
                state.scheduled.drain(..).partition(|(at, _)| *at <= now);
            state.scheduled = pending;
            due.sort_by_key(|(at, _)| *at);
            due
        };
        for (_, callback) in due {
            callback();
        }
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.state.lock().unwrap().now
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Fake Portal
// ============================================================================

/// Portal-side state of one listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeStatus {
    /// Advertised; shows in the active table with an exposure-end control
    Active,
    /// Exposure ended; shows in the ended table
    ExposureEnded,
    /// Submitted but unpaid; shows in the active table with a place-ad control
    Saved,
    /// Renewed and advertised again
    Paid,
}

/// How the payment page answers a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentBehavior {
    /// "saved" then "transmission complete"
    Complete,
    /// Only the intermediate "saved" dialog
    SavedOnly,
    /// "consent required"
    ConsentRequired,
    /// No dialog at all
    Silent,
    /// "saved" now, "transmission complete" after the delay (needs a clock)
    CompleteAfter(Duration),
}

/// Scripted misbehaviour for one listing
#[derive(Debug, Clone, Default)]
pub struct ListingScript {
    /// Exposure-end clicks that change nothing and raise no dialog
    pub exposure_end_stalls: u32,
    /// Exposure ends without the success dialog
    pub silent_exposure_end: bool,
    /// Exposure-end clicks answered with a failure dialog
    pub exposure_end_failure_dialogs: u32,
    /// Consent clicks that do not stick
    pub consent_click_failures: u32,
    pub no_payment_method_preselected: bool,
    pub missing_re_register_button: bool,
    /// One entry per submission; `Complete` once exhausted
    pub payments: VecDeque<PaymentBehavior>,
}

#[derive(Debug, Clone)]
pub struct FakeListing {
    pub id: String,
    pub display_name: String,
    pub ad_type: String,
    pub status: FakeStatus,
    pub script: ListingScript,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum View {
    Blank,
    Login,
    Listings,
    Ended,
    Registration(String),
    Payment(String),
}

struct PortalState {
    listings: Vec<FakeListing>,
    view: View,
    page: usize,
    url: String,
    logged_in: bool,
    accept_login: bool,
    count_readable: bool,
    consent_checked: bool,
    method_selected: bool,
    fail_screenshots: bool,
    screenshots: Vec<PathBuf>,
    actions: Vec<String>,
    dialogs: Vec<String>,
}

/// In-memory portal implementing `UiDriver`
pub struct FakePortal {
    portal: PortalConfig,
    state: Mutex<PortalState>,
    handler: RwLock<Option<DialogHandler>>,
    clock: Option<FakeClock>,
    self_ref: Mutex<Option<std::sync::Weak<FakePortal>>>,
}

pub const EXPOSURE_ENDED_DIALOG: &str = "네이버에서 노출종료 했어요";
pub const EXPOSURE_END_FAILED_DIALOG: &str = "노출종료에 실패했습니다";
pub const SAVED_DIALOG: &str = "매물을 저장 하였습니다.";
pub const COMPLETE_DIALOG: &str = "로켓전송이 완료되었습니다.";
pub const CONSENT_DIALOG: &str = "이용약관에 동의해 주세요.";

impl FakePortal {
    pub fn new(portal: PortalConfig) -> Self {
        Self {
            portal,
            state: Mutex::new(PortalState {
                listings: Vec::new(),
                view: View::Blank,
                page: 1,
                url: "about:blank".to_string(),
                logged_in: false,
                accept_login: true,
                count_readable: true,
                consent_checked: false,
                method_selected: false,
                fail_screenshots: false,
                screenshots: Vec::new(),
                actions: Vec::new(),
                dialogs: Vec::new(),
            }),
            handler: RwLock::new(None),
            clock: None,
            self_ref: Mutex::new(None),
        }
    }

    /// Share virtual time with the pipeline: timeouts advance it and
    /// delayed dialogs fire on it
    pub fn with_clock(mut self, clock: FakeClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Wrap in an `Arc`, which delayed dialogs need to reach the portal
    pub fn shared(self) -> Arc<Self> {
        let portal = Arc::new(self);
        *portal.self_ref.lock().unwrap() = Some(Arc::downgrade(&portal));
        portal
    }

    /// Add an advertised listing of the renewable type
    pub fn with_listing(self, id: &str, display_name: &str) -> Self {
        let ad_type = self.portal.ad_type.clone();
        self.with_listing_script(id, display_name, &ad_type, ListingScript::default())
    }

    pub fn with_listing_script(
        self,
        id: &str,
        display_name: &str,
        ad_type: &str,
        script: ListingScript,
    ) -> Self {
        self.state.lock().unwrap().listings.push(FakeListing {
            id: id.to_string(),
            display_name: display_name.to_string(),
            ad_type: ad_type.to_string(),
            status: FakeStatus::Active,
            script,
        });
        self
    }

    /// Add `count` filler listings (ids `F{n}`) that nobody renews
    pub fn with_fillers(mut self, count: usize) -> Self {
        for n in 0..count {
            self = self.with_listing(&format!("F{:03}", n), &format!("Filler {}", n));
        }
        self
    }

    pub fn rejecting_login(self) -> Self {
        self.state.lock().unwrap().accept_login = false;
        self
    }

    pub fn without_total_count(self) -> Self {
        self.state.lock().unwrap().count_readable = false;
        self
    }

    pub fn failing_screenshots(self) -> Self {
        self.state.lock().unwrap().fail_screenshots = true;
        self
    }

    /// Open the listing table directly, bypassing login
    pub fn logged_in(self) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.logged_in = true;
            state.view = View::Listings;
            state.url = self.portal.listing_url();
        }
        self
    }

    pub fn status_of(&self, id: &str) -> Option<FakeStatus> {
        let state = self.state.lock().unwrap();
        state.listings.iter().find(|l| l.id == id).map(|l| l.status)
    }

    pub fn set_status(&self, id: &str, status: FakeStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(listing) = state.listings.iter_mut().find(|l| l.id == id) {
            listing.status = status;
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    /// Number of recorded actions mentioning `needle`
    pub fn count_actions(&self, needle: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.contains(needle))
            .count()
    }

    pub fn payment_submissions(&self, id: &str) -> usize {
        self.count_actions(&format!("click:pay:{}", id))
    }

    pub fn dialogs(&self) -> Vec<String> {
        self.state.lock().unwrap().dialogs.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn current_page(&self) -> usize {
        self.state.lock().unwrap().page
    }

    /// Listings visible in the current view, all pages
    fn table(state: &PortalState) -> Vec<&FakeListing> {
        match state.view {
            View::Listings => state
                .listings
                .iter()
                .filter(|l| l.status != FakeStatus::ExposureEnded)
                .collect(),
            View::Ended => state
                .listings
                .iter()
                .filter(|l| l.status == FakeStatus::ExposureEnded)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn page_count(&self, state: &PortalState) -> usize {
        let rows = Self::table(state).len();
        let size = self.portal.page_size as usize;
        ((rows + size - 1) / size).max(1)
    }

    fn page_rows<'a>(&self, state: &'a PortalState) -> Vec<&'a FakeListing> {
        let size = self.portal.page_size as usize;
        Self::table(state)
            .into_iter()
            .skip((state.page - 1) * size)
            .take(size)
            .collect()
    }

    fn listing<'a>(state: &'a PortalState, id: &str) -> Option<&'a FakeListing> {
        state.listings.iter().find(|l| l.id == id)
    }

    fn listing_mut<'a>(state: &'a mut PortalState, id: &str) -> Option<&'a mut FakeListing> {
        state.listings.iter_mut().find(|l| l.id == id)
    }

    fn emit(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .dialogs
            .push(message.to_string());
        let handler = self.handler.read().unwrap().clone();
        if let Some(handler) = handler {
            let _ = handler(&Dialog {
                message: message.to_string(),
            });
        }
    }

    fn emit_later(&self, delay: Duration, message: &'static str) {
        let clock = self.clock.clone();
        let weak = self.self_ref.lock().unwrap().clone();
        match (clock, weak) {
            (Some(clock), Some(weak)) => clock.schedule(delay, move || {
                if let Some(portal) = weak.upgrade() {
                    portal.emit(message);
                }
            }),
            _ => self.emit(message),
        }
    }

    fn time_out(&self, selector: &str, timeout: Duration) -> DriverError {
        if let Some(clock) = &self.clock {
            clock.advance(timeout);
        }
        DriverError::Timeout {
            selector: selector.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    fn find_global(&self, state: &PortalState, selector: &str) -> Option<ElementHandle> {
        let sel = &self.portal.selectors;
        let handle = |s: &str| Some(ElementHandle(s.to_string()));
        let in_table = matches!(state.view, View::Listings | View::Ended);
        match &state.view {
            View::Login if selector == sel.login_id_field => handle("login:id"),
            View::Login if selector == sel.login_password_field => handle("login:pw"),
            View::Login if selector == sel.login_button => handle("login:btn"),
            View::Registration(_) if selector == sel.submit_ad_button => handle("submit-ad"),
            View::Payment(_) if selector == sel.consent_checkbox => handle("consent"),
            View::Payment(_) if selector == sel.default_payment_method => handle("method:default"),
            View::Payment(_) if selector == sel.payment_submit => handle("pay"),
            View::Payment(_) if selector == sel.payment_method_checked => {
                state.method_selected.then(|| ElementHandle("method:checked".to_string()))
            }
            _ if in_table && selector == sel.ad_end_filter => handle("filter:adend"),
            _ if in_table && selector == sel.next_page => handle("next"),
            _ if in_table && selector == sel.total_count && state.count_readable => {
                handle("count")
            }
            _ if in_table && (selector == sel.table_rows || selector == sel.active_rows) => {
                self.rows(state, selector).into_iter().next()
            }
            _ => None,
        }
    }

    fn rows(&self, state: &PortalState, selector: &str) -> Vec<ElementHandle> {
        let sel = &self.portal.selectors;
        let only_active = selector == sel.active_rows;
        if selector != sel.table_rows && !only_active {
            return Vec::new();
        }
        self.page_rows(state)
            .into_iter()
            .filter(|l| {
                !only_active || matches!(l.status, FakeStatus::Active | FakeStatus::Paid)
            })
            .map(|l| ElementHandle(format!("row:{}", l.id)))
            .collect()
    }

    fn find_within(
        &self,
        state: &PortalState,
        parent: &ElementHandle,
        selector: &str,
    ) -> Option<ElementHandle> {
        let sel = &self.portal.selectors;
        let id = parent.0.strip_prefix("row:")?;
        let listing = Self::listing(state, id)?;
        let handle = |kind: &str| Some(ElementHandle(format!("{}:{}", kind, id)));

        if selector == sel.id_cell {
            handle("cell:id")
        } else if selector == sel.ad_type_cell {
            handle("cell:type")
        } else if selector == sel.display_name_cells[0] {
            handle("cell:name")
        } else if selector == sel.name_cell
            || selector == sel.trade_type_cell
            || selector == sel.price_cell
        {
            handle("cell:info")
        } else if selector == sel.exposure_end_button {
            (state.view == View::Listings
                && matches!(listing.status, FakeStatus::Active | FakeStatus::Paid))
            .then(|| ElementHandle(format!("btn:end:{}", id)))
        } else if selector == sel.re_register_button {
            (state.view == View::Ended && !listing.script.missing_re_register_button)
                .then(|| ElementHandle(format!("btn:rereg:{}", id)))
        } else if selector == sel.row_place_ad_button {
            (listing.status == FakeStatus::Saved)
                .then(|| ElementHandle(format!("btn:ad:{}", id)))
        } else {
            None
        }
    }

    fn press(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let key = element.0.as_str();
        let mut emit: Vec<&'static str> = Vec::new();
        let mut emit_late: Option<(Duration, &'static str)> = None;
        {
            let mut state = self.state.lock().unwrap();
            state.actions.push(format!("click:{}", key));
            let pages = self.page_count(&state);

            if key == "login:btn" {
                if state.accept_login {
                    state.logged_in = true;
                    state.view = View::Listings;
                    state.page = 1;
                    state.url = self.portal.listing_url();
                }
            } else if key == "filter:adend" {
                state.view = View::Ended;
                state.page = 1;
            } else if key == "next" {
                if state.page < pages {
                    state.page += 1;
                }
            } else if let Some(id) = key.strip_prefix("btn:end:") {
                let listing = Self::listing_mut(&mut state, id)
                    .ok_or_else(|| DriverError::NoSuchElement(key.to_string()))?;
                if listing.script.exposure_end_failure_dialogs > 0 {
                    listing.script.exposure_end_failure_dialogs -= 1;
                    emit.push(EXPOSURE_END_FAILED_DIALOG);
                } else if listing.script.exposure_end_stalls > 0 {
                    listing.script.exposure_end_stalls -= 1;
                } else {
                    listing.status = FakeStatus::ExposureEnded;
                    if !listing.script.silent_exposure_end {
                        emit.push(EXPOSURE_ENDED_DIALOG);
                    }
                }
            } else if let Some(id) = key.strip_prefix("btn:rereg:") {
                state.view = View::Registration(id.to_string());
                state.url = format!("{}/offerings/ad_regist", self.portal.base_url);
            } else if key == "submit-ad" {
                if let View::Registration(id) = state.view.clone() {
                    let preselected = {
                        let listing = Self::listing_mut(&mut state, &id)
                            .ok_or_else(|| DriverError::NoSuchElement(key.to_string()))?;
                        listing.status = FakeStatus::Saved;
                        !listing.script.no_payment_method_preselected
                    };
                    state.view = View::Payment(id);
                    state.consent_checked = false;
                    state.method_selected = preselected;
                }
            } else if let Some(id) = key.strip_prefix("btn:ad:") {
                let preselected = Self::listing(&state, id)
                    .map(|l| !l.script.no_payment_method_preselected)
                    .unwrap_or(true);
                state.view = View::Payment(id.to_string());
                state.consent_checked = false;
                state.method_selected = preselected;
            } else if key == "method:default" {
                state.method_selected = true;
            } else if key == "pay" {
                let View::Payment(id) = state.view.clone() else {
                    return Err(DriverError::NoSuchElement(key.to_string()));
                };
                state.actions.push(format!("click:pay:{}", id));
                if !state.consent_checked {
                    emit.push(CONSENT_DIALOG);
                } else {
                    let listing = Self::listing_mut(&mut state, &id)
                        .ok_or_else(|| DriverError::NoSuchElement(key.to_string()))?;
                    let behavior = listing
                        .script
                        .payments
                        .pop_front()
                        .unwrap_or(PaymentBehavior::Complete);
                    match behavior {
                        PaymentBehavior::Complete => {
                            listing.status = FakeStatus::Paid;
                            emit.push(SAVED_DIALOG);
                            emit.push(COMPLETE_DIALOG);
                        }
                        PaymentBehavior::SavedOnly => emit.push(SAVED_DIALOG),
                        PaymentBehavior::ConsentRequired => emit.push(CONSENT_DIALOG),
                        PaymentBehavior::Silent => {}
                        PaymentBehavior::CompleteAfter(delay) => {
                            listing.status = FakeStatus::Paid;
                            emit.push(SAVED_DIALOG);
                            emit_late = Some((delay, COMPLETE_DIALOG));
                        }
                    }
                }
            }
        }
        for message in emit {
            self.emit(message);
        }
        if let Some((delay, message)) = emit_late {
            self.emit_later(delay, message);
        }
        Ok(())
    }
}

#[async_trait]
impl UiDriver for FakePortal {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(format!("navigate:{}", url));
        state.url = url.to_string();
        state.page = 1;
        state.view = if url == self.portal.login_url() {
            View::Login
        } else if url == self.portal.listing_url() && state.logged_in {
            View::Listings
        } else if url == self.portal.listing_url() {
            state.url = self.portal.login_url();
            View::Login
        } else {
            View::Blank
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        _state: ElementState,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        let found = {
            let state = self.state.lock().unwrap();
            self.find_global(&state, selector)
        };
        found.ok_or_else(|| self.time_out(selector, timeout))
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(self.find_global(&state, selector))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(self.rows(&state, selector))
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(self.find_within(&state, parent, selector))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.press(element)
    }

    async fn fill(&self, element: &ElementHandle, _text: &str) -> Result<(), DriverError> {
        self.state
            .lock()
            .unwrap()
            .actions
            .push(format!("fill:{}", element));
        Ok(())
    }

    async fn get_text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let state = self.state.lock().unwrap();
        let key = element.0.as_str();
        if key == "count" {
            let total = Self::table(&state).len();
            return Ok(format_thousands(total));
        }
        let (kind, id) = key
            .rsplit_once(':')
            .ok_or_else(|| DriverError::NoSuchElement(key.to_string()))?;
        let listing =
            Self::listing(&state, id).ok_or_else(|| DriverError::NoSuchElement(key.to_string()))?;
        Ok(match kind {
            "cell:id" => format!("\n {} \n네이버", listing.id),
            "cell:type" => format!(" {} ", listing.ad_type),
            "cell:name" => format!("  {}  ", listing.display_name),
            "cell:info" => "info".to_string(),
            _ => String::new(),
        })
    }

    async fn get_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let state = self.state.lock().unwrap();
        if element.0 != "next" {
            return Ok(None);
        }
        let last = state.page >= self.page_count(&state);
        Ok(match name {
            "class" if last => Some("btnArrow next disabled".to_string()),
            "class" => Some("btnArrow next".to_string()),
            "data-value" if last => Some(state.page.to_string()),
            "data-value" => Some((state.page + 1).to_string()),
            _ => None,
        })
    }

    async fn run_script(&self, script: &str, _args: Vec<Value>) -> Result<Value, DriverError> {
        let mut state = self.state.lock().unwrap();
        if script == DISMISS_OVERLAYS_SCRIPT {
            state.actions.push("script:dismiss-overlays".to_string());
            return Ok(Value::Null);
        }
        let View::Payment(id) = state.view.clone() else {
            return Err(DriverError::Script("consent control not on page".to_string()));
        };
        if script == CLICK_CHECKBOX_SCRIPT {
            state.actions.push("click:consent".to_string());
            let sticks = match Self::listing_mut(&mut state, &id) {
                Some(listing) if listing.script.consent_click_failures > 0 => {
                    listing.script.consent_click_failures -= 1;
                    false
                }
                _ => true,
            };
            if sticks {
                state.consent_checked = !state.consent_checked;
            }
            Ok(Value::Bool(state.consent_checked))
        } else if script == READ_CHECKED_SCRIPT {
            Ok(Value::Bool(state.consent_checked))
        } else {
            Err(DriverError::Script("unknown script".to_string()))
        }
    }

    fn on_dialog(&self, handler: DialogHandler) {
        *self.handler.write().unwrap() = Some(handler);
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_screenshots {
            return Err(DriverError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            )));
        }
        state.screenshots.push(path.to_path_buf());
        Ok(())
    }
}

fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Scripted Stage Runner
// ============================================================================

/// Stage runner that replays scripted reports per (listing, stage).
///
/// Unscripted stages advance; an unscripted Payment confirms.
#[derive(Default)]
pub struct ScriptedStages {
    scripts: HashMap<(String, Stage), VecDeque<Result<StageReport, DriverError>>>,
    ad_end: VecDeque<Result<StageReport, DriverError>>,
    display_names: HashMap<String, String>,
    pub calls: Vec<(String, Stage)>,
    pub ad_end_calls: usize,
    pub diagnostics: Vec<String>,
}

impl ScriptedStages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, id: &str, stage: Stage, report: StageReport) -> Self {
        self.scripts
            .entry((id.to_string(), stage))
            .or_default()
            .push_back(Ok(report));
        self
    }

    pub fn fault(mut self, id: &str, stage: Stage, error: DriverError) -> Self {
        self.scripts
            .entry((id.to_string(), stage))
            .or_default()
            .push_back(Err(error));
        self
    }

    pub fn ad_end(mut self, report: StageReport) -> Self {
        self.ad_end.push_back(Ok(report));
        self
    }

    pub fn with_display_name(mut self, id: &str, name: &str) -> Self {
        self.display_names.insert(id.to_string(), name.to_string());
        self
    }

    pub fn calls_for(&self, id: &str) -> Vec<Stage> {
        self.calls
            .iter()
            .filter(|(listing, _)| listing == id)
            .map(|(_, stage)| *stage)
            .collect()
    }
}

#[async_trait]
impl StageRunner for ScriptedStages {
    async fn run_stage(
        &mut self,
        stage: Stage,
        listing: &mut Listing,
        _entry: Stage,
    ) -> Result<StageReport, DriverError> {
        let id = listing.id.to_string();
        self.calls.push((id.clone(), stage));
        if stage == Stage::ReRegister {
            if let Some(name) = self.display_names.get(&id) {
                listing.capture_display_name(name);
            }
        }
        if let Some(next) = self
            .scripts
            .get_mut(&(id, stage))
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        Ok(match stage {
            Stage::Payment => StageReport::advanced("confirmed").with_signal(Signal::PaymentConfirmed),
            _ => StageReport::advanced("scripted"),
        })
    }

    async fn end_advertisements(&mut self) -> Result<StageReport, DriverError> {
        self.ad_end_calls += 1;
        self.ad_end
            .pop_front()
            .unwrap_or_else(|| Ok(StageReport::advanced("ended table shown")))
    }

    async fn capture_diagnostics(&mut self, label: &str) {
        self.diagnostics.push(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_thousands_inserts_separators() {
        assert_eq!(format_thousands(7), "7");
        assert_eq!(format_thousands(1234), "1,234");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }

    #[test]
    fn fake_clock_fires_callbacks_in_time_order() {
        let clock = FakeClock::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = log.clone();
        let b = log.clone();
        clock.schedule(Duration::from_secs(3), move || a.lock().unwrap().push("late"));
        clock.schedule(Duration::from_secs(1), move || b.lock().unwrap().push("early"));
        clock.advance(Duration::from_secs(2));
        assert_eq!(*log.lock().unwrap(), vec!["early"]);
        clock.advance(Duration::from_secs(2));
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
    }
}
