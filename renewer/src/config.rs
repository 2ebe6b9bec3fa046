use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

/// CSS/XPath selectors for the partner portal pages
#[derive(Debug, Clone)]
pub struct PortalSelectors {
    pub login_id_field: String,
    pub login_password_field: String,
    pub login_button: String,
    /// Any row of the currently visible listing table
    pub table_rows: String,
    /// Rows of the active table that are currently advertised
    pub active_rows: String,
    pub total_count: String,
    pub id_cell: String,
    pub ad_type_cell: String,
    /// Tried in order; the first non-empty text wins
    pub display_name_cells: Vec<String>,
    pub name_cell: String,
    pub trade_type_cell: String,
    pub price_cell: String,
    pub exposure_end_button: String,
    pub ad_end_filter: String,
    pub re_register_button: String,
    /// Per-row "place advertisement" control of a saved-but-unpaid listing
    pub row_place_ad_button: String,
    /// "Place advertisement" control on the registration page
    pub submit_ad_button: String,
    pub consent_checkbox: String,
    pub payment_method_checked: String,
    pub default_payment_method: String,
    pub payment_submit: String,
    pub next_page: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            login_id_field: "#member-id".to_string(),
            login_password_field: "#member-pw".to_string(),
            login_button: "#integrated-login > a".to_string(),
            table_rows: "table tbody tr".to_string(),
            active_rows: "table tbody tr.adComplete".to_string(),
            total_count: "div.statusItem.statusAll span.cnt".to_string(),
            id_cell: "td:nth-child(3) > div.numberN".to_string(),
            ad_type_cell: "td:nth-child(8)".to_string(),
            display_name_cells: vec![
                "td.danjiName p.fullName span".to_string(),
                "td.danjiName > div > p.fullName > span".to_string(),
                "p.fullName span".to_string(),
                ".fullName span".to_string(),
            ],
            name_cell: "td:nth-child(2)".to_string(),
            trade_type_cell: "td:nth-child(4)".to_string(),
            price_cell: "td:nth-child(5)".to_string(),
            exposure_end_button: "#naverEnd".to_string(),
            ad_end_filter: ".statusAdEnd".to_string(),
            re_register_button: "#reReg".to_string(),
            row_place_ad_button: "#naverAd".to_string(),
            submit_ad_button: "//*[normalize-space(text())='광고하기']".to_string(),
            consent_checkbox: "#consentMobile2".to_string(),
            payment_method_checked: "input[name=\"paymentMethod\"]:checked".to_string(),
            default_payment_method: "#paymentMethod1".to_string(),
            payment_submit: "#naverSendSave".to_string(),
            next_page: ".pagination a.btnArrow.next".to_string(),
        }
    }
}

/// Dialog texts the pipeline reacts to (matched by substring)
#[derive(Debug, Clone)]
pub struct DialogPhrases {
    /// Confirms an exposure end unless a failure phrase is also present
    pub exposure_ended: String,
    pub exposure_end_failed: Vec<String>,
    pub transmission_complete: String,
    pub listing_saved: String,
    pub consent_required: String,
}

impl Default for DialogPhrases {
    fn default() -> Self {
        Self {
            exposure_ended: "노출종료".to_string(),
            exposure_end_failed: vec![
                "노출종료에 실패".to_string(),
                "통신 중 오류".to_string(),
                "실패".to_string(),
            ],
            transmission_complete: "로켓전송이 완료되었습니다".to_string(),
            listing_saved: "매물을 저장 하였습니다".to_string(),
            consent_required: "동의".to_string(),
        }
    }
}

/// Everything the pipeline needs to know about the portal
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub page_size: u32,
    /// Page bound used when the total count cannot be read
    pub fallback_page_cap: u32,
    /// Only listings whose ad-type cell contains this text are renewed
    pub ad_type: String,
    pub selectors: PortalSelectors,
    pub phrases: DialogPhrases,
}

impl PortalConfig {
    pub fn login_url(&self) -> String {
        format!("{}/integrated/login?serviceCode=1000", self.base_url)
    }

    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url, self.listing_path())
    }

    /// Path of the active listing table, where a successful login lands
    pub fn listing_path(&self) -> &'static str {
        "/offerings/ad_list"
    }

    /// Path fragment of the login page, used to detect a rejected login
    pub fn login_path(&self) -> &'static str {
        "/integrated/login"
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.aipartner.com".to_string(),
            page_size: 50,
            fallback_page_cap: 10,
            ad_type: "로켓등록".to_string(),
            selectors: PortalSelectors::default(),
            phrases: DialogPhrases::default(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub login_id: String,
    pub login_password: String,
    /// Listing ids in processing order
    pub listing_ids: Vec<String>,
    /// Replace every transition with a fixed delay; never touches the site
    pub simulate: bool,
    pub webdriver_url: String,
    pub headless: bool,
    pub screenshot_dir: PathBuf,
    pub portal: PortalConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("login_id", &self.login_id)
            .field("login_password", &"<redacted>")
            .field("listing_ids", &self.listing_ids)
            .field("simulate", &self.simulate)
            .field("webdriver_url", &self.webdriver_url)
            .field("headless", &self.headless)
            .field("screenshot_dir", &self.screenshot_dir)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let simulate = get("SIMULATE")
            .map(|v| parse_flag("SIMULATE", &v))
            .transpose()?
            .unwrap_or(false);

        let listing_ids = parse_listing_ids(&get("LISTING_IDS").unwrap_or_default());

        let login_id = get("LOGIN_ID").unwrap_or_default();
        let login_password = get("LOGIN_PASSWORD").unwrap_or_default();

        let defaults = PortalConfig::default();
        let portal = PortalConfig {
            base_url: get("PORTAL_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            page_size: get("PORTAL_PAGE_SIZE")
                .map(|v| parse_positive("PORTAL_PAGE_SIZE", &v))
                .transpose()?
                .unwrap_or(defaults.page_size),
            fallback_page_cap: get("PORTAL_PAGE_CAP")
                .map(|v| parse_positive("PORTAL_PAGE_CAP", &v))
                .transpose()?
                .unwrap_or(defaults.fallback_page_cap),
            ad_type: get("PORTAL_AD_TYPE").unwrap_or(defaults.ad_type),
            selectors: defaults.selectors,
            phrases: defaults.phrases,
        };

        Ok(Self {
            login_id,
            login_password,
            listing_ids,
            simulate,
            webdriver_url: get("WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            headless: get("HEADLESS")
                .map(|v| parse_flag("HEADLESS", &v))
                .transpose()?
                .unwrap_or(true),
            screenshot_dir: get("SCREENSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("screenshots")),
            portal,
        })
    }

    /// Checks that only make sense after command-line overrides are applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listing_ids.is_empty() {
            return Err(ConfigError::Missing("LISTING_IDS"));
        }
        if !self.simulate {
            if self.login_id.is_empty() {
                return Err(ConfigError::Missing("LOGIN_ID"));
            }
            if self.login_password.is_empty() {
                return Err(ConfigError::Missing("LOGIN_PASSWORD"));
            }
        }
        Ok(())
    }
}

/// Split a comma separated id list, trimming and dropping empties
pub fn parse_listing_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            key,
            message: format!("expected a positive integer, got '{}'", value),
        }),
    }
}
