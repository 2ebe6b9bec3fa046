//! W3C WebDriver client implementation
//!
//! Talks to a WebDriver endpoint (chromedriver, geckodriver, a grid) over its
//! JSON wire protocol. Native dialogs are handed to the registered handler
//! and closed right after every command that can raise them, and by a
//! background poller for dialogs raised by timers on the page.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::timing::NAVIGATION_TIMEOUT;
use crate::domain::ports::{
    Dialog, DialogHandler, DialogResponse, ElementHandle, ElementState, UiDriver,
};
use crate::error::DriverError;

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const DIALOG_POLL_INTERVAL: Duration = Duration::from_millis(250);
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Dialogs closed in one drain before giving up on a page that keeps raising them
const MAX_DIALOGS_PER_DRAIN: usize = 10;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Wire envelope: every WebDriver response wraps its payload in `value`
#[derive(Deserialize)]
struct Envelope<T> {
    value: T,
}

#[derive(Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Serialize)]
struct FindElement<'a> {
    using: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct NavigateRequest<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct SendKeys<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ExecuteScript<'a> {
    script: &'a str,
    args: Vec<Value>,
}

/// Pick the locator strategy from the selector syntax
fn locator_strategy(selector: &str) -> &'static str {
    if selector.starts_with("//") || selector.starts_with("(//") {
        "xpath"
    } else {
        "css selector"
    }
}

/// Map a WebDriver error body to a `DriverError`
fn wire_error(status: u16, error: WireError) -> DriverError {
    match error.error.as_str() {
        "no such element" => DriverError::NoSuchElement(error.message),
        "unexpected alert open" => DriverError::UnexpectedDialog(error.message),
        "invalid session id" | "session not created" => {
            DriverError::SessionUnavailable(error.message)
        }
        "javascript error" => DriverError::Script(error.message),
        "timeout" | "script timeout" => DriverError::Timeout {
            selector: "page".to_string(),
            timeout_ms: 0,
        },
        _ => DriverError::Protocol {
            status,
            error: error.error,
            message: error.message,
        },
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, DriverError> {
    let status = response.status();
    if status.is_success() {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| DriverError::Deserialization(e.to_string()))?;
        Ok(envelope.value)
    } else {
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Envelope<WireError>>(&text) {
            Ok(envelope) => Err(wire_error(status.as_u16(), envelope.value)),
            Err(_) => Err(DriverError::Protocol {
                status: status.as_u16(),
                error: "unknown error".to_string(),
                message: text,
            }),
        }
    }
}

/// The part of the client the background poller needs
#[derive(Clone)]
struct DialogChannel {
    http: Client,
    session_url: String,
    handler: Arc<RwLock<Option<DialogHandler>>>,
    /// Serializes drains so one dialog is never reported twice
    draining: Arc<Mutex<()>>,
}

impl DialogChannel {
    /// Hand every open dialog to the handler and close it
    async fn drain(&self) -> Result<usize, DriverError> {
        let _guard = self.draining.lock().await;
        let mut closed = 0;
        while closed < MAX_DIALOGS_PER_DRAIN {
            let response = self
                .http
                .get(format!("{}/alert/text", self.session_url))
                .send()
                .await?;
            let message: String = match decode::<Option<String>>(response).await {
                Ok(text) => text.unwrap_or_default(),
                Err(DriverError::Protocol { error, .. }) if error == "no such alert" => break,
                Err(e) => return Err(e),
            };

            let dialog = Dialog { message };
            let handler = self
                .handler
                .read()
                .map(|h| h.clone())
                .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
            let response = handler
                .map(|handle| handle(&dialog))
                .unwrap_or(DialogResponse::Accept);
            debug!(message = %dialog.message, ?response, "Closing dialog");

            if let DialogResponse::AcceptWith(text) = &response {
                // Rejected unless the dialog is a prompt; accepting still works
                let _ = self
                    .http
                    .post(format!("{}/alert/text", self.session_url))
                    .json(&SendKeys { text })
                    .send()
                    .await;
            }
            let response = self
                .http
                .post(format!("{}/alert/accept", self.session_url))
                .json(&json!({}))
                .send()
                .await?;
            match decode::<Value>(response).await {
                Ok(_) => {}
                // Closed by the page itself in the meantime
                Err(DriverError::Protocol { error, .. }) if error == "no such alert" => break,
                Err(e) => return Err(e),
            }
            closed += 1;
        }
        Ok(closed)
    }
}

/// Implementation of the UI driver over the WebDriver protocol
pub struct WebDriverClient {
    http: Client,
    session_url: String,
    dialogs: DialogChannel,
    poller: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WebDriverClient {
    /// Open a browser session
    pub async fn connect(base_url: &str, headless: bool) -> Result<Self, DriverError> {
        let http = Client::new();
        let base_url = base_url.trim_end_matches('/');

        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=1280,720".to_string(),
            format!("--user-agent={}", USER_AGENT),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "unhandledPromptBehavior": "ignore",
                    "timeouts": {
                        "pageLoad": NAVIGATION_TIMEOUT.as_millis() as u64,
                        "script": 30_000,
                    },
                    "goog:chromeOptions": { "args": args },
                }
            }
        });

        let response = http
            .post(format!("{}/session", base_url))
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| DriverError::SessionUnavailable(e.to_string()))?;
        let session: NewSession = decode(response).await.map_err(|e| match e {
            DriverError::SessionUnavailable(_) => e,
            other => DriverError::SessionUnavailable(other.to_string()),
        })?;
        info!(session = %session.session_id, headless, "Browser session opened");

        let session_url = format!("{}/session/{}", base_url, session.session_id);
        let dialogs = DialogChannel {
            http: http.clone(),
            session_url: session_url.clone(),
            handler: Arc::new(RwLock::new(None)),
            draining: Arc::new(Mutex::new(())),
        };

        let client = Self {
            http,
            session_url,
            dialogs: dialogs.clone(),
            poller: std::sync::Mutex::new(None),
        };
        client.start_dialog_poller(dialogs);
        Ok(client)
    }

    fn start_dialog_poller(&self, dialogs: DialogChannel) {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(DIALOG_POLL_INTERVAL).await;
                if let Err(e) = dialogs.drain().await {
                    if e.is_session() {
                        debug!("Dialog poller stopping, session gone");
                        break;
                    }
                }
            }
        });
        if let Ok(mut poller) = self.poller.lock() {
            *poller = Some(handle);
        }
    }

    fn stop_dialog_poller(&self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
    }

    /// End the browser session
    pub async fn close(&self) -> Result<(), DriverError> {
        self.stop_dialog_poller();
        let response = self.http.delete(&self.session_url).send().await?;
        decode::<Value>(response).await?;
        info!("Browser session closed");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.session_url, path)
    }

    async fn send_once<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, DriverError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        decode(request.send().await?).await
    }

    /// Issue a command; a dialog blocking it is drained and the command retried once
    async fn command<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, DriverError> {
        match self.send_once(method.clone(), path, body.as_ref()).await {
            Err(DriverError::UnexpectedDialog(message)) => {
                debug!(%message, "Command blocked by dialog, draining");
                self.dialogs.drain().await?;
                self.send_once(method, path, body.as_ref()).await
            }
            other => other,
        }
    }

    fn to_value<B: Serialize>(body: &B) -> Result<Value, DriverError> {
        serde_json::to_value(body).map_err(|e| DriverError::Deserialization(e.to_string()))
    }

    fn element_id(value: &Value) -> Result<ElementHandle, DriverError> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementHandle(id.to_string()))
            .ok_or_else(|| DriverError::Deserialization(format!("not an element: {}", value)))
    }

    async fn find(
        &self,
        parent: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let path = match parent {
            Some(parent) => format!("/element/{}/element", parent.0),
            None => "/element".to_string(),
        };
        let body = Self::to_value(&FindElement {
            using: locator_strategy(selector),
            value: selector,
        })?;
        match self.command::<Value>(Method::POST, &path, Some(body)).await {
            Ok(value) => Self::element_id(&value).map(Some),
            Err(DriverError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let body = Self::to_value(&FindElement {
            using: locator_strategy(selector),
            value: selector,
        })?;
        let values: Vec<Value> = self.command(Method::POST, "/elements", Some(body)).await?;
        values.iter().map(Self::element_id).collect()
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        self.command(
            Method::GET,
            &format!("/element/{}/displayed", element.0),
            None,
        )
        .await
    }
}

impl Drop for WebDriverClient {
    fn drop(&mut self) {
        self.stop_dialog_poller();
    }
}

#[async_trait]
impl UiDriver for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        debug!(%url, "Navigating");
        let body = Self::to_value(&NavigateRequest { url })?;
        self.command::<Value>(Method::POST, "/url", Some(body)).await?;
        self.dialogs.drain().await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.command(Method::GET, "/url", None).await
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<ElementHandle, DriverError> {
        let started = Instant::now();
        loop {
            match self.find(None, selector).await {
                Ok(Some(element)) => {
                    let ready = match state {
                        ElementState::Attached => true,
                        ElementState::Visible => match self.is_displayed(&element).await {
                            Ok(displayed) => displayed,
                            // Re-rendered between lookup and check
                            Err(DriverError::Protocol { error, .. })
                                if error == "stale element reference" =>
                            {
                                false
                            }
                            Err(e) => return Err(e),
                        },
                    };
                    if ready {
                        return Ok(element);
                    }
                }
                Ok(None) => {}
                Err(e) => return Err(e),
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, DriverError> {
        self.find(None, selector).await
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        self.find_all(selector).await
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        self.find(Some(parent), selector).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command::<Value>(
            Method::POST,
            &format!("/element/{}/click", element.0),
            Some(json!({})),
        )
        .await?;
        // Dialogs raised by the click are handled before control returns
        self.dialogs.drain().await?;
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.command::<Value>(
            Method::POST,
            &format!("/element/{}/clear", element.0),
            Some(json!({})),
        )
        .await?;
        let body = Self::to_value(&SendKeys { text })?;
        self.command::<Value>(
            Method::POST,
            &format!("/element/{}/value", element.0),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn get_text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        self.command(Method::GET, &format!("/element/{}/text", element.0), None)
            .await
    }

    async fn get_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.command(
            Method::GET,
            &format!("/element/{}/attribute/{}", element.0, name),
            None,
        )
        .await
    }

    async fn run_script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        let body = Self::to_value(&ExecuteScript { script, args })?;
        let value = self
            .command(Method::POST, "/execute/sync", Some(body))
            .await?;
        self.dialogs.drain().await?;
        Ok(value)
    }

    fn on_dialog(&self, handler: DialogHandler) {
        match self.dialogs.handler.write() {
            Ok(mut slot) => *slot = Some(handler),
            Err(poisoned) => *poisoned.into_inner() = Some(handler),
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        let encoded: String = self.command(Method::GET, "/screenshot", None).await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| DriverError::Deserialization(e.to_string()))?;
        if let Err(e) = tokio::fs::write(path, bytes).await {
            warn!(path = %path.display(), error = %e, "Screenshot not written");
            return Err(e.into());
        }
        Ok(())
    }
}
