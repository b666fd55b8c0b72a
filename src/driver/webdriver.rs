//! Minimal blocking W3C WebDriver client (subset used by the dashboard driver).
//!
//! - Blocking requests with `ureq`, JSON bodies with `serde_json`.
//! - One browser session per [`Session`]; the session is deleted on drop.

use log::{debug, warn};
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};

use super::DriverError;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const CHROME_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-gpu",
    "--window-size=1280,1696",
    "--disable-dev-shm-usage",
    "--disable-dev-tools",
    "--no-zygote",
];

#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub endpoint: String,
    pub chrome_binary: Option<String>,
    /// Upper bound for element waits.
    pub wait: Duration,
}

/// Element lookup strategy and value.
#[derive(Debug, Clone)]
pub struct Locator {
    using: &'static str,
    value: String,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator {
            using: "css selector",
            value: selector.into(),
        }
    }

    pub fn xpath(path: impl Into<String>) -> Self {
        Locator {
            using: "xpath",
            value: path.into(),
        }
    }

    pub fn id(id: &str) -> Self {
        Locator::css(format!("#{}", id))
    }

    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Locator {
            using: "partial link text",
            value: text.into(),
        }
    }

    fn body(&self) -> Value {
        json!({ "using": self.using, "value": self.value })
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.using, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element(String);

pub struct Session {
    agent: ureq::Agent,
    base: String,
    wait: Duration,
}

impl Session {
    pub fn start(config: &WebDriverConfig) -> Result<Self, DriverError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(60)))
            .build()
            .into();

        let mut chrome_options = json!({ "args": CHROME_ARGS });
        if let Some(binary) = &config.chrome_binary {
            chrome_options["binary"] = Value::String(binary.clone());
        }
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome_options,
                }
            }
        });

        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let value = send(&agent, Method::Post, &format!("{}/session", endpoint), Some(&capabilities))?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Transport("new session response without sessionId".to_string()))?;
        debug!("WebDriver session {} started", id);

        Ok(Session {
            agent,
            base: format!("{}/session/{}", endpoint, id),
            wait: config.wait,
        })
    }

    pub fn wait_time(&self) -> Duration {
        self.wait
    }

    fn get(&self, path: &str) -> Result<Value, DriverError> {
        send(&self.agent, Method::Get, &format!("{}{}", self.base, path), None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, DriverError> {
        send(&self.agent, Method::Post, &format!("{}{}", self.base, path), Some(body))
    }

    pub fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.post("/url", &json!({ "url": url }))?;
        Ok(())
    }

    pub fn find(&self, locator: &Locator) -> Result<Element, DriverError> {
        element_from(self.post("/element", &locator.body())?)
    }

    pub fn find_all(&self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        elements_from(self.post("/elements", &locator.body())?)
    }

    pub fn find_in(&self, parent: &Element, locator: &Locator) -> Result<Element, DriverError> {
        element_from(self.post(&format!("/element/{}/element", parent.0), &locator.body())?)
    }

    pub fn find_all_in(&self, parent: &Element, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        elements_from(self.post(&format!("/element/{}/elements", parent.0), &locator.body())?)
    }

    pub fn click(&self, element: &Element) -> Result<(), DriverError> {
        self.post(&format!("/element/{}/click", element.0), &json!({}))?;
        Ok(())
    }

    pub fn send_keys(&self, element: &Element, text: &str) -> Result<(), DriverError> {
        self.post(&format!("/element/{}/value", element.0), &json!({ "text": text }))?;
        Ok(())
    }

    pub fn text(&self, element: &Element) -> Result<String, DriverError> {
        let value = self.get(&format!("/element/{}/text", element.0))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub fn is_displayed(&self, element: &Element) -> Result<bool, DriverError> {
        Ok(self.get(&format!("/element/{}/displayed", element.0))?.as_bool().unwrap_or(false))
    }

    pub fn is_enabled(&self, element: &Element) -> Result<bool, DriverError> {
        Ok(self.get(&format!("/element/{}/enabled", element.0))?.as_bool().unwrap_or(false))
    }

    /// Polls until the first element matching `locator` is displayed.
    pub fn wait_visible(&self, locator: &Locator) -> Result<Element, DriverError> {
        self.wait_for(locator, |el| self.is_displayed(el))
    }

    /// Polls until the first element matching `locator` is displayed and enabled.
    pub fn wait_clickable(&self, locator: &Locator) -> Result<Element, DriverError> {
        self.wait_for(locator, |el| Ok(self.is_displayed(el)? && self.is_enabled(el)?))
    }

    pub fn click_when_ready(&self, locator: &Locator) -> Result<Element, DriverError> {
        let element = self.wait_clickable(locator)?;
        self.click(&element)?;
        Ok(element)
    }

    fn wait_for(
        &self,
        locator: &Locator,
        ready: impl Fn(&Element) -> Result<bool, DriverError>,
    ) -> Result<Element, DriverError> {
        let deadline = Instant::now() + self.wait;
        loop {
            match self.find(locator) {
                Ok(el) => match ready(&el) {
                    Ok(true) => return Ok(el),
                    Ok(false) => {}
                    Err(e) if e.is_stale() => {}
                    Err(e) => return Err(e),
                },
                Err(e) if e.is_no_such_element() => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(locator.to_string()));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = send(&self.agent, Method::Delete, &self.base, None) {
            warn!("Failed to close WebDriver session: {}", e);
        }
    }
}

impl DriverError {
    fn is_stale(&self) -> bool {
        matches!(self, DriverError::WebDriver { error, .. } if error == "stale element reference")
    }
}

#[derive(Clone, Copy)]
enum Method {
    Get,
    Post,
    Delete,
}

fn send(agent: &ureq::Agent, method: Method, url: &str, body: Option<&Value>) -> Result<Value, DriverError> {
    let result = match method {
        Method::Get => agent.get(url).call(),
        Method::Delete => agent.delete(url).call(),
        Method::Post => agent.post(url).send_json(body.unwrap_or(&json!({}))),
    };
    let mut resp = result.map_err(|e| DriverError::Transport(e.to_string()))?;
    let status = resp.status().as_u16();
    let payload: Value = resp
        .body_mut()
        .read_json()
        .map_err(|e| DriverError::Transport(format!("http {}: unreadable body: {}", status, e)))?;
    unwrap_value(payload)
}

/// Extracts `value` from a WebDriver response, turning error objects into [`DriverError::WebDriver`].
fn unwrap_value(mut payload: Value) -> Result<Value, DriverError> {
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(DriverError::WebDriver {
            error: error.to_string(),
            message: value.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
        });
    }
    Ok(value)
}

fn element_from(value: Value) -> Result<Element, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| Element(id.to_string()))
        .ok_or_else(|| DriverError::Transport(format!("not an element reference: {}", value)))
}

fn elements_from(value: Value) -> Result<Vec<Element>, DriverError> {
    match value {
        Value::Array(items) => items.into_iter().map(element_from).collect(),
        other => Err(DriverError::Transport(format!("not an element list: {}", other))),
    }
}
