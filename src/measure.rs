//! Client for the thermometer measurement portal.
//!
//! - Blocking `ureq` agent with a cookie jar for the portal session.
//! - The portal has no API: the login form and the measurement table are
//!   extracted from HTML with `regex`.
//! - Pagination follows the `li.next` link, bounded by a page limit and
//!   stopping on a link it already visited.

use chrono::Utc;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::LazyLock;
use std::time::Duration;
use ureq::ResponseExt;

/// One thermometer row as shown by the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReading {
    pub device_id: String,
    pub device_name: String,
    pub device_group: String,
    /// Value with unit, e.g. `"21.5°C"`.
    pub temperature: String,
    /// Device local time, `%d/%m/%y %H:%M:%S`.
    pub measured_at: String,
    pub fetched_at: i64,
}

#[derive(Debug)]
pub enum MeasureError {
    Transport(String),
    Http { status: u16, url: String },
    Login(String),
    Config(String),
}

impl Display for MeasureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MeasureError::Transport(s) => write!(f, "transport error: {}", s),
            MeasureError::Http { status, url } => write!(f, "http {} from {}", status, url),
            MeasureError::Login(s) => write!(f, "portal login failed: {}", s),
            MeasureError::Config(s) => write!(f, "measurement portal configuration error: {}", s),
        }
    }
}

impl Error for MeasureError {}

pub trait Thermometers {
    fn read_all(&self) -> Result<Vec<DeviceReading>, MeasureError>;
}

#[derive(Debug, Clone)]
pub struct MeasureConfig {
    pub url: String,
    pub login: String,
    pub password: String,
    pub login_field: String,
    pub password_field: String,
    pub max_pages: usize,
}

pub struct MeasureClient {
    config: MeasureConfig,
}

impl MeasureClient {
    pub fn new(config: MeasureConfig) -> Result<Self, MeasureError> {
        if config.url.trim().is_empty() {
            return Err(MeasureError::Config("MEASURE_URL is empty".to_string()));
        }
        if config.login.is_empty() || config.password.is_empty() {
            return Err(MeasureError::Config("MEASURE_LOGIN and MEASURE_PASSWORD are required".to_string()));
        }
        Ok(MeasureClient { config })
    }

    fn fetch(agent: &ureq::Agent, url: &str) -> Result<(String, String), MeasureError> {
        let mut resp = agent.get(url).call().map_err(|e| map_ureq(e, url))?;
        let final_url = resp.get_uri().to_string();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| MeasureError::Transport(e.to_string()))?;
        Ok((final_url, body))
    }

    fn sign_in(&self, agent: &ureq::Agent) -> Result<String, MeasureError> {
        let (login_url, login_page) = Self::fetch(agent, &self.config.url)?;
        let params = login_form_params(&login_page, &self.config)?;
        debug!("Posting portal login form with {} field(s) to {}", params.len(), login_url);
        let mut resp = agent
            .post(&login_url)
            .send_form(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(|e| map_ureq(e, &login_url))?;
        resp.body_mut()
            .read_to_string()
            .map_err(|e| MeasureError::Transport(e.to_string()))
    }
}

impl Thermometers for MeasureClient {
    fn read_all(&self) -> Result<Vec<DeviceReading>, MeasureError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .build()
            .into();

        let mut page = self.sign_in(&agent)?;
        let mut visited = HashSet::new();
        let mut readings = Vec::new();
        let mut pages = 1;
        loop {
            let found = readings_from_page(&page, Utc::now().timestamp());
            debug!("Portal page {}: {} reading(s)", pages, found.len());
            readings.extend(found);

            let Some(href) = next_page_href(&page) else {
                break;
            };
            if !visited.insert(href.clone()) {
                warn!("Portal pagination revisits {}; stopping", href);
                break;
            }
            if pages >= self.config.max_pages {
                warn!("Portal pagination stopped after {} pages", pages);
                break;
            }
            let next_url = join_url(&self.config.url, &href);
            page = Self::fetch(&agent, &next_url)?.1;
            pages += 1;
        }

        info!("Read {} thermometer reading(s) from {} portal page(s)", readings.len(), pages);
        Ok(readings)
    }
}

fn map_ureq(e: ureq::Error, url: &str) -> MeasureError {
    match e {
        ureq::Error::StatusCode(status) => MeasureError::Http {
            status,
            url: url.to_string(),
        },
        other => MeasureError::Transport(other.to_string()),
    }
}

static INPUT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("invalid regex"));
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(name|value|type)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("invalid regex")
});
static ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("invalid regex"));
static CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("invalid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("invalid regex"));
static NEXT_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<li\b[^>]*class\s*=\s*["'][^"']*\bnext\b[^"']*["'][^>]*>(.*?)</li>"#).expect("invalid regex")
});
static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("invalid regex"));

/// Named `<input>` fields of the login page with credentials filled in.
fn login_form_params(html: &str, config: &MeasureConfig) -> Result<Vec<(String, String)>, MeasureError> {
    let mut params = Vec::new();
    let mut has_login = false;
    let mut has_password = false;
    for input in INPUT.find_iter(html) {
        let mut name = None;
        let mut value = String::new();
        let mut kind = String::new();
        for caps in ATTRIBUTE.captures_iter(input.as_str()) {
            let text = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or_default();
            match caps[1].to_ascii_lowercase().as_str() {
                "name" => name = Some(text.to_string()),
                "value" => value = decode_entities(text),
                _ => kind = text.to_ascii_lowercase(),
            }
        }
        let Some(name) = name else { continue };
        if kind == "submit" || kind == "button" {
            continue;
        }
        if name == config.login_field {
            has_login = true;
            value = config.login.clone();
        } else if name == config.password_field {
            has_password = true;
            value = config.password.clone();
        }
        params.push((name, value));
    }

    if !has_login || !has_password {
        return Err(MeasureError::Login(format!(
            "login form without {:?}/{:?} fields",
            config.login_field, config.password_field
        )));
    }
    Ok(params)
}

fn table_rows(html: &str) -> Vec<Vec<String>> {
    ROW.captures_iter(html)
        .map(|row| {
            CELL.captures_iter(&row[1])
                .map(|cell| decode_entities(TAG.replace_all(&cell[1], "").trim()))
                .collect()
        })
        .collect()
}

/// Measurement rows have exactly seven cells: two unused, then name, group,
/// value, device time and device id.
fn readings_from_page(html: &str, fetched_at: i64) -> Vec<DeviceReading> {
    table_rows(html)
        .into_iter()
        .filter_map(|row| match <[String; 7]>::try_from(row) {
            Ok([_, _, name, group, value, device_time, id]) => Some(DeviceReading {
                device_id: id,
                device_name: name,
                device_group: group,
                temperature: value,
                measured_at: device_time,
                fetched_at,
            }),
            Err(_) => None,
        })
        .collect()
}

fn next_page_href(html: &str) -> Option<String> {
    let item = NEXT_ITEM.captures_iter(html).last()?;
    let href = HREF.captures_iter(&item[1]).last()?;
    let link = href.get(1).or_else(|| href.get(2))?.as_str();
    Some(decode_entities(link))
}

fn join_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}{}", base, href)
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&deg;", "°")
        .replace("&#176;", "°")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
