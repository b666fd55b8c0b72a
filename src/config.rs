//! Runtime configuration from the environment.
//! Adapter settings are only validated when the adapter is built.

use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;

use crate::db::store::ConnectRetry;
use crate::driver::dashboard::DashboardConfig;
use crate::driver::webdriver::WebDriverConfig;
use crate::measure::MeasureConfig;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Berlin;

/// Tuning of the control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPolicy {
    pub check_freshness_minutes: i64,
    pub control_freshness_minutes: i64,
    /// Portal interval (30 minutes) plus slack.
    pub reading_freshness_minutes: i64,
    /// Checks without a setpoint, or repeated identical controls, tolerated before a setting counts as stuck.
    pub setting_retry_limit: usize,
    pub cooling_delta: i32,
    pub timezone: Tz,
}

impl Default for ControlPolicy {
    fn default() -> Self {
        ControlPolicy {
            check_freshness_minutes: 60,
            control_freshness_minutes: 60,
            reading_freshness_minutes: 35,
            setting_retry_limit: 5,
            cooling_delta: 5,
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_retry: ConnectRetry,
    /// Clear-text first key; events carry its SHA-256 hex digest.
    pub key_1: String,
    pub key_2: String,
    pub control_url: String,
    pub control_login: String,
    pub control_password: String,
    pub webdriver_url: String,
    pub chrome_binary: Option<String>,
    pub driver_wait: Duration,
    pub driver_dry_run: bool,
    pub table_read_retries: u32,
    pub measure_url: String,
    pub measure_login: String,
    pub measure_password: String,
    pub measure_login_field: String,
    pub measure_password_field: String,
    pub measure_max_pages: usize,
    pub policy: ControlPolicy,
}

fn required(name: &str) -> Result<String, String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(format!("Missing required environment variable {}", name)),
    }
}

fn optional(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn or_default(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} has an invalid value: {:?}", name, v)),
        _ => Ok(default),
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let defaults = ControlPolicy::default();
        let timezone = match std::env::var("MEASURE_TIMEZONE") {
            Ok(v) if !v.trim().is_empty() => v
                .trim()
                .parse::<Tz>()
                .map_err(|_| format!("MEASURE_TIMEZONE is not a known time zone: {:?}", v))?,
            _ => defaults.timezone,
        };

        let policy = ControlPolicy {
            check_freshness_minutes: parsed("CHECK_FRESHNESS_MINUTES", defaults.check_freshness_minutes)?,
            control_freshness_minutes: parsed("CONTROL_FRESHNESS_MINUTES", defaults.control_freshness_minutes)?,
            reading_freshness_minutes: parsed("READING_FRESHNESS_MINUTES", defaults.reading_freshness_minutes)?,
            setting_retry_limit: parsed("SETTING_RETRY_LIMIT", defaults.setting_retry_limit)?,
            cooling_delta: parsed("COOLING_DELTA", defaults.cooling_delta)?,
            timezone,
        };
        if policy.setting_retry_limit == 0 {
            return Err("SETTING_RETRY_LIMIT must be at least 1".to_string());
        }

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            db_retry: ConnectRetry {
                attempts: parsed("DB_CONNECT_RETRIES", 10u32)?.max(1),
                backoff: Duration::from_secs(parsed("DB_CONNECT_BACKOFF_SECS", 3u64)?),
            },
            key_1: required("KEY_1")?,
            key_2: required("KEY_2")?,
            control_url: optional("CONTROL_URL"),
            control_login: optional("CONTROL_LOGIN"),
            control_password: optional("CONTROL_PASSWORD"),
            webdriver_url: or_default("WEBDRIVER_URL", DEFAULT_WEBDRIVER_URL),
            chrome_binary: std::env::var("CHROME_BINARY").ok().filter(|s| !s.trim().is_empty()),
            driver_wait: Duration::from_secs(parsed("DRIVER_WAIT_SECS", 5u64)?),
            driver_dry_run: std::env::var("DRIVER_DRY_RUN").map(|v| parse_flag(&v)).unwrap_or(false),
            table_read_retries: parsed("TABLE_READ_RETRIES", 5u32)?,
            measure_url: optional("MEASURE_URL"),
            measure_login: optional("MEASURE_LOGIN"),
            measure_password: optional("MEASURE_PASSWORD"),
            measure_login_field: or_default("MEASURE_LOGIN_FIELD", "login"),
            measure_password_field: or_default("MEASURE_PASSWORD_FIELD", "password"),
            measure_max_pages: parsed("MEASURE_MAX_PAGES", 50usize)?.max(1),
            policy,
        })
    }

    pub fn dashboard(&self) -> DashboardConfig {
        DashboardConfig {
            url: self.control_url.clone(),
            login: self.control_login.clone(),
            password: self.control_password.clone(),
            webdriver: WebDriverConfig {
                endpoint: self.webdriver_url.clone(),
                chrome_binary: self.chrome_binary.clone(),
                wait: self.driver_wait,
            },
            table_retries: self.table_read_retries,
            dry_run: self.driver_dry_run,
        }
    }

    pub fn measure(&self) -> MeasureConfig {
        MeasureConfig {
            url: self.measure_url.clone(),
            login: self.measure_login.clone(),
            password: self.measure_password.clone(),
            login_field: self.measure_login_field.clone(),
            password_field: self.measure_password_field.clone(),
            max_pages: self.measure_max_pages,
        }
    }
}
