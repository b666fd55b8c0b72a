//! Access to the vendor container dashboard.
//!
//! The control loop talks to [`ContainerDriver`]; [`dashboard::DashboardDriver`]
//! implements it by remote-controlling a browser over the W3C WebDriver protocol.

pub mod dashboard;
pub mod webdriver;

use core::fmt;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::temperature::Temperature;

/// One row of the dashboard's container table, as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCheck {
    pub name: String,
    pub logged: String,
    pub received: String,
    pub power: String,
    pub setpoint: String,
    /// Unix seconds at which the table was read.
    pub fetched_at: i64,
}

#[derive(Debug)]
pub enum DriverError {
    /// The container cannot accept commands (powered off).
    Execute(String),
    /// Error object returned by the WebDriver endpoint.
    WebDriver { error: String, message: String },
    /// An element did not become visible or clickable in time.
    Timeout(String),
    Transport(String),
    /// The dashboard page did not have the expected shape.
    Layout(String),
    UnknownContainer(String),
    Config(String),
}

impl DriverError {
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::WebDriver { error, .. } if error == "no such element")
    }

    pub fn is_not_interactable(&self) -> bool {
        matches!(self, DriverError::WebDriver { error, .. } if error == "element not interactable")
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
            || matches!(self, DriverError::WebDriver { error, .. } if error == "timeout")
    }
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Execute(s) => write!(f, "container rejected command: {}", s),
            DriverError::WebDriver { error, message } => write!(f, "webdriver {}: {}", error, message),
            DriverError::Timeout(s) => write!(f, "timed out waiting for {}", s),
            DriverError::Transport(s) => write!(f, "transport error: {}", s),
            DriverError::Layout(s) => write!(f, "unexpected dashboard layout: {}", s),
            DriverError::UnknownContainer(s) => write!(f, "container {} is not listed on the dashboard", s),
            DriverError::Config(s) => write!(f, "driver configuration error: {}", s),
        }
    }
}

impl Error for DriverError {}

pub trait ContainerDriver {
    /// Signs in and reads every container row.
    fn read_checks(&self) -> Result<Vec<DriverCheck>, DriverError>;

    /// Signs in, reads every container row and, when the observed setpoint of
    /// `container` differs from `target`, runs the setpoint command sequence.
    /// Returns the rows read before the command.
    fn set_and_check(&self, container: &str, target: Temperature) -> Result<Vec<DriverCheck>, DriverError>;
}

/// What to do with a container after comparing its row to the requested setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointAction {
    Apply,
    AlreadyApplied,
    /// The dashboard shows no setpoint; nothing to compare against.
    Unavailable,
}

pub fn setpoint_action(row: &DriverCheck, target: Temperature) -> Result<SetpointAction, DriverError> {
    if row.power.trim() == "Off" {
        return Err(DriverError::Execute(format!("container {} is powered off", row.name)));
    }
    if row.setpoint.trim().is_empty() {
        warn!("Container {}: no setpoint shown on the dashboard", row.name);
        return Ok(SetpointAction::Unavailable);
    }
    match row.setpoint.parse::<Temperature>() {
        Ok(observed) if observed == target => Ok(SetpointAction::AlreadyApplied),
        Ok(_) => Ok(SetpointAction::Apply),
        Err(e) => {
            warn!("Container {}: unreadable setpoint {:?} ({}); applying anyway", row.name, row.setpoint, e);
            Ok(SetpointAction::Apply)
        }
    }
}

// Table cell positions within one container row.
const COL_LOGGED: usize = 0;
const COL_RECEIVED: usize = 1;
const COL_POWER: usize = 3;
const COL_SETPOINT: usize = 5;

/// Pairs container names with the dashboard's grid cells.
///
/// The grid starts with one name cell per container, followed by the value
/// cells of every container row in the same order as `names`.
pub fn parse_check_rows(names: &[String], cells: &[String], fetched_at: i64) -> Result<Vec<DriverCheck>, DriverError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let values = cells.get(names.len()..).ok_or_else(|| {
        DriverError::Layout(format!("{} grid cells for {} containers", cells.len(), names.len()))
    })?;
    let columns = values.len() / names.len();
    if columns <= COL_SETPOINT {
        return Err(DriverError::Layout(format!(
            "{} value cells per container row, expected at least {}",
            columns,
            COL_SETPOINT + 1
        )));
    }

    let rows = names
        .iter()
        .zip(values.chunks(columns))
        .map(|(name, row)| DriverCheck {
            name: name.clone(),
            logged: row[COL_LOGGED].clone(),
            received: row[COL_RECEIVED].clone(),
            power: row[COL_POWER].clone(),
            setpoint: row[COL_SETPOINT].clone(),
            fetched_at,
        })
        .collect();
    Ok(rows)
}
