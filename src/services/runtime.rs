//! Shared handles and the error type of the control processes.

use chrono::{DateTime, Utc};
use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::config::ControlPolicy;
use crate::db::store::{Store, StoreError};
use crate::driver::{ContainerDriver, DriverError};
use crate::measure::{MeasureError, Thermometers};
use crate::temperature::TemperatureError;

/// Everything a process needs for one invocation. `now` is fixed at startup so
/// every freshness window in a run is measured from the same instant.
pub struct Runtime<'a> {
    pub store: &'a mut dyn Store,
    pub driver: &'a dyn ContainerDriver,
    pub thermometers: &'a dyn Thermometers,
    pub policy: ControlPolicy,
    pub now: DateTime<Utc>,
}

impl Runtime<'_> {
    pub fn timestamp(&self) -> i64 {
        self.now.timestamp()
    }
}

/// Whether a unix timestamp lies strictly inside the `minutes` before `now`.
pub fn is_fresh(timestamp: i64, now: DateTime<Utc>, minutes: i64) -> bool {
    timestamp > now.timestamp() - minutes * 60
}

#[derive(Debug)]
pub enum ProcessError {
    Temperature(TemperatureError),
    /// The container refused the command.
    DriverExecute(String),
    Driver(DriverError),
    Measure(MeasureError),
    StuckSetting(String),
    /// The task ran past its final phase.
    Overrun(String),
    Store(StoreError),
}

impl ProcessError {
    /// Errors that move a task to the `error` status instead of failing the invocation.
    pub fn is_fatal_for_task(&self) -> bool {
        matches!(
            self,
            ProcessError::DriverExecute(_) | ProcessError::StuckSetting(_) | ProcessError::Overrun(_)
        )
    }
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Temperature(e) => write!(f, "invalid temperature: {}", e),
            ProcessError::DriverExecute(s) => write!(f, "driver execution error: {}", s),
            ProcessError::Driver(e) => write!(f, "driver error: {}", e),
            ProcessError::Measure(e) => write!(f, "measurement error: {}", e),
            ProcessError::StuckSetting(s) => write!(f, "stuck setting: {}", s),
            ProcessError::Overrun(s) => write!(f, "control loop overrun: {}", s),
            ProcessError::Store(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl Error for ProcessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProcessError::Temperature(e) => Some(e),
            ProcessError::Driver(e) => Some(e),
            ProcessError::Measure(e) => Some(e),
            ProcessError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TemperatureError> for ProcessError {
    fn from(value: TemperatureError) -> Self {
        ProcessError::Temperature(value)
    }
}

impl From<DriverError> for ProcessError {
    fn from(value: DriverError) -> Self {
        match value {
            DriverError::Execute(s) => ProcessError::DriverExecute(s),
            other => ProcessError::Driver(other),
        }
    }
}

impl From<MeasureError> for ProcessError {
    fn from(value: MeasureError) -> Self {
        ProcessError::Measure(value)
    }
}

impl From<StoreError> for ProcessError {
    fn from(value: StoreError) -> Self {
        ProcessError::Store(value)
    }
}
