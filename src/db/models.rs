//! Diesel row structs for the container-control tables.
//!
//! Reading, check and control rows are append-only. Tasks and settings are
//! created by other tools; this crate only rewrites their `status`.

use diesel::prelude::*;
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::schema;
use crate::temperature::Temperature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Ended,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Ended => "ended",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(TaskStatus::Running),
            "ended" => Some(TaskStatus::Ended),
            "error" => Some(TaskStatus::Error),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingStatus {
    Running,
    Ended,
    Cancelled,
}

impl SettingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingStatus::Running => "running",
            SettingStatus::Ended => "ended",
            SettingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SettingStatus::Running),
            "ended" => Some(SettingStatus::Ended),
            "cancelled" => Some(SettingStatus::Cancelled),
            _ => None,
        }
    }
}

impl Display for SettingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::containers)]
pub struct Container {
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::thermometers)]
pub struct Thermometer {
    pub device_id: String,
    pub device_group: String,
    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::container_thermometers)]
pub struct ContainerThermometer {
    pub container_id: String,
    pub thermometer_id: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::container_tasks)]
pub struct ContainerTask {
    pub task_id: String,
    pub container_id: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::container_sets)]
pub struct ContainerSet {
    pub set_id: String,
    pub container_id: String,
}

/// Raw thermometer reading as scraped; `temperature` and `read_time` keep the
/// portal's text (`"21.5°C"`, `"31/12/24 23:59:00"`).
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::readings)]
pub struct Reading {
    pub id: String,
    pub thermometer: String,
    pub temperature: String,
    pub read_time: String,
    pub db_time: i64,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::task_reads)]
pub struct TaskRead {
    pub task_id: String,
    pub read_id: String,
}

/// Controller state observed on the vendor dashboard.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::container_checks)]
pub struct Check {
    pub id: String,
    pub container: String,
    pub timestamp: i64,
    pub logged: String,
    pub received: String,
    pub power: String,
    pub read_setpoint: String,
}

impl Check {
    pub fn has_setpoint(&self) -> bool {
        !self.read_setpoint.trim().is_empty()
    }

    /// The observed setpoint, `None` when the dashboard showed nothing usable.
    pub fn observed_setpoint(&self) -> Option<Temperature> {
        if !self.has_setpoint() {
            return None;
        }
        match self.read_setpoint.parse() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("Check {}: ignoring setpoint {:?}: {}", self.id, self.read_setpoint, e);
                None
            }
        }
    }
}

/// A setpoint this system commanded.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::controls)]
pub struct Control {
    pub id: String,
    pub timestamp: i64,
    pub target_setpoint: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::task_controls)]
pub struct TaskControl {
    pub task_id: String,
    pub control_id: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::set_controls)]
pub struct SetControl {
    pub set_id: String,
    pub control_id: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::tasks)]
pub struct Task {
    pub id: String,
    pub start: i64,
    pub duration: i64,
    pub t_start: Decimal,
    pub t_min: Decimal,
    pub t_max: Decimal,
    pub t_freeze: Decimal,
    pub status: String,
}

impl Task {
    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::settings)]
pub struct Setting {
    pub id: String,
    pub status: String,
    pub temperature: Decimal,
    pub timestamp: i64,
}

impl Setting {
    pub fn status(&self) -> Option<SettingStatus> {
        SettingStatus::parse(&self.status)
    }
}
