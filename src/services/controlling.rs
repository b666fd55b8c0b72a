//! Controls: the setpoints this system asked for.

use chrono::{DateTime, Utc};
use log::info;
use uuid::Uuid;

use super::runtime::{is_fresh, ProcessError};
use crate::db::models::{Control, SetControl, TaskControl};
use crate::db::store::Store;
use crate::temperature::{Temperature, TemperatureError};

/// The task or setting a control was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLink<'a> {
    Task(&'a str),
    Setting(&'a str),
}

pub fn record(
    store: &mut dyn Store,
    now: DateTime<Utc>,
    target: Temperature,
    link: ControlLink,
) -> Result<Control, ProcessError> {
    let control = Control {
        id: Uuid::new_v4().to_string(),
        timestamp: now.timestamp(),
        target_setpoint: target.to_string(),
    };
    store.insert_control(&control)?;
    match link {
        ControlLink::Task(task_id) => store.insert_task_control(&TaskControl {
            task_id: task_id.to_string(),
            control_id: control.id.clone(),
        })?,
        ControlLink::Setting(set_id) => store.insert_set_control(&SetControl {
            set_id: set_id.to_string(),
            control_id: control.id.clone(),
        })?,
    }
    info!("Recorded control {} for {:?}", control.target_setpoint, link);
    Ok(control)
}

/// Controls of a task, newest first.
pub fn recent_controls(store: &mut dyn Store, task_id: &str) -> Result<Vec<Control>, ProcessError> {
    Ok(store.task_controls(task_id)?)
}

/// Setpoint of the newest control when it was issued within the last `minutes`.
pub fn recent_temperature(
    controls: &[Control],
    now: DateTime<Utc>,
    minutes: i64,
) -> Result<Option<Temperature>, TemperatureError> {
    match controls.iter().max_by_key(|c| c.timestamp) {
        Some(c) if is_fresh(c.timestamp, now, minutes) => Ok(Some(c.target_setpoint.parse::<Temperature>()?)),
        _ => Ok(None),
    }
}
