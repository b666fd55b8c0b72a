//! In-memory stand-ins for the database, the dashboard and the portal.

use chrono::{DateTime, TimeZone, Utc};
use std::cell::{Cell, RefCell};

use crate::config::ControlPolicy;
use crate::db::models::*;
use crate::db::store::{Store, StoreError};
use crate::driver::{setpoint_action, ContainerDriver, DriverCheck, DriverError, SetpointAction};
use crate::measure::{DeviceReading, MeasureError, Thermometers};
use crate::services::runtime::Runtime;
use crate::temperature::Temperature;

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 4, 12, 0, 0).unwrap()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub containers: Vec<Container>,
    pub thermometers: Vec<Thermometer>,
    pub container_thermometers: Vec<ContainerThermometer>,
    pub tasks: Vec<Task>,
    pub container_tasks: Vec<ContainerTask>,
    pub settings: Vec<Setting>,
    pub container_sets: Vec<ContainerSet>,
    pub readings: Vec<Reading>,
    pub task_reads: Vec<TaskRead>,
    pub checks: Vec<Check>,
    pub controls: Vec<Control>,
    pub task_controls: Vec<TaskControl>,
    pub set_controls: Vec<SetControl>,
}

impl MemoryStore {
    pub fn with_task(task: Task, container: &str) -> Self {
        let mut store = MemoryStore::default();
        store.container_tasks.push(ContainerTask {
            task_id: task.id.clone(),
            container_id: container.to_string(),
        });
        store.tasks.push(task);
        store
    }

    pub fn with_setting(setting: Setting, container: &str) -> Self {
        let mut store = MemoryStore::default();
        store.container_sets.push(ContainerSet {
            set_id: setting.id.clone(),
            container_id: container.to_string(),
        });
        store.settings.push(setting);
        store
    }

    pub fn push_check(&mut self, container: &str, timestamp: i64, setpoint: &str) {
        let n = self.checks.len();
        self.checks.push(Check {
            id: format!("check-{}", n),
            container: container.to_string(),
            timestamp,
            logged: String::new(),
            received: String::new(),
            power: "On".to_string(),
            read_setpoint: setpoint.to_string(),
        });
    }

    pub fn push_task_control(&mut self, task_id: &str, timestamp: i64, setpoint: &str) {
        let id = format!("control-{}", self.controls.len());
        self.controls.push(Control {
            id: id.clone(),
            timestamp,
            target_setpoint: setpoint.to_string(),
        });
        self.task_controls.push(TaskControl {
            task_id: task_id.to_string(),
            control_id: id,
        });
    }

    pub fn task_status(&self, id: &str) -> Option<String> {
        self.tasks.iter().find(|t| t.id == id).map(|t| t.status.clone())
    }

    pub fn setting_status(&self, id: &str) -> Option<String> {
        self.settings.iter().find(|s| s.id == id).map(|s| s.status.clone())
    }

    /// Target setpoints linked to a task, oldest first.
    pub fn task_targets(&self, task_id: &str) -> Vec<String> {
        self.controls
            .iter()
            .filter(|c| self.task_controls.iter().any(|tc| tc.task_id == task_id && tc.control_id == c.id))
            .map(|c| c.target_setpoint.clone())
            .collect()
    }
}

fn newest_first<T: Clone>(rows: impl DoubleEndedIterator<Item = T>, key: impl Fn(&T) -> i64) -> Vec<T> {
    let mut rows: Vec<T> = rows.rev().collect();
    rows.sort_by_key(|r| std::cmp::Reverse(key(r)));
    rows
}

impl Store for MemoryStore {
    fn task(&mut self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.iter().find(|t| t.id == id).cloned())
    }

    fn setting(&mut self, id: &str) -> Result<Option<Setting>, StoreError> {
        Ok(self.settings.iter().find(|s| s.id == id).cloned())
    }

    fn task_container(&mut self, task_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .container_tasks
            .iter()
            .find(|p| p.task_id == task_id)
            .map(|p| p.container_id.clone()))
    }

    fn setting_container(&mut self, set_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .container_sets
            .iter()
            .find(|p| p.set_id == set_id)
            .map(|p| p.container_id.clone()))
    }

    fn container_thermometer_ids(&mut self, container: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .container_thermometers
            .iter()
            .filter(|p| p.container_id == container)
            .map(|p| p.thermometer_id.clone())
            .collect())
    }

    fn insert_readings(&mut self, rows: &[Reading]) -> Result<usize, StoreError> {
        self.readings.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn insert_task_reads(&mut self, rows: &[TaskRead]) -> Result<usize, StoreError> {
        self.task_reads.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn task_readings(&mut self, task_id: &str) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .readings
            .iter()
            .filter(|r| self.task_reads.iter().any(|p| p.task_id == task_id && p.read_id == r.id))
            .cloned()
            .collect())
    }

    fn insert_checks(&mut self, rows: &[Check]) -> Result<usize, StoreError> {
        self.checks.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn container_checks(&mut self, container: &str) -> Result<Vec<Check>, StoreError> {
        Ok(newest_first(
            self.checks.iter().filter(|c| c.container == container).cloned(),
            |c| c.timestamp,
        ))
    }

    fn insert_control(&mut self, row: &Control) -> Result<(), StoreError> {
        self.controls.push(row.clone());
        Ok(())
    }

    fn insert_task_control(&mut self, row: &TaskControl) -> Result<(), StoreError> {
        self.task_controls.push(row.clone());
        Ok(())
    }

    fn insert_set_control(&mut self, row: &SetControl) -> Result<(), StoreError> {
        self.set_controls.push(row.clone());
        Ok(())
    }

    fn task_controls(&mut self, task_id: &str) -> Result<Vec<Control>, StoreError> {
        let linked = |c: &&Control| self.task_controls.iter().any(|p| p.task_id == task_id && p.control_id == c.id);
        Ok(newest_first(self.controls.iter().filter(linked).cloned(), |c| c.timestamp))
    }

    fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<(), StoreError> {
        if let Some(t) = self.tasks.iter_mut().find(|t| t.id == id) {
            t.status = status.as_str().to_string();
        }
        Ok(())
    }

    fn update_setting_status(&mut self, id: &str, status: SettingStatus) -> Result<(), StoreError> {
        if let Some(s) = self.settings.iter_mut().find(|s| s.id == id) {
            s.status = status.as_str().to_string();
        }
        Ok(())
    }

    fn clear_data_tables(&mut self) -> Result<(), StoreError> {
        self.readings.clear();
        self.task_reads.clear();
        self.checks.clear();
        self.controls.clear();
        self.task_controls.clear();
        self.set_controls.clear();
        self.container_thermometers.clear();
        self.container_tasks.clear();
        self.container_sets.clear();
        self.containers.clear();
        self.thermometers.clear();
        Ok(())
    }

    fn insert_containers(&mut self, rows: &[Container]) -> Result<usize, StoreError> {
        self.containers.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn insert_thermometers(&mut self, rows: &[Thermometer]) -> Result<usize, StoreError> {
        self.thermometers.extend_from_slice(rows);
        Ok(rows.len())
    }
}

/// Dashboard with one row per container. Accepted commands show up on the
/// next read, like the real controller.
pub struct FakeDriver {
    pub rows: RefCell<Vec<DriverCheck>>,
    pub commands: RefCell<Vec<(String, Temperature)>>,
    pub accepts: Cell<bool>,
}

impl FakeDriver {
    pub fn new(rows: Vec<DriverCheck>) -> Self {
        FakeDriver {
            rows: RefCell::new(rows),
            commands: RefCell::new(Vec::new()),
            accepts: Cell::new(true),
        }
    }

    pub fn single(container: &str, power: &str, setpoint: &str, fetched_at: i64) -> Self {
        FakeDriver::new(vec![row(container, power, setpoint, fetched_at)])
    }

    pub fn commanded(&self) -> Vec<String> {
        self.commands.borrow().iter().map(|(_, t)| t.to_string()).collect()
    }

    pub fn set_setpoint(&self, container: &str, setpoint: &str) {
        for r in self.rows.borrow_mut().iter_mut().filter(|r| r.name == container) {
            r.setpoint = setpoint.to_string();
        }
    }
}

pub fn row(container: &str, power: &str, setpoint: &str, fetched_at: i64) -> DriverCheck {
    DriverCheck {
        name: container.to_string(),
        logged: "04/11/24 11:58".to_string(),
        received: "04/11/24 11:59".to_string(),
        power: power.to_string(),
        setpoint: setpoint.to_string(),
        fetched_at,
    }
}

impl ContainerDriver for FakeDriver {
    fn read_checks(&self) -> Result<Vec<DriverCheck>, DriverError> {
        Ok(self.rows.borrow().clone())
    }

    fn set_and_check(&self, container: &str, target: Temperature) -> Result<Vec<DriverCheck>, DriverError> {
        let rows = self.rows.borrow().clone();
        let current = rows
            .iter()
            .find(|r| r.name == container)
            .ok_or_else(|| DriverError::UnknownContainer(container.to_string()))?;
        if setpoint_action(current, target)? == SetpointAction::Apply {
            self.commands.borrow_mut().push((container.to_string(), target));
            if self.accepts.get() {
                self.set_setpoint(container, &target.to_string());
            }
        }
        Ok(rows)
    }
}

#[derive(Default)]
pub struct FakeThermometers {
    pub readings: Vec<DeviceReading>,
    pub unavailable: bool,
}

impl FakeThermometers {
    pub fn with(readings: Vec<DeviceReading>) -> Self {
        FakeThermometers {
            readings,
            unavailable: false,
        }
    }
}

pub fn device_reading(device_id: &str, temperature: &str, measured_at: &str) -> DeviceReading {
    DeviceReading {
        device_id: device_id.to_string(),
        device_name: format!("Probe {}", device_id),
        device_group: "Hall".to_string(),
        temperature: temperature.to_string(),
        measured_at: measured_at.to_string(),
        fetched_at: noon().timestamp(),
    }
}

impl Thermometers for FakeThermometers {
    fn read_all(&self) -> Result<Vec<DeviceReading>, MeasureError> {
        if self.unavailable {
            return Err(MeasureError::Transport("portal unreachable".to_string()));
        }
        Ok(self.readings.clone())
    }
}

pub fn runtime<'a>(
    store: &'a mut MemoryStore,
    driver: &'a FakeDriver,
    thermometers: &'a FakeThermometers,
    now: DateTime<Utc>,
) -> Runtime<'a> {
    Runtime {
        store,
        driver,
        thermometers,
        policy: ControlPolicy::default(),
        now,
    }
}
