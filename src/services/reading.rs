//! Thermometer readings for a task: scrape, store, interpret.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use uuid::Uuid;

use super::runtime::{is_fresh, ProcessError, Runtime};
use crate::db::models::{Reading, TaskRead};
use crate::temperature::Temperature;

const PORTAL_TIME_FORMAT: &str = "%d/%m/%y %H:%M:%S";

/// A stored reading with its value and measurement time interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingValue {
    pub id: String,
    pub thermometer: String,
    pub temperature: Temperature,
    pub measured_at: DateTime<Utc>,
    pub db_time: i64,
}

/// Reads the portal, stores the readings of the task's thermometers and
/// returns them interpreted.
pub fn collect(rt: &mut Runtime, task_id: &str) -> Result<Vec<ReadingValue>, ProcessError> {
    let Some(container) = rt.store.task_container(task_id)? else {
        warn!("Task {} has no container; no readings collected", task_id);
        return Ok(Vec::new());
    };
    let relevant = rt.store.container_thermometer_ids(&container)?;
    if relevant.is_empty() {
        warn!("Container {} has no thermometers assigned", container);
    }

    let db_time = rt.timestamp();
    let rows: Vec<Reading> = rt
        .thermometers
        .read_all()?
        .into_iter()
        .filter(|r| relevant.contains(&r.device_id))
        .map(|r| Reading {
            id: Uuid::new_v4().to_string(),
            thermometer: r.device_id,
            temperature: r.temperature,
            read_time: r.measured_at,
            db_time,
        })
        .collect();
    let pairs: Vec<TaskRead> = rows
        .iter()
        .map(|r| TaskRead {
            task_id: task_id.to_string(),
            read_id: r.id.clone(),
        })
        .collect();

    rt.store.insert_readings(&rows)?;
    rt.store.insert_task_reads(&pairs)?;
    info!("Task {}: stored {} reading(s) for container {}", task_id, rows.len(), container);

    Ok(interpret_all(&rows, rt.policy.timezone))
}

/// Every reading stored for a task so far.
pub fn task_readings(rt: &mut Runtime, task_id: &str) -> Result<Vec<ReadingValue>, ProcessError> {
    let rows = rt.store.task_readings(task_id)?;
    Ok(interpret_all(&rows, rt.policy.timezone))
}

fn interpret_all(rows: &[Reading], tz: Tz) -> Vec<ReadingValue> {
    rows.iter()
        .filter_map(|r| match transform(r, tz) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Skipping reading {} of {}: {}", r.id, r.thermometer, e);
                None
            }
        })
        .collect()
}

/// Interprets the portal's text: local device time in `tz`, value with a
/// two-character unit suffix.
pub fn transform(reading: &Reading, tz: Tz) -> Result<ReadingValue, String> {
    let naive = NaiveDateTime::parse_from_str(reading.read_time.trim(), PORTAL_TIME_FORMAT)
        .map_err(|e| format!("bad measurement time {:?}: {}", reading.read_time, e))?;
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("measurement time {:?} does not exist in {}", reading.read_time, tz))?;

    let text = reading.temperature.trim();
    let value = text
        .char_indices()
        .rev()
        .nth(1)
        .map(|(i, _)| &text[..i])
        .ok_or_else(|| format!("temperature {:?} too short", reading.temperature))?;
    let temperature = value
        .parse::<Temperature>()
        .map_err(|e| format!("temperature {:?}: {}", reading.temperature, e))?;

    Ok(ReadingValue {
        id: reading.id.clone(),
        thermometer: reading.thermometer.clone(),
        temperature,
        measured_at: local.with_timezone(&Utc),
        db_time: reading.db_time,
    })
}

/// Temperatures measured within the last `minutes`.
pub fn fresh_temperatures(readings: &[ReadingValue], now: DateTime<Utc>, minutes: i64) -> Vec<Temperature> {
    readings
        .iter()
        .filter(|r| is_fresh(r.measured_at.timestamp(), now, minutes))
        .map(|r| r.temperature)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ContainerThermometer, Task};
    use crate::testing::*;

    fn stored(temperature: &str, read_time: &str) -> Reading {
        Reading {
            id: "r1".into(),
            thermometer: "dev-1".into(),
            temperature: temperature.into(),
            read_time: read_time.into(),
            db_time: 0,
        }
    }

    fn task() -> Task {
        Task {
            id: "task-1".into(),
            start: noon().timestamp(),
            duration: 3600,
            t_start: 5.into(),
            t_min: 2.into(),
            t_max: 8.into(),
            t_freeze: (-18).into(),
            status: "running".into(),
        }
    }

    #[test]
    fn transform_localizes_to_portal_zone() {
        let v = transform(&stored("21.5°C", "04/11/24 12:50:00"), chrono_tz::Europe::Berlin).unwrap();
        assert_eq!(v.temperature.to_string(), "21.5");
        assert_eq!(v.measured_at, Utc.with_ymd_and_hms(2024, 11, 4, 11, 50, 0).unwrap());

        let summer = transform(&stored("-3.0°C", "01/07/24 10:00:00"), chrono_tz::Europe::Berlin).unwrap();
        assert_eq!(summer.measured_at, Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap());
        assert_eq!(summer.temperature, Temperature::from(-3));
    }

    #[test]
    fn transform_rejects_garbage() {
        let tz = chrono_tz::Europe::Berlin;
        assert!(transform(&stored("21.5°C", "2024-11-04 12:00"), tz).is_err());
        assert!(transform(&stored("C", "04/11/24 12:50:00"), tz).is_err());
        assert!(transform(&stored("n/a°C", "04/11/24 12:50:00"), tz).is_err());
        // spring-forward gap
        assert!(transform(&stored("1.0°C", "31/03/24 02:30:00"), tz).is_err());
    }

    #[test]
    fn ambiguous_local_time_takes_earliest_instant() {
        let v = transform(&stored("1.0°C", "27/10/24 02:30:00"), chrono_tz::Europe::Berlin).unwrap();
        assert_eq!(v.measured_at, Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap());
    }

    #[test]
    fn collect_keeps_only_the_task_thermometers() {
        let mut store = MemoryStore::with_task(task(), "C1");
        store.container_thermometers.push(ContainerThermometer {
            container_id: "C1".into(),
            thermometer_id: "dev-1".into(),
        });
        let driver = FakeDriver::new(Vec::new());
        let thermometers = FakeThermometers::with(vec![
            device_reading("dev-1", "7.5°C", "04/11/24 12:50:00"),
            device_reading("dev-2", "9.0°C", "04/11/24 12:50:00"),
            device_reading("dev-1", "broken", "04/11/24 12:55:00"),
        ]);

        let values = {
            let mut rt = runtime(&mut store, &driver, &thermometers, noon());
            collect(&mut rt, "task-1").unwrap()
        };

        assert_eq!(values.len(), 1);
        assert_eq!(values[0].temperature.to_string(), "7.5");
        assert_eq!(store.readings.len(), 2);
        assert_eq!(store.readings[1].temperature, "broken");
        assert_eq!(store.task_reads.len(), 2);
        assert!(store.task_reads.iter().all(|p| p.task_id == "task-1"));
    }

    #[test]
    fn portal_failures_propagate() {
        let mut store = MemoryStore::with_task(task(), "C1");
        let driver = FakeDriver::new(Vec::new());
        let thermometers = FakeThermometers {
            readings: Vec::new(),
            unavailable: true,
        };
        let mut rt = runtime(&mut store, &driver, &thermometers, noon());
        assert!(matches!(collect(&mut rt, "task-1"), Err(ProcessError::Measure(_))));
    }

    #[test]
    fn freshness_window_is_exclusive() {
        let at = |minutes_ago: i64| ReadingValue {
            id: String::new(),
            thermometer: String::new(),
            temperature: Temperature::from(minutes_ago as i32),
            measured_at: noon() - chrono::Duration::minutes(minutes_ago),
            db_time: 0,
        };
        let fresh = fresh_temperatures(&[at(10), at(34), at(35), at(60)], noon(), 35);
        assert_eq!(fresh, vec![Temperature::from(10), Temperature::from(34)]);
    }
}
