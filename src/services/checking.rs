//! Dashboard checks: what the container controllers currently hold.

use chrono::{DateTime, Utc};
use log::info;
use uuid::Uuid;

use super::runtime::{is_fresh, ProcessError, Runtime};
use crate::db::models::Check;
use crate::db::store::Store;
use crate::driver::DriverCheck;
use crate::temperature::Temperature;

/// Reads every dashboard row and stores it.
pub fn collect_all(rt: &mut Runtime) -> Result<Vec<Check>, ProcessError> {
    let rows = rt.driver.read_checks()?;
    save_driver_checks(rt.store, &rows)
}

pub fn save_driver_checks(store: &mut dyn Store, rows: &[DriverCheck]) -> Result<Vec<Check>, ProcessError> {
    let checks: Vec<Check> = rows
        .iter()
        .map(|r| Check {
            id: Uuid::new_v4().to_string(),
            container: r.name.clone(),
            timestamp: r.fetched_at,
            logged: r.logged.clone(),
            received: r.received.clone(),
            power: r.power.clone(),
            read_setpoint: r.setpoint.trim().to_string(),
        })
        .collect();
    let inserted = store.insert_checks(&checks)?;
    info!("Stored {} container check(s)", inserted);
    Ok(checks)
}

/// Checks of one container, newest first.
pub fn container_checks(store: &mut dyn Store, container: &str) -> Result<Vec<Check>, ProcessError> {
    Ok(store.container_checks(container)?)
}

/// Observed setpoint of the newest check, if that check is recent and shows one.
pub fn recent_setpoint(checks: &[Check], now: DateTime<Utc>, minutes: i64) -> Option<Temperature> {
    let newest = checks.iter().max_by_key(|c| c.timestamp)?;
    if !is_fresh(newest.timestamp, now, minutes) {
        return None;
    }
    newest.observed_setpoint()
}
