//! Pushing a setpoint to a container and recording the outcome.

use log::info;

use super::checking::save_driver_checks;
use super::controlling::{record, ControlLink};
use super::runtime::{ProcessError, Runtime};
use crate::db::models::Check;
use crate::temperature::Temperature;

/// Asks the dashboard for `target`, stores the rows it read and records the
/// control. Returns the stored checks.
pub fn apply(rt: &mut Runtime, container: &str, target: Temperature, link: ControlLink) -> Result<Vec<Check>, ProcessError> {
    info!("Driving container {} to {} for {:?}", container, target, link);
    let rows = rt.driver.set_and_check(container, target)?;
    let checks = save_driver_checks(rt.store, &rows)?;
    record(rt.store, rt.now, target, link)?;
    Ok(checks)
}
