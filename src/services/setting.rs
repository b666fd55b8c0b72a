//! One-shot setpoint requests.

use log::{info, warn};

use super::controlling::ControlLink;
use super::driving;
use super::runtime::{ProcessError, Runtime};
use crate::db::models::SettingStatus;
use crate::temperature::Temperature;

/// Runs one step of a setting. The setting ends once the dashboard shows the
/// requested setpoint; until then the scheduler keeps invoking it.
pub fn run_setting(rt: &mut Runtime, set_id: &str) -> Result<(), ProcessError> {
    let Some(setting) = rt.store.setting(set_id)? else {
        warn!("Setting {} not found", set_id);
        return Ok(());
    };

    match setting.status() {
        Some(SettingStatus::Cancelled) => {
            info!("Setting {} was cancelled; ending it", set_id);
            rt.store.update_setting_status(set_id, SettingStatus::Ended)?;
        }
        Some(SettingStatus::Running) => {
            let Some(container) = rt.store.setting_container(set_id)? else {
                warn!("Setting {} has no container", set_id);
                return Ok(());
            };
            let target = Temperature::from(setting.temperature);
            let checks = driving::apply(rt, &container, target, ControlLink::Setting(set_id))?;
            let observed = checks
                .iter()
                .filter(|c| c.container == container)
                .find_map(|c| c.observed_setpoint());
            if observed == Some(target) {
                info!("Setting {}: container {} holds {}", set_id, container, target);
                rt.store.update_setting_status(set_id, SettingStatus::Ended)?;
            } else {
                info!(
                    "Setting {}: container {} shows {:?}, requested {}; still running",
                    set_id,
                    container,
                    observed.map(|t| t.to_string()),
                    target
                );
            }
        }
        other => info!("Setting {} is {}; nothing to do", set_id, other.map_or(setting.status.as_str(), |s| s.as_str())),
    }
    Ok(())
}
