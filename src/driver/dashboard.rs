//! Dashboard automation: sign-in, container table reading, setpoint commands.

use chrono::Utc;
use log::{info, warn};
use std::thread;
use std::time::Duration;

use super::webdriver::{Locator, Session, WebDriverConfig};
use super::{parse_check_rows, setpoint_action, ContainerDriver, DriverCheck, DriverError, SetpointAction};
use crate::temperature::Temperature;

const NAME_LABELS: &str = "span.emerson-menu-cursor.emerson-container-item-label";
const VALUE_TABLE: &str = "table.k-selectable";
const VISIBLE_GRID_CELLS: &str = "//td[@role='gridcell' and not(@style='display:none')]";
const PRIMARY_BUTTON: &str = "button.btn.btn-primary";
const EXECUTE_BUTTONS: &str = "a.k-grid-executeCommand.k-button";
const CANCEL_BUTTONS: &str = "a.k-grid-cancelCommand.k-button";
const SETPOINT_COMMAND_INDEX: usize = 2;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub url: String,
    pub login: String,
    pub password: String,
    pub webdriver: WebDriverConfig,
    /// Read attempts for the container table.
    pub table_retries: u32,
    /// Cancel the setpoint dialog instead of executing it.
    pub dry_run: bool,
}

pub struct DashboardDriver {
    config: DashboardConfig,
}

impl DashboardDriver {
    pub fn new(config: DashboardConfig) -> Result<Self, DriverError> {
        if config.url.trim().is_empty() {
            return Err(DriverError::Config("CONTROL_URL is empty".to_string()));
        }
        if config.login.is_empty() || config.password.is_empty() {
            return Err(DriverError::Config("CONTROL_LOGIN and CONTROL_PASSWORD are required".to_string()));
        }
        if config.dry_run {
            warn!("Dashboard driver in dry-run mode: setpoint dialogs will be cancelled");
        }
        Ok(DashboardDriver { config })
    }

    fn signed_in_session(&self) -> Result<Session, DriverError> {
        let session = Session::start(&self.config.webdriver)?;
        info!("Signing in to the container dashboard");
        session.goto(&self.config.url)?;
        let sign_in = session.wait_visible(&Locator::css(PRIMARY_BUTTON))?;
        fill_input(&session, "Username", &self.config.login)?;
        fill_input(&session, "Password", &self.config.password)?;
        session.click(&sign_in)?;
        dismiss_password_reminder(&session)?;
        Ok(session)
    }

    fn read_table(&self, session: &Session) -> Result<Vec<DriverCheck>, DriverError> {
        let name_locator = Locator::css(NAME_LABELS);
        session.wait_visible(&name_locator)?;
        let names = session
            .find_all(&name_locator)?
            .iter()
            .map(|el| session.text(el).map(|t| t.trim().to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        if session.find_all(&Locator::css(VALUE_TABLE))?.is_empty() {
            return Err(DriverError::Layout("container value table not found".to_string()));
        }
        let cells = session
            .find_all(&Locator::xpath(VISIBLE_GRID_CELLS))?
            .iter()
            .map(|el| session.text(el))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = parse_check_rows(&names, &cells, Utc::now().timestamp())?;
        info!("Read {} container row(s) from the dashboard", rows.len());
        Ok(rows)
    }

    fn read_table_with_retry(&self, session: &Session) -> Result<Vec<DriverCheck>, DriverError> {
        let attempts = self.config.table_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.read_table(session) {
                Err(e) if e.is_timeout() && attempt < attempts => {
                    let backoff = Duration::from_millis(500 * u64::from(attempt));
                    warn!(
                        "Container table not ready (attempt {}/{}): {}; waiting {:.1}s",
                        attempt,
                        attempts,
                        e,
                        backoff.as_secs_f32()
                    );
                    thread::sleep(backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn run_setpoint_sequence(&self, session: &Session, container: &str, target: Temperature) -> Result<(), DriverError> {
        info!("Setting {} °C on container {}", target, container);
        open_container_commands(session, container)?;
        wait_for_commands_menu(session);
        cancel_pending_command(session)?;

        match session.find(&Locator::xpath("//*[contains(text(), 'Awaiting confirmation')]")) {
            Ok(_) => {
                info!("Container {}: previous command awaits confirmation; not sending a new one", container);
                return Ok(());
            }
            Err(e) if e.is_no_such_element() => {}
            Err(e) => return Err(e),
        }

        let execute_buttons = session.find_all(&Locator::css(EXECUTE_BUTTONS))?;
        let open_modal = execute_buttons.get(SETPOINT_COMMAND_INDEX).ok_or_else(|| {
            DriverError::Layout(format!("{} command buttons, setpoint command missing", execute_buttons.len()))
        })?;
        session.click(open_modal)?;
        fill_input(session, "Set point", &target.to_string())?;

        if self.config.dry_run {
            let dialog = session.find(&Locator::id("commandsDialog"))?;
            let cancel = session.find_in(&dialog, &Locator::css("button.btn.btn-default"))?;
            warn!("Dry run: cancelling setpoint dialog for container {}", container);
            session.click(&cancel)?;
        } else {
            session.click_when_ready(&Locator::id("temperatureSetpointExecuteBtn"))?;
            info!("Setpoint command executed for container {}", container);
            thread::sleep(short_pause(session));
        }
        Ok(())
    }
}

impl ContainerDriver for DashboardDriver {
    fn read_checks(&self) -> Result<Vec<DriverCheck>, DriverError> {
        let session = self.signed_in_session()?;
        self.read_table_with_retry(&session)
    }

    fn set_and_check(&self, container: &str, target: Temperature) -> Result<Vec<DriverCheck>, DriverError> {
        let session = self.signed_in_session()?;
        let rows = self.read_table_with_retry(&session)?;
        let row = rows
            .iter()
            .find(|r| r.name == container)
            .ok_or_else(|| DriverError::UnknownContainer(container.to_string()))?;
        info!(
            "Container {}: power {}, setpoint {:?}, logged {}, requested {}",
            container, row.power, row.setpoint, row.logged, target
        );

        match setpoint_action(row, target)? {
            SetpointAction::Apply => match self.run_setpoint_sequence(&session, container, target) {
                Err(e) if e.is_not_interactable() => warn!("Setpoint controls unavailable for {}: {}", container, e),
                other => other?,
            },
            SetpointAction::AlreadyApplied => info!("Container {} already holds {}", container, target),
            SetpointAction::Unavailable => {}
        }
        Ok(rows)
    }
}

fn fill_input(session: &Session, placeholder: &str, value: &str) -> Result<(), DriverError> {
    let input = session.click_when_ready(&Locator::xpath(format!("//input[@placeholder='{}']", placeholder)))?;
    session.send_keys(&input, value)
}

fn dismiss_password_reminder(session: &Session) -> Result<(), DriverError> {
    match session.find(&Locator::id("btn_notnow")) {
        Ok(button) => {
            warn!("Dashboard asks for a password refresh; dismissing");
            session.click(&button)
        }
        Err(e) if e.is_no_such_element() => Ok(()),
        Err(e) => Err(e),
    }
}

fn open_container_commands(session: &Session, container: &str) -> Result<(), DriverError> {
    session.click_when_ready(&Locator::xpath(format!("//*[contains(text(), '{}')]", container)))?;
    session.click_when_ready(&Locator::css("div.k-icon.k-collapse-prev"))?;
    session.click_when_ready(&Locator::partial_link_text("Commands"))?;
    Ok(())
}

fn cancel_pending_command(session: &Session) -> Result<(), DriverError> {
    let grid = session.find(&Locator::id("container-grid-detail-commands"))?;
    let mut visible = Vec::new();
    for button in session.find_all_in(&grid, &Locator::css(CANCEL_BUTTONS))? {
        if session.is_displayed(&button)? {
            visible.push(button);
        }
    }
    let Some(cancel) = visible.pop() else {
        return Ok(());
    };

    info!("Cancelling the pending container command");
    session.click(&cancel)?;
    thread::sleep(short_pause(session));
    let dialog = session.wait_visible(&Locator::id("confirmationDialog"))?;
    let ok = session.find_in(&dialog, &Locator::css(PRIMARY_BUTTON))?;
    session.click(&ok)?;
    wait_for_commands_menu(session);
    Ok(())
}

// The command grid reloads without a usable loading marker.
fn wait_for_commands_menu(session: &Session) {
    let pause = session.wait_time().mul_f32(1.2);
    info!("Waiting {:.1}s for the commands menu", pause.as_secs_f32());
    thread::sleep(pause);
}

fn short_pause(session: &Session) -> Duration {
    (session.wait_time() / 5).max(Duration::from_millis(500))
}
