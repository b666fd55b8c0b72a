//! Storage contract used by the control loop, and its PostgreSQL implementation.
//!
//! The services only see [`Store`]; tests swap in an in-memory implementation.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{info, warn};
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::thread;
use std::time::Duration;

use crate::db::models::{
    Check, Container, Control, Reading, SetControl, Setting, SettingStatus, Task, TaskControl, TaskRead,
    TaskStatus, Thermometer,
};
use crate::schema;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug)]
pub enum StoreError {
    Connect(String),
    Migration(String),
    Query { action: &'static str, source: DieselError },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connect(e) => write!(f, "database connection failed: {}", e),
            StoreError::Migration(e) => write!(f, "applying database migrations failed: {}", e),
            StoreError::Query { action, source } => write!(f, "{} failed: {}", action, source),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Query { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub trait Store {
    fn task(&mut self, id: &str) -> Result<Option<Task>, StoreError>;
    fn setting(&mut self, id: &str) -> Result<Option<Setting>, StoreError>;
    fn task_container(&mut self, task_id: &str) -> Result<Option<String>, StoreError>;
    fn setting_container(&mut self, set_id: &str) -> Result<Option<String>, StoreError>;
    fn container_thermometer_ids(&mut self, container: &str) -> Result<Vec<String>, StoreError>;

    fn insert_readings(&mut self, rows: &[Reading]) -> Result<usize, StoreError>;
    fn insert_task_reads(&mut self, rows: &[TaskRead]) -> Result<usize, StoreError>;
    /// Every reading linked to a task, in insertion order.
    fn task_readings(&mut self, task_id: &str) -> Result<Vec<Reading>, StoreError>;

    fn insert_checks(&mut self, rows: &[Check]) -> Result<usize, StoreError>;
    /// All checks of one container, newest first.
    fn container_checks(&mut self, container: &str) -> Result<Vec<Check>, StoreError>;

    fn insert_control(&mut self, row: &Control) -> Result<(), StoreError>;
    fn insert_task_control(&mut self, row: &TaskControl) -> Result<(), StoreError>;
    fn insert_set_control(&mut self, row: &SetControl) -> Result<(), StoreError>;
    /// Controls linked to a task, newest first.
    fn task_controls(&mut self, task_id: &str) -> Result<Vec<Control>, StoreError>;

    fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<(), StoreError>;
    fn update_setting_status(&mut self, id: &str, status: SettingStatus) -> Result<(), StoreError>;

    /// Empties every table derived from the dashboard and the portal. Tasks and
    /// settings are kept.
    fn clear_data_tables(&mut self) -> Result<(), StoreError>;
    fn insert_containers(&mut self, rows: &[Container]) -> Result<usize, StoreError>;
    fn insert_thermometers(&mut self, rows: &[Thermometer]) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

pub fn connect(url: &str, retry: ConnectRetry) -> Result<PgConnection, StoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match PgConnection::establish(url) {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < retry.attempts => {
                warn!(
                    "Database connection attempt {}/{} failed: {}; retrying in {}s",
                    attempt,
                    retry.attempts,
                    e,
                    retry.backoff.as_secs_f32()
                );
                thread::sleep(retry.backoff);
            }
            Err(e) => {
                return Err(StoreError::Connect(format!("{} (after {} attempt(s))", e, attempt)));
            }
        }
    }
}

pub struct PgStore {
    url: String,
    retry: ConnectRetry,
    conn: PgConnection,
}

impl PgStore {
    pub fn open(url: &str, retry: ConnectRetry) -> Result<Self, StoreError> {
        let conn = connect(url, retry)?;
        Ok(PgStore {
            url: url.to_string(),
            retry,
            conn,
        })
    }

    pub fn migrate(&mut self) -> Result<(), StoreError> {
        let applied = self
            .conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        if applied.is_empty() {
            info!("Database schema is up to date; no migrations were applied");
        } else {
            let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
            info!("Applied {} database migration(s): {}", applied.len(), names);
        }
        Ok(())
    }

    /// Runs `op`, reconnecting when the server dropped the connection.
    fn run<T>(
        &mut self,
        action: &'static str,
        mut op: impl FnMut(&mut PgConnection) -> QueryResult<T>,
    ) -> Result<T, StoreError> {
        let mut reconnects = 0;
        loop {
            match op(&mut self.conn) {
                Ok(v) => return Ok(v),
                Err(DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info))
                    if reconnects < self.retry.attempts =>
                {
                    reconnects += 1;
                    warn!("{}: connection closed ({}); reconnecting", action, info.message());
                    thread::sleep(self.retry.backoff);
                    self.conn = connect(&self.url, self.retry)?;
                }
                Err(source) => return Err(StoreError::Query { action, source }),
            }
        }
    }
}

impl Store for PgStore {
    fn task(&mut self, id: &str) -> Result<Option<Task>, StoreError> {
        use schema::tasks::dsl as T;
        self.run("select task", |conn| {
            T::tasks
                .filter(T::id.eq(id))
                .select(Task::as_select())
                .first(conn)
                .optional()
        })
    }

    fn setting(&mut self, id: &str) -> Result<Option<Setting>, StoreError> {
        use schema::settings::dsl as S;
        self.run("select setting", |conn| {
            S::settings
                .filter(S::id.eq(id))
                .select(Setting::as_select())
                .first(conn)
                .optional()
        })
    }

    fn task_container(&mut self, task_id: &str) -> Result<Option<String>, StoreError> {
        use schema::container_tasks::dsl as CT;
        self.run("select task container", |conn| {
            CT::container_tasks
                .filter(CT::task_id.eq(task_id))
                .select(CT::container_id)
                .first(conn)
                .optional()
        })
    }

    fn setting_container(&mut self, set_id: &str) -> Result<Option<String>, StoreError> {
        use schema::container_sets::dsl as CS;
        self.run("select setting container", |conn| {
            CS::container_sets
                .filter(CS::set_id.eq(set_id))
                .select(CS::container_id)
                .first(conn)
                .optional()
        })
    }

    fn container_thermometer_ids(&mut self, container: &str) -> Result<Vec<String>, StoreError> {
        use schema::container_thermometers::dsl as CTH;
        self.run("select container thermometers", |conn| {
            CTH::container_thermometers
                .filter(CTH::container_id.eq(container))
                .select(CTH::thermometer_id)
                .load(conn)
        })
    }

    fn insert_readings(&mut self, rows: &[Reading]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        use schema::readings::dsl as R;
        self.run("insert readings", |conn| diesel::insert_into(R::readings).values(rows).execute(conn))
    }

    fn insert_task_reads(&mut self, rows: &[TaskRead]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        use schema::task_reads::dsl as TR;
        self.run("insert task reads", |conn| {
            diesel::insert_into(TR::task_reads).values(rows).execute(conn)
        })
    }

    fn task_readings(&mut self, task_id: &str) -> Result<Vec<Reading>, StoreError> {
        use schema::readings::dsl as R;
        use schema::task_reads::dsl as TR;
        self.run("select task readings", |conn| {
            let linked = TR::task_reads.filter(TR::task_id.eq(task_id)).select(TR::read_id);
            R::readings
                .filter(R::id.eq_any(linked))
                .order(R::db_time.asc())
                .select(Reading::as_select())
                .load(conn)
        })
    }

    fn insert_checks(&mut self, rows: &[Check]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        use schema::container_checks::dsl as C;
        self.run("insert checks", |conn| {
            diesel::insert_into(C::container_checks).values(rows).execute(conn)
        })
    }

    fn container_checks(&mut self, container: &str) -> Result<Vec<Check>, StoreError> {
        use schema::container_checks::dsl as C;
        self.run("select container checks", |conn| {
            C::container_checks
                .filter(C::container.eq(container))
                .order(C::timestamp.desc())
                .select(Check::as_select())
                .load(conn)
        })
    }

    fn insert_control(&mut self, row: &Control) -> Result<(), StoreError> {
        use schema::controls::dsl as CO;
        self.run("insert control", |conn| diesel::insert_into(CO::controls).values(row).execute(conn))?;
        Ok(())
    }

    fn insert_task_control(&mut self, row: &TaskControl) -> Result<(), StoreError> {
        use schema::task_controls::dsl as TC;
        self.run("insert task control", |conn| {
            diesel::insert_into(TC::task_controls).values(row).execute(conn)
        })?;
        Ok(())
    }

    fn insert_set_control(&mut self, row: &SetControl) -> Result<(), StoreError> {
        use schema::set_controls::dsl as SC;
        self.run("insert set control", |conn| {
            diesel::insert_into(SC::set_controls).values(row).execute(conn)
        })?;
        Ok(())
    }

    fn task_controls(&mut self, task_id: &str) -> Result<Vec<Control>, StoreError> {
        use schema::controls::dsl as CO;
        use schema::task_controls::dsl as TC;
        self.run("select task controls", |conn| {
            let linked = TC::task_controls.filter(TC::task_id.eq(task_id)).select(TC::control_id);
            CO::controls
                .filter(CO::id.eq_any(linked))
                .order(CO::timestamp.desc())
                .select(Control::as_select())
                .load(conn)
        })
    }

    fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<(), StoreError> {
        use schema::tasks::dsl as T;
        self.run("update task status", |conn| {
            diesel::update(T::tasks.filter(T::id.eq(id)))
                .set(T::status.eq(status.as_str()))
                .execute(conn)
        })?;
        Ok(())
    }

    fn update_setting_status(&mut self, id: &str, status: SettingStatus) -> Result<(), StoreError> {
        use schema::settings::dsl as S;
        self.run("update setting status", |conn| {
            diesel::update(S::settings.filter(S::id.eq(id)))
                .set(S::status.eq(status.as_str()))
                .execute(conn)
        })?;
        Ok(())
    }

    fn clear_data_tables(&mut self) -> Result<(), StoreError> {
        self.run("clear data tables", |conn| {
            conn.transaction(|conn| {
                diesel::delete(schema::task_reads::table).execute(conn)?;
                diesel::delete(schema::readings::table).execute(conn)?;
                diesel::delete(schema::container_checks::table).execute(conn)?;
                diesel::delete(schema::task_controls::table).execute(conn)?;
                diesel::delete(schema::set_controls::table).execute(conn)?;
                diesel::delete(schema::controls::table).execute(conn)?;
                diesel::delete(schema::container_thermometers::table).execute(conn)?;
                diesel::delete(schema::container_tasks::table).execute(conn)?;
                diesel::delete(schema::container_sets::table).execute(conn)?;
                diesel::delete(schema::containers::table).execute(conn)?;
                diesel::delete(schema::thermometers::table).execute(conn)?;
                Ok(())
            })
        })
    }

    fn insert_containers(&mut self, rows: &[Container]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        use schema::containers::dsl as CN;
        self.run("insert containers", |conn| {
            diesel::insert_into(CN::containers).values(rows).execute(conn)
        })
    }

    fn insert_thermometers(&mut self, rows: &[Thermometer]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        use schema::thermometers::dsl as TH;
        self.run("insert thermometers", |conn| {
            diesel::insert_into(TH::thermometers).values(rows).execute(conn)
        })
    }
}
