pub mod config;
pub mod db {
    pub mod models;
    pub mod store;
}
pub mod driver;
pub mod event;
pub mod measure;
pub mod schema;
pub mod services {
    pub mod checking;
    pub mod controlling;
    pub mod driving;
    pub mod initialize;
    pub mod reading;
    pub mod runtime;
    pub mod setting;
    pub mod tasking;
}
pub mod temperature;
#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::db::store::PgStore;
use crate::driver::dashboard::DashboardDriver;
use crate::event::Action;
use crate::measure::MeasureClient;
use crate::services::runtime::Runtime;
use chrono::Utc;
use log::{error, info};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

#[derive(Debug, Default)]
enum EventSource {
    Inline(String),
    File(PathBuf),
    #[default]
    Stdin,
}

#[derive(Debug, Default)]
struct CliOptions {
    env_file: Option<PathBuf>,
    event: EventSource,
}

fn read_event(source: &EventSource) -> Result<Value, String> {
    let text = match source {
        EventSource::Inline(s) => s.clone(),
        EventSource::File(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read event file {}: {}", path.display(), e))?,
        EventSource::Stdin => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .map_err(|e| format!("failed to read event from stdin: {}", e))?;
            s
        }
    };
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&text).map_err(|e| format!("event is not valid JSON: {}", e))
}

fn execute(cfg: &Config, action: &Action) -> Result<(), String> {
    let mut store = PgStore::open(&cfg.database_url, cfg.db_retry).map_err(|e| e.to_string())?;
    info!("Connected to database");
    store.migrate().map_err(|e| e.to_string())?;

    let driver = DashboardDriver::new(cfg.dashboard()).map_err(|e| e.to_string())?;
    let thermometers = MeasureClient::new(cfg.measure()).map_err(|e| e.to_string())?;

    let mut rt = Runtime {
        store: &mut store,
        driver: &driver,
        thermometers: &thermometers,
        policy: cfg.policy,
        now: Utc::now(),
    };
    event::dispatch(&mut rt, action).map_err(|e| format!("{:?} failed: {}", action, e))?;
    info!("{:?} completed", action);
    Ok(())
}

fn run(options: &CliOptions) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (webdriver={}, dry_run={}, measure_pages={}, timezone={}, retry_limit={}, cooling_delta={})",
        cfg.webdriver_url,
        cfg.driver_dry_run,
        cfg.measure_max_pages,
        cfg.policy.timezone,
        cfg.policy.setting_retry_limit,
        cfg.policy.cooling_delta
    );

    let (action, reply) = event::receive(read_event(&options.event)?, &cfg.key_1, &cfg.key_2);
    let result = match action {
        Some(action) => execute(&cfg, &action),
        None => Ok(()),
    };
    println!("{}", reply);
    result
}

fn parse_cli() -> Result<CliOptions, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut options = CliOptions::default();
    let mut event_given = false;
    let mut set_event = |source: EventSource, options: &mut CliOptions| {
        if event_given {
            return Err("only one of `--event` and `--event-file` may be given".to_string());
        }
        event_given = true;
        options.event = source;
        Ok(())
    };

    while let Some(arg) = args.next() {
        let arg = arg.to_str().ok_or_else(|| "argument contains invalid UTF-8".to_string())?.to_string();
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = || -> Result<String, String> {
            match &inline {
                Some(v) if !v.is_empty() => Ok(v.clone()),
                Some(_) => Err(format!("`{}` requires a value", flag)),
                None => args
                    .next()
                    .and_then(|v| v.into_string().ok())
                    .ok_or_else(|| format!("`{}` requires a value", flag)),
            }
        };
        match flag.as_str() {
            "--env-file" => {
                if options.env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                options.env_file = Some(PathBuf::from(value()?));
            }
            "--event" => {
                let json = value()?;
                set_event(EventSource::Inline(json), &mut options)?;
            }
            "--event-file" => {
                let path = PathBuf::from(value()?);
                set_event(EventSource::File(path), &mut options)?;
            }
            "--" => break,
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }
    Ok(options)
}

fn load_env(explicit: Option<&PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path.clone(), true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };
    // Variables already set in the process environment win.
    dotenvy::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
    Ok(Some(LoadedEnvFile { path, explicit }))
}

fn main() {
    let (options, loaded_env) = match parse_cli().and_then(|o| load_env(o.env_file.as_ref()).map(|l| (o, l))) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "reefer-control {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&options) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
