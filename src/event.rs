//! Invocation events: authorization and action selection.
//!
//! An event is a JSON object, optionally wrapped as an HTTP gateway event whose
//! `queryStringParameters` carry the actual fields.

use log::{info, warn};
use serde_json::Value;
use std::fmt::Write as _;

use crate::services::runtime::{ProcessError, Runtime};
use crate::services::{checking, initialize, setting, tasking};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Initialize,
    Task(String),
    Set(String),
    Check,
}

/// The gateway's `queryStringParameters` when present and non-empty, else the event itself.
pub fn effective_event(event: Value) -> Value {
    match event.get("queryStringParameters") {
        Some(Value::Object(params)) if !params.is_empty() => Value::Object(params.clone()),
        _ => event,
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false")
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Lowercase hex SHA-256 of `key`.
pub fn key_digest(key: &str) -> String {
    openssl::sha::sha256(key.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut hex, b| {
            let _ = write!(hex, "{:02x}", b);
            hex
        })
}

/// `key_1` must be the digest of the first key, `key_2` the second key itself.
pub fn authorized(event: &Value, key_1: &str, key_2: &str) -> bool {
    let given_1 = event.get("key_1").and_then(Value::as_str);
    let given_2 = event.get("key_2").and_then(Value::as_str);
    given_1 == Some(key_digest(key_1).as_str()) && given_2 == Some(key_2)
}

fn id_field(event: &Value, name: &str) -> Option<String> {
    match event.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First requested action, in order: initialize, task, set, check.
pub fn action(event: &Value) -> Option<Action> {
    if event.get("initialize").is_some_and(truthy) {
        Some(Action::Initialize)
    } else if let Some(id) = id_field(event, "task") {
        Some(Action::Task(id))
    } else if let Some(id) = id_field(event, "set") {
        Some(Action::Set(id))
    } else if event.get("check").is_some_and(truthy) {
        Some(Action::Check)
    } else {
        None
    }
}

pub fn dispatch(rt: &mut Runtime, action: &Action) -> Result<(), ProcessError> {
    match action {
        Action::Initialize => {
            info!("Initializing inventory");
            initialize::initialize(rt)
        }
        Action::Task(id) => {
            info!("Running task {}", id);
            tasking::run_task(rt, id)
        }
        Action::Set(id) => {
            info!("Running setting {}", id);
            setting::run_setting(rt, id)
        }
        Action::Check => {
            info!("Checking containers");
            checking::collect_all(rt).map(|_| ())
        }
    }
}

/// Selects the action of an authorized event; unauthorized or empty events yield `None`.
pub fn authorized_action(event: &Value, key_1: &str, key_2: &str) -> Option<Action> {
    if !authorized(event, key_1, key_2) {
        warn!("Event keys do not match; ignoring event");
        return None;
    }
    let action = action(event);
    if action.is_none() {
        info!("Event requests no action");
    }
    action
}

/// The action a received event authorizes, and the reply to print: the event
/// exactly as received, gateway wrapper included.
pub fn receive(received: Value, key_1: &str, key_2: &str) -> (Option<Action>, Value) {
    let action = authorized_action(&effective_event(received.clone()), key_1, key_2);
    (action, received)
}
