//! Timed thermal profiles.
//!
//! A task runs as a sequence of short invocations. Each one loads the task's
//! history into a [`TaskContext`], verifies that earlier commands took effect,
//! and runs the action of the current [`Phase`].

pub mod decide;
pub mod phase;
pub mod verify;

use log::{error, info, warn};
use std::ops::ControlFlow;

use super::checking::{container_checks, recent_setpoint};
use super::controlling::{recent_controls, recent_temperature};
use super::runtime::{ProcessError, Runtime};
use crate::db::models::{Check, Control, Task, TaskStatus};
use crate::temperature::Temperature;
pub use phase::{phase_at, Phase};

/// Task row with typed thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProfile {
    pub id: String,
    pub start: i64,
    pub duration: i64,
    pub t_start: Temperature,
    pub t_min: Temperature,
    pub t_max: Temperature,
    pub t_freeze: Temperature,
}

impl From<&Task> for TaskProfile {
    fn from(task: &Task) -> Self {
        TaskProfile {
            id: task.id.clone(),
            start: task.start,
            duration: task.duration,
            t_start: Temperature::from(task.t_start),
            t_min: Temperature::from(task.t_min),
            t_max: Temperature::from(task.t_max),
            t_freeze: Temperature::from(task.t_freeze),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckHistory {
    pub container: String,
    /// Checks taken since the task started, newest first.
    pub checks: Vec<Check>,
    /// Setpoint shown by the newest fresh check.
    pub recent: Option<Temperature>,
}

impl CheckHistory {
    pub fn load(rt: &mut Runtime, container: &str, since: i64) -> Result<Self, ProcessError> {
        let all = container_checks(rt.store, container)?;
        let recent = recent_setpoint(&all, rt.now, rt.policy.check_freshness_minutes);
        let checks = all.into_iter().filter(|c| c.timestamp >= since).collect();
        Ok(CheckHistory {
            container: container.to_string(),
            checks,
            recent,
        })
    }

    /// Non-empty observed setpoints, newest first.
    pub fn observed(&self) -> Vec<Temperature> {
        self.checks.iter().filter_map(Check::observed_setpoint).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ControlHistory {
    /// Controls issued for the task, newest first.
    pub controls: Vec<Control>,
    /// Setpoint of the newest fresh control.
    pub recent: Option<Temperature>,
}

impl ControlHistory {
    pub fn load(rt: &mut Runtime, task_id: &str) -> Result<Self, ProcessError> {
        let controls = recent_controls(rt.store, task_id)?;
        let recent = recent_temperature(&controls, rt.now, rt.policy.control_freshness_minutes)?;
        Ok(ControlHistory { controls, recent })
    }
}

/// Fresh measured temperatures, read from the portal on first use.
#[derive(Debug, Clone, Default)]
pub struct ReadingHistory {
    pub fresh: Option<Vec<Temperature>>,
}

#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: TaskProfile,
    pub checking: CheckHistory,
    pub controlling: ControlHistory,
    pub reading: ReadingHistory,
}

impl TaskContext {
    pub fn load(rt: &mut Runtime, task: &Task, container: &str) -> Result<Self, ProcessError> {
        let task = TaskProfile::from(task);
        let checking = CheckHistory::load(rt, container, task.start)?;
        let controlling = ControlHistory::load(rt, &task.id)?;
        info!(
            "Task {} on {}: {} check(s) since start, recent setpoint {}, {} control(s), recent control {}",
            task.id,
            container,
            checking.checks.len(),
            describe(checking.recent),
            controlling.controls.len(),
            describe(controlling.recent)
        );
        Ok(TaskContext {
            task,
            checking,
            controlling,
            reading: ReadingHistory::default(),
        })
    }
}

pub(crate) fn describe(t: Option<Temperature>) -> String {
    t.map_or_else(|| "none".to_string(), |t| t.to_string())
}

/// Runs one invocation of a task. Stuck settings, refused commands and
/// overruns put the task in `error`; other failures propagate and leave it
/// `running` for the next invocation.
pub fn run_task(rt: &mut Runtime, task_id: &str) -> Result<(), ProcessError> {
    let Some(task) = rt.store.task(task_id)? else {
        warn!("Task {} not found", task_id);
        return Ok(());
    };
    if task.status() != Some(TaskStatus::Running) {
        info!("Task {} is {}; nothing to do", task_id, task.status);
        return Ok(());
    }
    let Some(container) = rt.store.task_container(task_id)? else {
        warn!("Task {} has no container", task_id);
        return Ok(());
    };

    let mut ctx = TaskContext::load(rt, &task, &container)?;
    match advance(rt, &mut ctx) {
        Err(e) if e.is_fatal_for_task() => {
            error!("Task {} failed: {}", task_id, e);
            rt.store.update_task_status(task_id, TaskStatus::Error)?;
            Ok(())
        }
        other => other,
    }
}

fn advance(rt: &mut Runtime, ctx: &mut TaskContext) -> Result<(), ProcessError> {
    if !ctx.controlling.controls.is_empty() {
        verify::verify_control_execution(ctx, rt.policy.setting_retry_limit)?;
        if let ControlFlow::Break(()) = verify::verify_previous_setting(rt, ctx)? {
            return Ok(());
        }
    }

    let phase = phase_at(ctx.task.start, ctx.task.duration, rt.timestamp());
    info!("Task {} is in phase {}", ctx.task.id, phase);
    decide::dispatch(rt, ctx, phase)
}
