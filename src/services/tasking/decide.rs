//! Phase actions.

use log::{info, warn};
use rust_decimal::Decimal;

use super::{describe, CheckHistory, Phase, TaskContext};
use crate::db::models::TaskStatus;
use crate::services::checking;
use crate::services::controlling::{self, ControlLink};
use crate::services::driving;
use crate::services::reading::{self, fresh_temperatures};
use crate::services::runtime::{ProcessError, Runtime};
use crate::temperature::Temperature;

pub fn dispatch(rt: &mut Runtime, ctx: &mut TaskContext, phase: Phase) -> Result<(), ProcessError> {
    match phase {
        Phase::Pending => {
            info!("Task {} has not started yet", ctx.task.id);
            Ok(())
        }
        Phase::Beginning => {
            let target = ctx.task.t_start;
            ensure(rt, ctx, target)
        }
        Phase::ConsiderCooling => consider_cooling(rt, ctx),
        Phase::ConsiderAdjusting => consider_adjusting(rt, ctx),
        Phase::Adjusting => adjust(rt, ctx),
        Phase::Finishing => finish(rt, ctx),
        Phase::Overrun => Err(ProcessError::Overrun(format!(
            "task {} is past its finishing window",
            ctx.task.id
        ))),
    }
}

/// Drives the container to `target` unless the newest check already shows it;
/// either way a control is recorded.
pub fn ensure(rt: &mut Runtime, ctx: &TaskContext, target: Temperature) -> Result<(), ProcessError> {
    if ctx.checking.recent == Some(target) {
        info!("Task {}: {} already active", ctx.task.id, target);
        controlling::record(rt.store, rt.now, target, ControlLink::Task(&ctx.task.id))?;
        return Ok(());
    }
    info!(
        "Task {}: want {}, container shows {}",
        ctx.task.id,
        target,
        describe(ctx.checking.recent)
    );
    drive(rt, ctx, target)
}

pub fn drive(rt: &mut Runtime, ctx: &TaskContext, target: Temperature) -> Result<(), ProcessError> {
    driving::apply(rt, &ctx.checking.container, target, ControlLink::Task(&ctx.task.id))?;
    Ok(())
}

fn consider_cooling(rt: &mut Runtime, ctx: &mut TaskContext) -> Result<(), ProcessError> {
    let t_max = ctx.task.t_max;
    let at_maximum = measured(rt, ctx)?.iter().any(|t| *t >= t_max);
    let target = if at_maximum {
        info!("Task {}: maximum {} reached; cooling", ctx.task.id, t_max);
        ctx.task.t_start - rt.policy.cooling_delta
    } else {
        ctx.task.t_start
    };
    ensure(rt, ctx, target)
}

fn consider_adjusting(rt: &mut Runtime, ctx: &mut TaskContext) -> Result<(), ProcessError> {
    if cooldown_observed(&ctx.checking.observed(), rt.policy.cooling_delta) {
        info!("Task {}: cooldown observed; adjusting", ctx.task.id);
        adjust(rt, ctx)
    } else {
        consider_cooling(rt, ctx)
    }
}

fn adjust(rt: &mut Runtime, ctx: &mut TaskContext) -> Result<(), ProcessError> {
    if ctx.checking.recent.is_none() {
        info!("Task {}: no recent setpoint; reading the dashboard", ctx.task.id);
        checking::collect_all(rt)?;
        let container = ctx.checking.container.clone();
        ctx.checking = CheckHistory::load(rt, &container, ctx.task.start)?;
    }
    let Some(current) = ctx.checking.recent else {
        warn!("Task {}: container {} shows no setpoint; not adjusting", ctx.task.id, ctx.checking.container);
        return Ok(());
    };

    let temperatures = measured(rt, ctx)?;
    if temperatures.iter().any(|t| *t <= ctx.task.t_min) {
        info!("Task {}: minimum {} reached", ctx.task.id, ctx.task.t_min);
        drive(rt, ctx, current + 1)
    } else if temperatures.iter().any(|t| *t >= ctx.task.t_max) {
        info!("Task {}: maximum {} reached", ctx.task.id, ctx.task.t_max);
        drive(rt, ctx, current - 1)
    } else {
        info!("Task {}: temperature within band; keeping {}", ctx.task.id, current);
        controlling::record(rt.store, rt.now, current, ControlLink::Task(&ctx.task.id))?;
        Ok(())
    }
}

fn finish(rt: &mut Runtime, ctx: &mut TaskContext) -> Result<(), ProcessError> {
    let t_freeze = ctx.task.t_freeze;
    let shown = ctx.checking.recent;
    ensure(rt, ctx, t_freeze)?;
    if shown == Some(t_freeze) {
        info!("Task {}: freeze point {} confirmed; ending", ctx.task.id, t_freeze);
        rt.store.update_task_status(&ctx.task.id, TaskStatus::Ended)?;
    } else {
        info!(
            "Task {}: container shows {}, freeze point {}; will retry",
            ctx.task.id,
            describe(shown),
            t_freeze
        );
    }
    Ok(())
}

/// Fresh temperatures of the task's thermometers, reading the portal once per invocation.
fn measured(rt: &mut Runtime, ctx: &mut TaskContext) -> Result<Vec<Temperature>, ProcessError> {
    if let Some(fresh) = &ctx.reading.fresh {
        return Ok(fresh.clone());
    }
    reading::collect(rt, &ctx.task.id)?;
    let all = reading::task_readings(rt, &ctx.task.id)?;
    let fresh = fresh_temperatures(&all, rt.now, rt.policy.reading_freshness_minutes);
    info!(
        "Task {}: {} fresh reading(s): {}",
        ctx.task.id,
        fresh.len(),
        fresh.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
    );
    ctx.reading.fresh = Some(fresh.clone());
    Ok(fresh)
}

/// Whether two consecutive observed setpoints differ by exactly `delta`.
pub fn cooldown_observed(observed: &[Temperature], delta: i32) -> bool {
    let delta = Decimal::from(delta);
    observed.windows(2).any(|w| w[0].distance(w[1]) == delta)
}
