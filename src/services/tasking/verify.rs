//! Checks run before a phase action, once a task has issued controls.

use log::{info, warn};
use std::ops::ControlFlow;

use super::{decide, describe, TaskContext};
use crate::services::runtime::{ProcessError, Runtime};
use crate::temperature::Temperature;

/// Fails when commands evidently do not reach the container: too many checks
/// without a setpoint, or the newest `limit` controls all asking for one value
/// that no check ever showed. The fresh check counts as shown even when it
/// predates the task.
pub fn verify_control_execution(ctx: &TaskContext, limit: usize) -> Result<(), ProcessError> {
    let blank = ctx.checking.checks.iter().filter(|c| !c.has_setpoint()).count();
    if blank >= limit {
        return Err(ProcessError::StuckSetting(format!(
            "{} check(s) of {} without a setpoint since task {} started",
            blank, ctx.checking.container, ctx.task.id
        )));
    }

    let controls = &ctx.controlling.controls;
    if controls.len() < limit {
        return Ok(());
    }
    let newest = controls[..limit]
        .iter()
        .map(|c| c.target_setpoint.parse::<Temperature>())
        .collect::<Result<Vec<_>, _>>()?;
    let requested = newest[0];
    let observed = ctx.checking.observed();
    let seen = observed.contains(&requested) || ctx.checking.recent == Some(requested);
    if newest.iter().all(|t| *t == requested) && !seen {
        warn!("{} controls at {} had no visible effect", limit, requested);
        return Err(ProcessError::StuckSetting(format!(
            "{} repeated {} time(s) on {} without being observed",
            requested, limit, ctx.checking.container
        )));
    }
    Ok(())
}

/// Re-sends the newest control when the container shows something else, and
/// stops the invocation there.
pub fn verify_previous_setting(rt: &mut Runtime, ctx: &TaskContext) -> Result<ControlFlow<()>, ProcessError> {
    match ctx.controlling.recent {
        Some(control) if ctx.checking.recent != Some(control) => {
            info!(
                "Task {}: last control {} but container shows {}; re-applying",
                ctx.task.id,
                control,
                describe(ctx.checking.recent)
            );
            decide::drive(rt, ctx, control)?;
            Ok(ControlFlow::Break(()))
        }
        _ => Ok(ControlFlow::Continue(())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Task;
    use crate::services::tasking::run_task;
    use crate::testing::*;

    const HOUR: i64 = 3600;

    fn task(start: i64) -> Task {
        Task {
            id: "t1".into(),
            start,
            duration: 10 * HOUR,
            t_start: 5.into(),
            t_min: 2.into(),
            t_max: 8.into(),
            t_freeze: (-18).into(),
            status: "running".into(),
        }
    }

    fn load(store: &mut MemoryStore) -> TaskContext {
        let driver = FakeDriver::new(Vec::new());
        let thermometers = FakeThermometers::default();
        let mut rt = runtime(store, &driver, &thermometers, noon());
        let task = task(noon().timestamp() - HOUR);
        TaskContext::load(&mut rt, &task, "C1").unwrap()
    }

    fn store_with_blank_checks(blank: usize) -> MemoryStore {
        let now = noon().timestamp();
        let mut store = MemoryStore::with_task(task(now - HOUR), "C1");
        store.push_task_control("t1", now - 1800, "5.0");
        store.push_check("C1", now - 1700, "5.0");
        for i in 0..blank {
            store.push_check("C1", now - 1000 + i as i64, "");
        }
        store
    }

    #[test]
    fn five_blank_checks_are_stuck_four_are_not() {
        let ctx = load(&mut store_with_blank_checks(4));
        assert!(verify_control_execution(&ctx, 5).is_ok());

        let ctx = load(&mut store_with_blank_checks(5));
        assert!(matches!(verify_control_execution(&ctx, 5), Err(ProcessError::StuckSetting(_))));
    }

    #[test]
    fn blank_checks_before_the_task_do_not_count() {
        let now = noon().timestamp();
        let mut store = store_with_blank_checks(4);
        store.push_check("C1", now - 2 * HOUR, "");
        let ctx = load(&mut store);
        assert!(verify_control_execution(&ctx, 5).is_ok());
    }

    #[test]
    fn repeated_unobserved_controls_are_stuck() {
        let now = noon().timestamp();
        let mut store = MemoryStore::with_task(task(now - HOUR), "C1");
        store.push_check("C1", now - 3000, "3.0");
        for i in 0..5 {
            store.push_task_control("t1", now - 2500 + i * 60, "7.0");
        }
        let ctx = load(&mut store);
        assert!(matches!(verify_control_execution(&ctx, 5), Err(ProcessError::StuckSetting(_))));
        assert!(verify_control_execution(&ctx, 6).is_ok());

        store.push_check("C1", now - 100, "7.0");
        let ctx = load(&mut store);
        assert!(verify_control_execution(&ctx, 5).is_ok());
    }

    #[test]
    fn setpoint_shown_before_start_is_not_stuck() {
        let start = noon().timestamp();
        let mut store = MemoryStore::with_task(task(start), "C1");
        store.push_check("C1", start - 60, "5.0");
        let driver = FakeDriver::single("C1", "On", "5.0", start - 60);
        let thermometers = FakeThermometers::default();
        for minute in 0..6 {
            let mut rt = runtime(&mut store, &driver, &thermometers, noon() + chrono::Duration::minutes(minute));
            run_task(&mut rt, "t1").unwrap();
        }
        assert_eq!(store.task_status("t1").as_deref(), Some("running"));
        assert!(driver.commanded().is_empty());
        assert_eq!(store.task_targets("t1").len(), 6);
    }

    #[test]
    fn ignored_commands_end_in_error_after_the_retry_limit() {
        let start = noon().timestamp();
        let mut store = MemoryStore::with_task(task(start), "C1");
        let driver = FakeDriver::single("C1", "On", "0.0", start);
        driver.accepts.set(false);
        let thermometers = FakeThermometers::default();
        for minute in 0..5 {
            let mut rt = runtime(&mut store, &driver, &thermometers, noon() + chrono::Duration::minutes(minute));
            run_task(&mut rt, "t1").unwrap();
        }
        assert_eq!(store.task_status("t1").as_deref(), Some("running"));
        assert_eq!(driver.commanded(), vec!["5.0"; 5]);

        let mut rt = runtime(&mut store, &driver, &thermometers, noon() + chrono::Duration::minutes(5));
        run_task(&mut rt, "t1").unwrap();
        assert_eq!(store.task_status("t1").as_deref(), Some("error"));
        assert_eq!(driver.commanded().len(), 5);
    }

    #[test]
    fn stuck_setting_puts_task_in_error() {
        let mut store = store_with_blank_checks(5);
        let driver = FakeDriver::single("C1", "On", "", noon().timestamp());
        let thermometers = FakeThermometers::default();
        {
            let mut rt = runtime(&mut store, &driver, &thermometers, noon());
            run_task(&mut rt, "t1").unwrap();
        }
        assert_eq!(store.task_status("t1").as_deref(), Some("error"));
        assert!(driver.commanded().is_empty());
    }

    #[test]
    fn mismatch_reapplies_last_control_before_any_phase_action() {
        let now = noon().timestamp();
        // Finishing phase: without reconciliation the freeze point would be commanded.
        let mut store = MemoryStore::with_task(task(now - 11 * HOUR), "C1");
        store.push_task_control("t1", now - 600, "4.0");
        store.push_check("C1", now - 300, "3.0");
        let driver = FakeDriver::single("C1", "On", "3.0", now);
        let thermometers = FakeThermometers::default();
        {
            let mut rt = runtime(&mut store, &driver, &thermometers, noon());
            run_task(&mut rt, "t1").unwrap();
        }
        assert_eq!(driver.commanded(), vec!["4.0"]);
        assert_eq!(store.task_targets("t1"), vec!["4.0", "4.0"]);
        assert_eq!(store.task_status("t1").as_deref(), Some("running"));
    }

    #[test]
    fn matching_control_lets_the_phase_run() {
        let now = noon().timestamp();
        let mut store = MemoryStore::with_task(task(now - HOUR / 2), "C1");
        store.push_task_control("t1", now - 600, "5.0");
        store.push_check("C1", now - 300, "5.0");
        let driver = FakeDriver::single("C1", "On", "5.0", now);
        let thermometers = FakeThermometers::default();
        {
            let mut rt = runtime(&mut store, &driver, &thermometers, noon());
            run_task(&mut rt, "t1").unwrap();
        }
        // Beginning: t_start already shown, so only a control is recorded.
        assert!(driver.commanded().is_empty());
        assert_eq!(store.task_targets("t1"), vec!["5.0", "5.0"]);
    }
}
