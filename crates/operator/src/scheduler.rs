//! Scheduler & Status. Computes requeue delays — cron-driven when
//! `schedule` is set and the cycle succeeded, jittered event-driven
//! otherwise — and folds a cycle's outcome into `GroupSyncStatus`.

use crate::clock::Clock;
use crate::util::messages::{MESSAGE_SYNCED, REASON_CONFIG_INVALID, REASON_SYNCED, REASON_SYNC_FAILED};
use crate::util::{DEFAULT_REQUEUE_INTERVAL, REQUEUE_JITTER};
use chrono::{DateTime, SecondsFormat, Utc};
use group_sync_types::{ConditionStatus, ConditionType, GroupSyncStatus};
use rand::Rng;
use std::str::FromStr;
use std::time::Duration;

/// `GroupSyncSpec.schedule` is documented as "standard 5-field cron
/// expression", but the `cron` crate parses the 6/7-field format with
/// a leading seconds field. A plain 5-field expression is widened by
/// prepending `"0 "` (seconds = 0) before handing it to `cron::Schedule`,
/// so user-facing config stays the familiar 5-field shape.
fn widen_cron_expr(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_owned()
    }
}

/// Parses `schedule_expr` as a 5-field cron expression and returns the
/// first occurrence strictly after `after`. `Ok(None)` is practically
/// unreachable for a well-formed expression but cheaper to handle than to
/// `unwrap`.
pub fn next_fire(schedule_expr: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, cron::error::Error> {
    let schedule = cron::Schedule::from_str(&widen_cron_expr(schedule_expr))?;
    Ok(schedule.after(&after).next())
}

/// Validates that `schedule_expr` is a well-formed cron expression without
/// computing an occurrence — used by `registry::validate_spec`.
pub fn validate_cron_expr(schedule_expr: &str) -> Result<(), cron::error::Error> {
    cron::Schedule::from_str(&widen_cron_expr(schedule_expr)).map(|_| ())
}

/// A few seconds of random jitter added to event-driven requeues so many
/// `GroupSync` objects sharing a schedule don't all reconcile in lockstep
/// (mirrors the upstream controller's requeue jitter).
fn jitter() -> Duration {
    let max = REQUEUE_JITTER.as_millis() as u64;
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max))
}

/// Outcome of the requeue decision: if the cycle ends successfully and
/// `schedule` is set, the controller computes `next = cron.Next(now)` and
/// re-enqueues with `delay = next - now`. Errors fall back to the standard
/// controller-retry backoff (no explicit scheduling).
pub struct RequeueDecision {
    pub delay: Duration,
    /// Only populated when a cron-driven requeue was computed — mirrored
    /// into the `group_sync_next_scheduled_sync` gauge by the caller.
    pub next_scheduled: Option<DateTime<Utc>>,
}

/// Decides the next requeue delay for a completed cycle.
pub fn requeue_decision(clock: &dyn Clock, schedule_expr: Option<&str>, cycle_succeeded: bool) -> RequeueDecision {
    if !cycle_succeeded {
        return RequeueDecision {
            delay: DEFAULT_REQUEUE_INTERVAL,
            next_scheduled: None,
        };
    }

    if let Some(expr) = schedule_expr {
        let now = clock.now();
        if let Ok(Some(next)) = next_fire(expr, now) {
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            return RequeueDecision {
                delay,
                next_scheduled: Some(next),
            };
        }
    }

    RequeueDecision {
        delay: DEFAULT_REQUEUE_INTERVAL + jitter(),
        next_scheduled: None,
    }
}

/// Folds one cycle's outcome into `status` in place: full success sets
/// `ReconcileSuccess=True` and `lastSyncSuccessTime`; any aggregated error
/// sets `ReconcileError=True` and leaves `lastSyncSuccessTime` untouched.
/// Also records the next-scheduled-sync timestamp when one was computed.
pub fn apply_cycle_result(
    status: &mut GroupSyncStatus,
    clock: &dyn Clock,
    cycle_error: Option<&str>,
    next_scheduled: Option<DateTime<Utc>>,
) {
    let now = clock.now().to_rfc3339_opts(SecondsFormat::Secs, true);
    match cycle_error {
        None => {
            status.set_condition(ConditionType::ReconcileSuccess, ConditionStatus::True, REASON_SYNCED, MESSAGE_SYNCED, &now);
            status.set_condition(ConditionType::ReconcileError, ConditionStatus::False, REASON_SYNCED, MESSAGE_SYNCED, &now);
            status.last_sync_success_time = Some(now);
        }
        Some(message) => {
            status.set_condition(ConditionType::ReconcileError, ConditionStatus::True, REASON_SYNC_FAILED, message, &now);
            status.set_condition(ConditionType::ReconcileSuccess, ConditionStatus::False, REASON_SYNC_FAILED, message, &now);
        }
    }
    status.next_scheduled_sync = next_scheduled.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true));
}

/// Folds a spec-level `ConfigInvalid` rejection into `status` — no
/// provider ran this cycle.
pub fn apply_config_invalid(status: &mut GroupSyncStatus, clock: &dyn Clock, message: &str) {
    let now = clock.now().to_rfc3339_opts(SecondsFormat::Secs, true);
    status.set_condition(ConditionType::ReconcileError, ConditionStatus::True, REASON_CONFIG_INVALID, message, &now);
    status.set_condition(ConditionType::ReconcileSuccess, ConditionStatus::False, REASON_CONFIG_INVALID, message, &now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn clock_at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap())
    }

    #[test]
    fn cron_only_schedule_delay_equals_next_minus_now() {
        // Property 12: delay == cron.Next(now) - now.
        let clock = clock_at(2026, 1, 1, 0, 0);
        let decision = requeue_decision(&clock, Some("*/5 * * * *"), true);
        assert!(decision.next_scheduled.is_some());
        let next = decision.next_scheduled.unwrap();
        assert_eq!(decision.delay, (next - clock.0).to_std().unwrap());
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn event_driven_only_gets_jittered_default_interval() {
        let clock = clock_at(2026, 1, 1, 0, 0);
        let decision = requeue_decision(&clock, None, true);
        assert!(decision.next_scheduled.is_none());
        assert!(decision.delay >= DEFAULT_REQUEUE_INTERVAL);
        assert!(decision.delay <= DEFAULT_REQUEUE_INTERVAL + REQUEUE_JITTER);
    }

    #[test]
    fn failed_cycle_uses_standard_backoff_no_scheduling() {
        let clock = clock_at(2026, 1, 1, 0, 0);
        let decision = requeue_decision(&clock, Some("*/5 * * * *"), false);
        assert_eq!(decision.delay, DEFAULT_REQUEUE_INTERVAL);
        assert!(decision.next_scheduled.is_none());
    }

    #[test]
    fn success_sets_last_sync_success_time_failure_does_not() {
        let clock = clock_at(2026, 1, 1, 0, 0);
        let mut status = GroupSyncStatus::default();
        apply_cycle_result(&mut status, &clock, None, None);
        assert!(status.last_sync_success_time.is_some());

        let mut status = GroupSyncStatus::default();
        apply_cycle_result(&mut status, &clock, Some("boom"), None);
        assert!(status.last_sync_success_time.is_none());
    }
}
