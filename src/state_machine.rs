//! The flap-dampened state machine (§4.2): a pure function mapping a
//! previous `MonitorState` and a fresh `CheckOutcome` to a next state plus
//! the outage action to apply. No I/O.

use crate::models::{CheckOutcome, CheckStatus, MonitorState, MonitorStatus, OutageAction, StateTransition};

pub struct Thresholds {
    pub failures_to_down_from_up: i64,
    pub successes_to_up_from_down: i64,
}

/// Apply one probe outcome to the previous state.
pub fn transition(prev: &MonitorState, outcome: &CheckOutcome, checked_at: i64, thresholds: &Thresholds) -> StateTransition {
    let mut next = prev.clone();
    next.last_checked_at = Some(checked_at);
    next.last_latency_ms = outcome.latency_ms;

    match outcome.status {
        CheckStatus::Up => {
            next.consecutive_successes += 1;
            next.consecutive_failures = 0;
        }
        CheckStatus::Down => {
            next.consecutive_failures += 1;
            next.consecutive_successes = 0;
        }
        CheckStatus::Unknown | CheckStatus::Maintenance => {
            // Outcome carries no evidence; counters are preserved.
        }
    }

    let next_status = match (prev.status, outcome.status) {
        (MonitorStatus::Unknown, CheckStatus::Up) => MonitorStatus::Up,
        (MonitorStatus::Up, CheckStatus::Down) if next.consecutive_failures >= thresholds.failures_to_down_from_up => {
            MonitorStatus::Down
        }
        (MonitorStatus::Down, CheckStatus::Up) if next.consecutive_successes >= thresholds.successes_to_up_from_down => {
            MonitorStatus::Up
        }
        (MonitorStatus::Unknown, CheckStatus::Down) => {
            if next.consecutive_failures >= thresholds.failures_to_down_from_up {
                MonitorStatus::Down
            } else {
                MonitorStatus::Unknown
            }
        }
        (other, _) => other,
    };

    next.status = next_status;

    let changed = next.status != prev.status;
    if changed {
        next.last_changed_at = Some(checked_at);
    }

    next.last_error = match (next.status, outcome.status) {
        (MonitorStatus::Up, CheckStatus::Up) => None,
        (MonitorStatus::Down, _) => outcome.error.clone().or_else(|| prev.last_error.clone()),
        _ => prev.last_error.clone(),
    };

    let outage_action = match (prev.status, next.status) {
        (MonitorStatus::Up, MonitorStatus::Down) | (MonitorStatus::Unknown, MonitorStatus::Down) => OutageAction::Open,
        (MonitorStatus::Down, MonitorStatus::Up) => OutageAction::Close,
        (MonitorStatus::Down, MonitorStatus::Down) if outcome.status == CheckStatus::Down => OutageAction::Update,
        _ => OutageAction::None,
    };

    StateTransition {
        next,
        changed,
        outage_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            failures_to_down_from_up: 2,
            successes_to_up_from_down: 2,
        }
    }

    fn up_outcome() -> CheckOutcome {
        CheckOutcome {
            status: CheckStatus::Up,
            latency_ms: Some(10),
            http_status: Some(200),
            error: None,
            attempts: 1,
        }
    }

    fn down_outcome(err: &str) -> CheckOutcome {
        CheckOutcome {
            status: CheckStatus::Down,
            latency_ms: None,
            http_status: None,
            error: Some(err.to_string()),
            attempts: 2,
        }
    }

    #[test]
    fn cold_start_first_up() {
        let prev = MonitorState::unseen(1);
        let t = transition(&prev, &up_outcome(), 60, &thresholds());
        assert_eq!(t.next.status, MonitorStatus::Up);
        assert_eq!(t.next.consecutive_successes, 1);
        assert_eq!(t.next.consecutive_failures, 0);
        assert!(t.changed);
        assert_eq!(t.outage_action, OutageAction::None);
    }

    #[test]
    fn down_dampening_requires_two_failures() {
        let mut state = MonitorState {
            monitor_id: 1,
            status: MonitorStatus::Up,
            last_checked_at: Some(0),
            last_changed_at: Some(0),
            last_latency_ms: Some(5),
            last_error: None,
            consecutive_failures: 0,
            consecutive_successes: 10,
        };

        let t1 = transition(&state, &down_outcome("boom"), 60, &thresholds());
        assert_eq!(t1.next.status, MonitorStatus::Up);
        assert_eq!(t1.next.consecutive_failures, 1);
        assert!(!t1.changed);
        assert_eq!(t1.outage_action, OutageAction::None);

        state = t1.next;
        let t2 = transition(&state, &down_outcome("boom"), 120, &thresholds());
        assert_eq!(t2.next.status, MonitorStatus::Down);
        assert!(t2.changed);
        assert_eq!(t2.next.last_changed_at, Some(120));
        assert_eq!(t2.outage_action, OutageAction::Open);
    }

    #[test]
    fn recovery_closes_outage_after_two_successes() {
        let state = MonitorState {
            monitor_id: 1,
            status: MonitorStatus::Down,
            last_checked_at: Some(0),
            last_changed_at: Some(0),
            last_latency_ms: None,
            last_error: Some("boom".to_string()),
            consecutive_failures: 5,
            consecutive_successes: 0,
        };

        let t1 = transition(&state, &up_outcome(), 60, &thresholds());
        assert_eq!(t1.next.status, MonitorStatus::Down);
        assert_eq!(t1.next.consecutive_successes, 1);
        assert_eq!(t1.outage_action, OutageAction::None);

        let t2 = transition(&t1.next, &up_outcome(), 120, &thresholds());
        assert_eq!(t2.next.status, MonitorStatus::Up);
        assert!(t2.changed);
        assert_eq!(t2.outage_action, OutageAction::Close);
    }

    #[test]
    fn unknown_outcome_preserves_counters() {
        let state = MonitorState {
            monitor_id: 1,
            status: MonitorStatus::Up,
            last_checked_at: Some(0),
            last_changed_at: Some(0),
            last_latency_ms: Some(5),
            last_error: None,
            consecutive_failures: 1,
            consecutive_successes: 3,
        };
        let outcome = CheckOutcome {
            status: CheckStatus::Unknown,
            latency_ms: None,
            http_status: None,
            error: Some("invalid config".to_string()),
            attempts: 0,
        };
        let t = transition(&state, &outcome, 60, &thresholds());
        assert_eq!(t.next.consecutive_failures, 1);
        assert_eq!(t.next.consecutive_successes, 3);
        assert!(!t.changed);
    }

    #[test]
    fn remaining_down_updates_outage() {
        let state = MonitorState {
            monitor_id: 1,
            status: MonitorStatus::Down,
            last_checked_at: Some(0),
            last_changed_at: Some(0),
            last_latency_ms: None,
            last_error: Some("old error".to_string()),
            consecutive_failures: 3,
            consecutive_successes: 0,
        };
        let t = transition(&state, &down_outcome("new error"), 60, &thresholds());
        assert_eq!(t.next.status, MonitorStatus::Down);
        assert_eq!(t.outage_action, OutageAction::Update);
        assert_eq!(t.next.last_error.as_deref(), Some("new error"));
    }
}
