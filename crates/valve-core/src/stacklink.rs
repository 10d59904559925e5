//! Per-stack-port probe state machine: INIT / UP / DOWN(timeout or
//! cabling mismatch), driven by received LLDP stack probes.

use crate::model::port::{StackProbeInfo, StackState};
use valve_common::{audit_log, error_log, info_log};
use valve_common::{AuditCategory, AuditRecord};
use valve_types::{DpId, PortNo};

const SOURCE: &str = "valve_core::stacklink";

/// Whether admin configuration disables this stack port entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminState {
    Enabled,
    Down,
}

/// Computes the next stack-port state from probe history, per the state
/// table: admin-down leaves state untouched; a never-probed DOWN port
/// moves to INIT; an incorrectly-cabled port or a timed-out one moves to
/// DOWN; a recently-probed non-UP port moves to UP.
pub fn next_state(
    admin: AdminState,
    current: StackState,
    probe: &StackProbeInfo,
    now: u64,
    send_interval: u64,
    max_lldp_lost: u64,
) -> StackState {
    if admin == AdminState::Down {
        return current;
    }

    if probe.last_seen_lldp_time.is_none() && current == StackState::Down {
        return StackState::Init;
    }

    if !probe.stack_correct && current != StackState::Down {
        return StackState::Down;
    }

    if let Some(last_seen) = probe.last_seen_lldp_time {
        let lost_intervals = now.saturating_sub(last_seen) / send_interval.max(1);
        if lost_intervals >= max_lldp_lost && current != StackState::Down {
            return StackState::Down;
        }
        if lost_intervals < max_lldp_lost && current != StackState::Up {
            return StackState::Up;
        }
    }

    current
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    None,
    TransitionedUp,
    TransitionedDown { cabling_mismatch: bool },
}

/// Applies a computed next state, logging and auditing the transition,
/// and reporting whether downstream managers must react (flood
/// recompute, tunnel ACL recompile, host-state deletion on this port).
pub fn apply_transition(
    dp: DpId,
    port: PortNo,
    current: StackState,
    next: StackState,
    probe: &StackProbeInfo,
) -> StateChange {
    if current == next {
        return StateChange::None;
    }

    match next {
        StackState::Up => {
            info_log!(SOURCE, "stack port {} on {} UP", port, dp);
            StateChange::TransitionedUp
        }
        StackState::Down => {
            let cabling_mismatch = !probe.stack_correct;
            if cabling_mismatch {
                error_log!(SOURCE, "stack port {} on {} DOWN: cabling mismatch (remote_dp={:?})", port, dp, probe.remote_dp_id);
                audit_log!(
                    AuditRecord::new(AuditCategory::ErrorCondition, SOURCE, "stack_cabling_mismatch")
                        .with_object_id(dp.to_string())
                        .with_object_type("stack_port")
                        .with_error(format!("port {port} cabling mismatch"))
                );
            } else {
                info_log!(SOURCE, "stack port {} on {} DOWN: probe timeout", port, dp);
            }
            StateChange::TransitionedDown { cabling_mismatch }
        }
        StackState::Init => StateChange::None,
    }
}
