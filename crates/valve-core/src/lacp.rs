//! Per-port LACP (802.1AX) peer state machine.

use crate::error::{LacpError, Result};
use crate::model::port::PortRuntime;
use crate::ofmsg::{Action, FlowMod, Instructions, Match, OfMsg, TableName};
use serde::{Deserialize, Serialize};
use valve_common::{info_log, warn_log};
use valve_types::{MacAddress, PortNo, VlanId};

const SOURCE: &str = "valve_core::lacp";

/// Bounds the SLOW-protocol controller punt flow's max_len, truncating
/// payloads to this many bytes before they reach the controller.
pub const LACP_SIZE: u16 = 128;

const HIGH_PRIORITY: u32 = 0x8000;
const HIGHEST_PRIORITY: u32 = 0xffff;

/// A parsed subset of an LACPv1 PDU: only the fields the state machine
/// needs to classify partner synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LacpPdu {
    pub partner_system: MacAddress,
    pub actor_synchronization: bool,
    pub actor_collecting: bool,
    pub actor_distributing: bool,
}

impl LacpPdu {
    /// Partner considers the link up only when all three flags agree.
    pub fn actor_up(&self) -> bool {
        self.actor_synchronization && self.actor_collecting && self.actor_distributing
    }
}

/// Processes a received LACP PDU for `port`, returning the flow changes
/// (if the bundle state transitioned) and whether a reply PDU should be
/// emitted.
pub struct PduOutcome {
    pub flows: Vec<OfMsg>,
    pub send_reply: bool,
    pub transitioned: bool,
}

pub fn receive_pdu(
    now: u64,
    port: PortNo,
    bundle_id: u32,
    member_vlans: &[VlanId],
    runtime: &mut PortRuntime,
    pdu: LacpPdu,
    expected_partner_system: MacAddress,
    passthrough_down: bool,
    lacp_resp_interval: u64,
) -> Result<PduOutcome> {
    if pdu.partner_system != expected_partner_system {
        warn_log!(SOURCE, "actor-system mismatch on LAG {}: expected {}, got {}", bundle_id, expected_partner_system, pdu.partner_system);
        return Err(LacpError::NoActiveMembers(bundle_id).into());
    }

    let actor_up = pdu.actor_up();
    let was_up = runtime.lacp_up;
    let mut flows = Vec::new();
    let mut transitioned = false;

    if actor_up && !was_up {
        runtime.lacp_up = true;
        transitioned = true;
        flows.push(OfMsg::FlowMod(FlowMod::delete(TableName::Flood, Match::default().with_in_port(port))));
        for vlan in member_vlans {
            flows.push(flood_membership_flow(port, *vlan));
        }
        info_log!(SOURCE, "LACP bundle {} port {} UP", bundle_id, port);
    } else if !actor_up && was_up {
        runtime.lacp_up = false;
        transitioned = true;
        flows.extend(down_flows(port));
        info_log!(SOURCE, "LACP bundle {} port {} DOWN", bundle_id, port);
    }

    let pdu_changed = runtime.last_lacp_pdu != Some(pdu);
    runtime.last_lacp_pdu = Some(pdu);
    runtime.last_lacp_update = Some(now);

    let age_since_last_sent = runtime.last_lacp_pdu_sent.map(|last| now.saturating_sub(last));
    let interval_elapsed = age_since_last_sent.map(|age| age > lacp_resp_interval).unwrap_or(true);
    let send_reply = !passthrough_down && (pdu_changed || interval_elapsed);
    if send_reply {
        runtime.last_lacp_pdu_sent = Some(now);
    }

    Ok(PduOutcome { flows, send_reply, transitioned })
}

fn flood_membership_flow(port: PortNo, vlan: VlanId) -> OfMsg {
    OfMsg::FlowMod(FlowMod::add(
        TableName::Flood,
        HIGH_PRIORITY,
        Match::default().with_in_port(port).with_vlan(vlan),
        Instructions { actions: vec![], goto: None },
    ))
}

/// The flows to install when a LACP port goes DOWN: input drop, plus a
/// controller punt for the SLOW protocol multicast truncated to
/// `LACP_SIZE`.
pub fn down_flows(port: PortNo) -> Vec<OfMsg> {
    vec![
        OfMsg::FlowMod(FlowMod::add(
            TableName::Classification,
            HIGH_PRIORITY,
            Match::default().with_in_port(port),
            Instructions::default(),
        )),
        OfMsg::FlowMod(FlowMod::add(
            TableName::Classification,
            HIGHEST_PRIORITY,
            Match {
                in_port: Some(port),
                eth_dst: Some(MacAddress::SLOW_PROTOCOLS),
                ..Match::default()
            },
            Instructions { actions: vec![Action::OutputController { max_len: LACP_SIZE }], goto: None },
        )),
    ]
}

/// Forces a port DOWN if its peer hasn't refreshed within `lacp_timeout`.
pub fn expire(now: u64, port: PortNo, bundle_id: u32, runtime: &mut PortRuntime, lacp_timeout: u64) -> Option<Vec<OfMsg>> {
    let last = runtime.last_lacp_update?;
    if runtime.lacp_up && now.saturating_sub(last) > lacp_timeout {
        runtime.lacp_up = false;
        info_log!(SOURCE, "LACP bundle {} port {} timed out after {}s", bundle_id, port, lacp_timeout);
        Some(down_flows(port))
    } else {
        None
    }
}

/// True iff this DP should program the learned-destination forwarding
/// entries for `port` — only forwarding bundle members do, which on a
/// stack is the root DP (or, non-stacked, this DP always).
pub fn lacp_forwarding(is_stacked: bool, is_stack_root: bool) -> bool {
    !is_stacked || is_stack_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(n: u32) -> PortNo {
        PortNo::new(n).unwrap()
    }

    fn vlan(n: u16) -> VlanId {
        VlanId::new(n).unwrap()
    }

    fn partner() -> MacAddress {
        MacAddress::new([0x0e, 0, 0, 0, 0, 1])
    }

    #[test]
    fn synchronized_pdu_transitions_to_up() {
        let mut runtime = PortRuntime::new();
        let pdu = LacpPdu { partner_system: partner(), actor_synchronization: true, actor_collecting: true, actor_distributing: true };
        let outcome = receive_pdu(0, port(1), 1, &[vlan(100)], &mut runtime, pdu, partner(), false, 30).unwrap();
        assert!(outcome.transitioned);
        assert!(runtime.lacp_up);
        assert!(!outcome.flows.is_empty());
    }

    #[test]
    fn unsynchronized_pdu_after_up_transitions_down() {
        let mut runtime = PortRuntime::new();
        let up_pdu = LacpPdu { partner_system: partner(), actor_synchronization: true, actor_collecting: true, actor_distributing: true };
        receive_pdu(0, port(1), 1, &[vlan(100)], &mut runtime, up_pdu, partner(), false, 30).unwrap();

        let down_pdu = LacpPdu { partner_system: partner(), actor_synchronization: false, actor_collecting: false, actor_distributing: false };
        let outcome = receive_pdu(1, port(1), 1, &[vlan(100)], &mut runtime, down_pdu, partner(), false, 30).unwrap();
        assert!(outcome.transitioned);
        assert!(!runtime.lacp_up);
    }

    #[test]
    fn actor_system_mismatch_is_rejected() {
        let mut runtime = PortRuntime::new();
        let pdu = LacpPdu { partner_system: MacAddress::ZERO, actor_synchronization: true, actor_collecting: true, actor_distributing: true };
        let result = receive_pdu(0, port(1), 1, &[vlan(100)], &mut runtime, pdu, partner(), false, 30);
        assert!(result.is_err());
    }

    #[test]
    fn expiry_forces_down_after_timeout() {
        let mut runtime = PortRuntime::new();
        runtime.lacp_up = true;
        runtime.last_lacp_update = Some(0);
        assert!(expire(10, port(1), 1, &mut runtime, 5).is_some());
        assert!(!runtime.lacp_up);
    }

    #[test]
    fn unchanged_pdu_does_not_reply_before_the_interval_elapses() {
        let mut runtime = PortRuntime::new();
        let pdu = LacpPdu { partner_system: partner(), actor_synchronization: true, actor_collecting: true, actor_distributing: true };
        let first = receive_pdu(0, port(1), 1, &[vlan(100)], &mut runtime, pdu, partner(), false, 30).unwrap();
        assert!(first.send_reply);

        let second = receive_pdu(10, port(1), 1, &[vlan(100)], &mut runtime, pdu, partner(), false, 30).unwrap();
        assert!(!second.transitioned);
        assert!(!second.send_reply);
    }

    #[test]
    fn unchanged_pdu_replies_again_once_the_interval_elapses() {
        let mut runtime = PortRuntime::new();
        let pdu = LacpPdu { partner_system: partner(), actor_synchronization: true, actor_collecting: true, actor_distributing: true };
        receive_pdu(0, port(1), 1, &[vlan(100)], &mut runtime, pdu, partner(), false, 30).unwrap();

        let outcome = receive_pdu(31, port(1), 1, &[vlan(100)], &mut runtime, pdu, partner(), false, 30).unwrap();
        assert!(!outcome.transitioned);
        assert!(outcome.send_reply);
    }

    #[test]
    fn passthrough_down_suppresses_the_reply_even_on_change() {
        let mut runtime = PortRuntime::new();
        let pdu = LacpPdu { partner_system: partner(), actor_synchronization: true, actor_collecting: true, actor_distributing: true };
        let outcome = receive_pdu(0, port(1), 1, &[vlan(100)], &mut runtime, pdu, partner(), true, 30).unwrap();
        assert!(!outcome.send_reply);
    }

    #[test]
    fn forwarding_only_on_root_when_stacked() {
        assert!(lacp_forwarding(false, false));
        assert!(lacp_forwarding(true, true));
        assert!(!lacp_forwarding(true, false));
    }
}
