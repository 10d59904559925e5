//! MAC learning: host cache maintenance, move detection, learn-ban, and
//! permanent-learn pinning.

use crate::error::{HostError, Result};
use crate::model::vlan::{HostEntry, VlanConfig, VlanRuntime};
use crate::ofmsg::{Action, FlowMod, Instructions, Match, OfMsg, TableName, VlanAction};
use valve_common::{audit_log, debug_log, info_log, warn_log};
use valve_common::{AuditCategory, AuditRecord};
use valve_types::{MacAddress, PortNo};

const SOURCE: &str = "valve_core::host";

/// Outcome of a learn attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnResult {
    pub flows: Vec<OfMsg>,
    pub previous_port: Option<PortNo>,
    pub update_cache: bool,
}

fn vlan_action_for_port(config: &VlanConfig, port: PortNo) -> VlanAction {
    if config.is_tagged(port) {
        VlanAction::Push(config.vid)
    } else {
        VlanAction::Pop
    }
}

/// Learns `mac` on `port`@`vlan`. Returns the flows to install (and any
/// stale flows to delete first), the MAC's previous port if this is a
/// move, and whether the in-memory host cache should be updated by the
/// caller (it is not, to keep this function free of interior mutation
/// beyond the runtime it is explicitly given).
pub fn learn_host_on_vlan_ports(
    now: u64,
    port: PortNo,
    vlan: &VlanConfig,
    runtime: &mut VlanRuntime,
    mac: MacAddress,
    permanent_learn: bool,
) -> Result<LearnResult> {
    if mac.is_multicast() || mac.is_zero() {
        return Err(HostError::InvalidSourceMac(mac).into());
    }

    if runtime.is_learn_banned(now) {
        runtime.learn_bans += 1;
        debug_log!(SOURCE, "learn suppressed by learn-ban on vlan {}", vlan.vid);
        return Ok(LearnResult { flows: vec![], previous_port: None, update_cache: false });
    }

    let previous = runtime.host_cache.get(&mac).copied();

    if let Some(prev) = previous {
        if prev.port == port {
            runtime.host_cache.touch(&mac, now);
            return Ok(LearnResult { flows: vec![], previous_port: Some(prev.port), update_cache: false });
        }
    }

    if vlan.learn_jitter > 0 && runtime.record_learn_attempt(now) > vlan.learn_jitter {
        runtime.learn_ban_until = Some(now + vlan.learn_ban_timeout);
        runtime.learn_bans += 1;
        warn_log!(SOURCE, "learn rate on vlan {} exceeded learn_jitter, banning new learns for {}s", vlan.vid, vlan.learn_ban_timeout);
        return Ok(LearnResult { flows: vec![], previous_port: previous.map(|p| p.port), update_cache: false });
    }

    if let Some(prev) = previous {
        if permanent_learn {
            debug_log!(SOURCE, "ignoring move of permanently-learned {} away from {}", mac, prev.port);
            return Ok(LearnResult { flows: vec![], previous_port: Some(prev.port), update_cache: false });
        }
        if now.saturating_sub(prev.last_move) < vlan.cache_update_guard_time {
            warn_log!(SOURCE, "move of {} on vlan {} rate-limited by cache_update_guard_time", mac, vlan.vid);
            return Ok(LearnResult { flows: vec![], previous_port: Some(prev.port), update_cache: false });
        }
    }

    let mut flows = Vec::new();
    if let Some(prev) = previous {
        flows.push(OfMsg::FlowMod(FlowMod::delete(
            TableName::EthSrc,
            Match::default().with_eth_src(mac).with_in_port(prev.port),
        )));
        flows.push(OfMsg::FlowMod(FlowMod::delete(
            TableName::EthDst,
            Match::default().with_eth_dst(mac).with_vlan(vlan.vid),
        )));
        info_log!(SOURCE, "{} moved from {} to {} on vlan {}", mac, prev.port, port, vlan.vid);
        audit_log!(
            AuditRecord::new(AuditCategory::NetworkConfig, SOURCE, "host_move")
                .with_object_id(mac.to_string())
                .with_details(serde_json::json!({
                    "vlan": vlan.vid.as_u16(),
                    "from": prev.port.as_u32(),
                    "to": port.as_u32(),
                }))
        );
    }

    let src_match = Match::default().with_in_port(port).with_eth_src(mac).with_vlan(vlan.vid);
    flows.push(OfMsg::FlowMod(
        FlowMod::add(TableName::EthSrc, 0, src_match, Instructions { actions: vec![], goto: None })
            .with_idle_timeout(vlan.idle_timeout)
            .with_hard_timeout(vlan.hard_timeout),
    ));

    let dst_match = Match::default().with_eth_dst(mac).with_vlan(vlan.vid);
    let vlan_action = vlan_action_for_port(vlan, port);
    let dst_instructions = Instructions {
        actions: vec![Action::SetVlan(vlan_action), Action::Output(port)],
        goto: None,
    };
    flows.push(OfMsg::FlowMod(
        FlowMod::add(TableName::EthDst, 0, dst_match, dst_instructions)
            .with_idle_timeout(vlan.idle_timeout)
            .with_hard_timeout(vlan.hard_timeout),
    ));

    if previous.is_none() {
        info_log!(SOURCE, "learned {} on port {} vlan {}", mac, port, vlan.vid);
    }

    runtime.host_cache.insert(mac, HostEntry { port, last_move: now }, now);

    Ok(LearnResult { flows, previous_port: previous.map(|p| p.port), update_cache: true })
}

/// True when this frame crosses the VLAN's router MAC in either
/// direction, i.e. it is inter-VLAN routed traffic rather than a plain
/// same-VLAN host-to-host frame.
pub fn is_router_traffic(vlan: &VlanConfig, eth_src: MacAddress, eth_dst: MacAddress) -> bool {
    match vlan.faucet_mac {
        Some(router_mac) => eth_src == router_mac || eth_dst == router_mac,
        None => false,
    }
}

/// For routed traffic (`is_router_traffic`), refreshes the `eth_dst`
/// rewrite flow for the non-router peer on `port` at a priority above the
/// plain learn flow, so the routed binding survives independently of
/// ordinary host-cache churn. `None` if this frame isn't router traffic.
pub fn router_rewrite_flow(vlan: &VlanConfig, port: PortNo, eth_src: MacAddress, eth_dst: MacAddress) -> Option<OfMsg> {
    let router_mac = vlan.faucet_mac?;
    if !is_router_traffic(vlan, eth_src, eth_dst) {
        return None;
    }
    let peer_mac = if eth_src == router_mac { eth_dst } else { eth_src };
    let dst_match = Match::default().with_eth_dst(peer_mac).with_vlan(vlan.vid);
    let vlan_action = vlan_action_for_port(vlan, port);
    let instructions = Instructions { actions: vec![Action::SetVlan(vlan_action), Action::Output(port)], goto: None };
    Some(OfMsg::FlowMod(
        FlowMod::add(TableName::EthDst, 1, dst_match, instructions)
            .with_idle_timeout(vlan.idle_timeout)
            .with_hard_timeout(vlan.hard_timeout),
    ))
}

/// Expires hosts whose last-seen time exceeds the VLAN's configured
/// timeout, for datapaths relying on the wall-clock fallback sweep rather
/// than (or in addition to) flow-removed events.
pub fn expire_stale_hosts(now: u64, vlan: &VlanConfig, runtime: &mut VlanRuntime) -> Vec<MacAddress> {
    runtime.host_cache.expire_older_than(now, vlan.idle_timeout.max(1) as u64)
}

/// Drops every host cached on one of `ports` and returns the evicted
/// (MAC, port) pairs, e.g. because a stack link transition invalidated
/// what used to be reachable through it.
pub fn purge_hosts_on_ports(runtime: &mut VlanRuntime, ports: &[PortNo]) -> Vec<(MacAddress, PortNo)> {
    let stale: Vec<(MacAddress, PortNo)> = runtime
        .host_cache
        .iter()
        .filter(|(_, entry)| ports.contains(&entry.port))
        .map(|(mac, entry)| (*mac, entry.port))
        .collect();
    for (mac, _) in &stale {
        runtime.host_cache.remove(mac);
    }
    stale
}
