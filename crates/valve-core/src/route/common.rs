//! IP-version-agnostic routing logic: FIB programming, neighbor
//! resolution gating (token bucket + exponential backoff), and
//! longest-prefix-match priority derivation shared by the v4 and v6
//! route managers.

use crate::error::{Result, RouteError};
use crate::ofmsg::{Action, FlowMod, Instructions, Match, OfMsg, TableName};
use serde::{Deserialize, Serialize};
use valve_common::ExponentialBackoff;
use valve_types::{IpAddress, IpPrefix, MacAddress, VlanId};

/// A single FIB entry: destination prefix routed via a resolved or
/// pending next hop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub prefix: IpPrefix,
    pub next_hop: IpAddress,
}

/// Per-route-manager neighbor resolution state: one backoff per
/// unresolved next hop, retried up to `max_retry_count` times.
#[derive(Debug, Clone)]
pub struct ResolveState {
    pub backoff: ExponentialBackoff,
    pub retries: u32,
}

impl ResolveState {
    pub fn new(base: u64, max: u64) -> Self {
        Self { backoff: ExponentialBackoff::new(base, max), retries: 0 }
    }
}

/// Bounds how many neighbor resolution attempts are sent per
/// `resolve_gateways` pass, per `max_hosts_per_resolve_cycle`.
#[derive(Debug, Clone, Copy)]
pub struct ResolveBudget {
    remaining: u32,
}

impl ResolveBudget {
    pub fn new(max_per_cycle: u32) -> Self {
        Self { remaining: max_per_cycle }
    }

    pub fn take(&mut self) -> bool {
        if self.remaining == 0 {
            false
        } else {
            self.remaining -= 1;
            true
        }
    }
}

fn table_for(table_v4: TableName, table_v6: TableName, prefix: &IpPrefix) -> TableName {
    match prefix.address() {
        IpAddress::V4(_) => table_v4,
        IpAddress::V6(_) => table_v6,
    }
}

/// Installs a VIP: packets destined to this address are sent to the
/// controller for local delivery (ARP reply / ND solicitation / ICMP).
pub fn install_vip(vlan: VlanId, vip: IpPrefix) -> OfMsg {
    let m = match vip.address() {
        IpAddress::V4(addr) => Match { arp_tpa: Some(addr.inner()), ..Match::default().with_vlan(vlan) },
        IpAddress::V6(_) => Match::default().with_vlan(vlan),
    };
    OfMsg::FlowMod(FlowMod::add(
        TableName::Vip,
        vip.fib_priority(),
        m,
        Instructions { actions: vec![Action::OutputController { max_len: 256 }], goto: None },
    ))
}

/// Installs a FIB entry routing `route.prefix` via the resolved
/// `gateway_mac` on `vlan`, decrementing TTL and rewriting the
/// destination MAC to the gateway's.
pub fn install_fib_entry(
    vlan: VlanId,
    route: RouteEntry,
    gateway_mac: MacAddress,
    table_v4: TableName,
    table_v6: TableName,
) -> Result<OfMsg> {
    let table = table_for(table_v4, table_v6, &route.prefix);
    let m = match route.prefix.address() {
        IpAddress::V4(addr) => Match::default().with_vlan(vlan).with_ipv4_dst(addr.inner(), route.prefix.prefix_len()),
        IpAddress::V6(addr) => Match::default().with_vlan(vlan).with_ipv6_dst(addr.inner(), route.prefix.prefix_len()),
    };
    let instructions = Instructions {
        actions: vec![Action::DecTtl, Action::SetEthDst(gateway_mac), Action::GotoTable(TableName::EthDst)],
        goto: None,
    };
    Ok(OfMsg::FlowMod(FlowMod::add(table, route.prefix.fib_priority(), m, instructions)))
}

/// Deletes a FIB entry for `prefix`, e.g. because its next hop expired.
pub fn delete_fib_entry(vlan: VlanId, prefix: IpPrefix, table_v4: TableName, table_v6: TableName) -> OfMsg {
    let table = table_for(table_v4, table_v6, &prefix);
    let m = match prefix.address() {
        IpAddress::V4(addr) => Match::default().with_vlan(vlan).with_ipv4_dst(addr.inner(), prefix.prefix_len()),
        IpAddress::V6(addr) => Match::default().with_vlan(vlan).with_ipv6_dst(addr.inner(), prefix.prefix_len()),
    };
    OfMsg::FlowMod(FlowMod::delete(table, m))
}

/// Returns `Err` if the route's next hop is unresolved and a caller tried
/// to install it directly rather than going through the resolve path.
pub fn require_resolved(route: &RouteEntry, gateway_mac: Option<MacAddress>) -> Result<MacAddress> {
    gateway_mac.ok_or(RouteError::Unresolved(route.prefix).into())
}
