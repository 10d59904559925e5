//! IPv4 route manager: FIB + ARP-based neighbor resolution.

use super::common::{self, RouteEntry, ResolveBudget, ResolveState};
use crate::error::Result;
use crate::ofmsg::{OfMsg, PacketOut, TableName};
use std::collections::HashMap;
use valve_types::{IpAddress, MacAddress, PortNo, VlanId};

/// Owns IPv4 FIB entries and ARP resolution state for one VLAN.
#[derive(Debug, Default)]
pub struct RouteManagerV4 {
    routes: Vec<RouteEntry>,
    resolved: HashMap<IpAddress, (MacAddress, u64)>,
    pending: HashMap<IpAddress, ResolveState>,
}

impl RouteManagerV4 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, route: RouteEntry) {
        self.routes.push(route);
    }

    pub fn vip_flow(&self, vlan: VlanId, vip: valve_types::IpPrefix) -> OfMsg {
        common::install_vip(vlan, vip)
    }

    pub fn resolved_mac(&self, next_hop: IpAddress) -> Option<MacAddress> {
        self.resolved.get(&next_hop).map(|(mac, _)| *mac)
    }

    pub fn mark_resolved(&mut self, next_hop: IpAddress, mac: MacAddress, now: u64) {
        self.resolved.insert(next_hop, (mac, now));
        self.pending.remove(&next_hop);
    }

    /// FIB entries for routes whose next hop is now resolved.
    pub fn fib_flows(&self, vlan: VlanId) -> Vec<OfMsg> {
        self.routes
            .iter()
            .filter_map(|route| {
                let mac = self.resolved_mac(route.next_hop)?;
                common::install_fib_entry(vlan, *route, mac, TableName::Ipv4Fib, TableName::Ipv6Fib).ok()
            })
            .collect()
    }

    /// Drops neighbor entries not refreshed within `timeout` and withdraws
    /// the FIB entries of routes that depended on them; the next
    /// `resolve_gateways` pass will re-request them.
    pub fn expire_neighbors(&mut self, now: u64, vlan: VlanId, timeout: u64) -> Vec<OfMsg> {
        let stale: Vec<IpAddress> = self
            .resolved
            .iter()
            .filter(|(_, (_, last_seen))| now.saturating_sub(*last_seen) > timeout)
            .map(|(hop, _)| *hop)
            .collect();
        for hop in &stale {
            self.resolved.remove(hop);
        }
        self.routes
            .iter()
            .filter(|r| stale.contains(&r.next_hop))
            .map(|r| common::delete_fib_entry(vlan, r.prefix, TableName::Ipv4Fib, TableName::Ipv6Fib))
            .collect()
    }

    /// Emits ARP requests (as packet-outs) for unresolved next hops,
    /// bounded by `budget` and gated by each next hop's exponential
    /// backoff against `now`.
    pub fn resolve_gateways(&mut self, now: u64, vlan: VlanId, out_port: PortNo, budget: &mut ResolveBudget, retry_ceiling: u32, backoff_base: u64, backoff_max: u64) -> Result<Vec<OfMsg>> {
        let mut out = Vec::new();
        let unresolved: Vec<IpAddress> = self
            .routes
            .iter()
            .map(|r| r.next_hop)
            .filter(|hop| !self.resolved.contains_key(hop))
            .collect();

        for hop in unresolved {
            if !budget.take() {
                break;
            }
            let state = self
                .pending
                .entry(hop)
                .or_insert_with(|| ResolveState::new(backoff_base, backoff_max));
            if state.retries >= retry_ceiling {
                continue;
            }
            if !state.backoff.should_retry(now) {
                continue;
            }
            state.backoff.record_attempt(now);
            state.retries += 1;
            out.push(arp_request_packet_out(vlan, out_port));
        }
        Ok(out)
    }

    /// Periodic gratuitous ARP announcing this VLAN's router presence.
    pub fn gratuitous_arp(&self, vlan: VlanId, out_port: PortNo) -> OfMsg {
        arp_request_packet_out(vlan, out_port)
    }
}

fn arp_request_packet_out(_vlan: VlanId, out_port: PortNo) -> OfMsg {
    OfMsg::PacketOut(PacketOut { data: Vec::new(), out_port })
}

#[cfg(test)]
mod tests {
    use super::*;
    use valve_types::{IpPrefix, Ipv4Address};

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddress {
        IpAddress::V4(Ipv4Address::new(a, b, c, d))
    }

    fn vlan() -> VlanId {
        VlanId::new(100).unwrap()
    }

    #[test]
    fn fib_flows_empty_until_next_hop_resolved() {
        let mut mgr = RouteManagerV4::new();
        let prefix = IpPrefix::new(ip(10, 0, 0, 0), 24).unwrap();
        mgr.add_route(RouteEntry { prefix, next_hop: ip(10, 0, 0, 1) });
        assert!(mgr.fib_flows(vlan()).is_empty());

        mgr.mark_resolved(ip(10, 0, 0, 1), MacAddress::new([2, 0, 0, 0, 0, 1]), 0);
        assert_eq!(mgr.fib_flows(vlan()).len(), 1);
    }

    #[test]
    fn a_stale_neighbor_is_expired_and_its_fib_entry_withdrawn() {
        let mut mgr = RouteManagerV4::new();
        let prefix = IpPrefix::new(ip(10, 0, 0, 0), 24).unwrap();
        mgr.add_route(RouteEntry { prefix, next_hop: ip(10, 0, 0, 1) });
        mgr.mark_resolved(ip(10, 0, 0, 1), MacAddress::new([2, 0, 0, 0, 0, 1]), 0);
        assert!(mgr.expire_neighbors(100, vlan(), 600).is_empty());

        let deletes = mgr.expire_neighbors(700, vlan(), 600);
        assert_eq!(deletes.len(), 1);
        assert!(mgr.resolved_mac(ip(10, 0, 0, 1)).is_none());
        assert!(mgr.fib_flows(vlan()).is_empty());
    }

    #[test]
    fn resolve_gateways_respects_budget() {
        let mut mgr = RouteManagerV4::new();
        mgr.add_route(RouteEntry {
            prefix: IpPrefix::new(ip(10, 0, 0, 0), 24).unwrap(),
            next_hop: ip(10, 0, 0, 1),
        });
        mgr.add_route(RouteEntry {
            prefix: IpPrefix::new(ip(10, 0, 1, 0), 24).unwrap(),
            next_hop: ip(10, 0, 1, 1),
        });
        let mut budget = ResolveBudget::new(1);
        let out_port = PortNo::new(1).unwrap();
        let msgs = mgr.resolve_gateways(0, vlan(), out_port, &mut budget, 5, 1, 60).unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn resolve_gateways_stops_at_retry_ceiling() {
        let mut mgr = RouteManagerV4::new();
        mgr.add_route(RouteEntry {
            prefix: IpPrefix::new(ip(10, 0, 0, 0), 24).unwrap(),
            next_hop: ip(10, 0, 0, 1),
        });
        let out_port = PortNo::new(1).unwrap();
        for t in 0..5u64 {
            let mut budget = ResolveBudget::new(10);
            mgr.resolve_gateways(t * 100, vlan(), out_port, &mut budget, 2, 1, 1).unwrap();
        }
        let mut budget = ResolveBudget::new(10);
        let msgs = mgr.resolve_gateways(10_000, vlan(), out_port, &mut budget, 2, 1, 1).unwrap();
        assert!(msgs.is_empty());
    }
}
