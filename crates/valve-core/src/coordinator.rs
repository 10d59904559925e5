//! Owns every `Valve` in a stack and is the only caller allowed to invoke
//! cross-datapath paths: stack topology fan-out after a link transition,
//! and tunnel ACL recompilation that spans more than one DP.

use crate::acl::Acl;
use crate::error::Result;
use crate::metrics::MetricSink;
use crate::model::dp::DpConfig;
use crate::model::port::PortConfig;
use crate::model::stack::{StackEdge, StackTopology};
use crate::model::vlan::VlanConfig;
use crate::notify::NotifySink;
use crate::stacklink::StateChange;
use crate::valve::{PktMeta, Valve, ValveOutput};
use std::collections::HashMap;
use std::sync::Arc;
use valve_types::{DpId, PortNo};

/// A single datapath's config bundle, as handed to `Valve::new`.
pub struct DpBundle {
    pub config: DpConfig,
    pub ports: Vec<PortConfig>,
    pub vlans: Vec<VlanConfig>,
    /// Named ACL catalog for this DP, resolved against port/VLAN
    /// `acl_in`/`acl_out` bindings by the Valve itself.
    pub acls: Vec<Acl>,
}

/// Every Valve's output for one dispatched event, keyed by datapath.
pub type FanOut = HashMap<DpId, ValveOutput>;

/// Arena of per-datapath Valves plus the stack topology spanning them.
/// Holds no OpenFlow transport itself; a caller pulls `FanOut` and is
/// responsible for delivering each DP's messages to its own connection.
pub struct Coordinator {
    valves: HashMap<DpId, Valve>,
    topology: StackTopology,
    acls: HashMap<String, Acl>,
    metrics: Arc<dyn MetricSink>,
    notify: Arc<dyn NotifySink>,
}

impl Coordinator {
    pub fn new(
        bundles: Vec<DpBundle>,
        stack_root: Option<DpId>,
        stack_edges: Vec<StackEdge>,
        metrics: Arc<dyn MetricSink>,
        notify: Arc<dyn NotifySink>,
    ) -> Self {
        let root = stack_root.unwrap_or_else(|| bundles.first().map(|b| b.config.id).unwrap_or(DpId::new(0)));
        let topology = StackTopology::new(root, stack_edges);
        let valves = bundles
            .into_iter()
            .map(|b| (b.config.id, Valve::new(b.config, b.ports, b.vlans, b.acls, metrics.clone(), notify.clone())))
            .collect();

        Self { valves, topology, acls: HashMap::new(), metrics, notify }
    }

    pub fn valve(&self, dp: DpId) -> Option<&Valve> {
        self.valves.get(&dp)
    }

    pub fn valve_mut(&mut self, dp: DpId) -> Option<&mut Valve> {
        self.valves.get_mut(&dp)
    }

    pub fn dp_ids(&self) -> impl Iterator<Item = &DpId> {
        self.valves.keys()
    }

    pub fn install_acl(&mut self, acl: Acl) {
        self.acls.insert(acl.name.clone(), acl);
    }

    /// Dispatches a cold-start connect to a single DP; the result only
    /// ever addresses that DP.
    pub fn datapath_connect(&mut self, dp: DpId, now: u64, up_ports: &[PortNo]) -> Option<ValveOutput> {
        let valve = self.valves.get_mut(&dp)?;
        Some(valve.datapath_connect(now, up_ports))
    }

    pub fn datapath_disconnect(&mut self, dp: DpId) -> Option<ValveOutput> {
        let valve = self.valves.get_mut(&dp)?;
        Some(valve.datapath_disconnect())
    }

    /// Dispatches a packet-in to `dp` and, when that DP has
    /// `stack_route_learning` enabled and is not the stack root, also
    /// learns the host on every other DP's stack port toward `dp` so the
    /// rest of the stack can reach it without flooding.
    pub fn rcv_packet(&mut self, dp: DpId, now: u64, pkt: PktMeta) -> Result<FanOut> {
        let valve = self.valves.get_mut(&dp).ok_or(crate::error::ValveError::UnknownDatapath(dp))?;
        let route_learning = pkt.vlan.is_some() && valve.config().stack_route_learning && self.topology.root() != Some(dp);
        let primary = valve.rcv_packet(now, pkt.clone())?;

        let mut out = FanOut::new();
        out.insert(dp, primary);

        if route_learning {
            let peers: Vec<DpId> = self.valves.keys().copied().filter(|&p| p != dp).collect();
            for peer in peers {
                let Some(port) = self.topology.path_port(peer, dp) else { continue };
                let peer_pkt = PktMeta { in_port: port, ..pkt.clone() };
                if let Some(peer_valve) = self.valves.get_mut(&peer) {
                    if let Ok(result) = peer_valve.rcv_packet(now, peer_pkt) {
                        out.insert(peer, result);
                    }
                }
            }
        }

        Ok(out)
    }

    /// Toggles a stack link and, on a state transition, fans out to every
    /// Valve in the arena: each recomputes its VLAN flood programming
    /// against the new topology, deletes host state on its own stack
    /// ports (whatever used to be reachable through them may no longer
    /// be), and, if any tunnel-bearing ACL is installed, recompiles it.
    pub fn set_stack_link_state(&mut self, dp: DpId, port: PortNo, peer: (DpId, PortNo), up: bool) -> FanOut {
        self.topology.set_link_state(dp, port, up);
        self.topology.set_link_state(peer.0, peer.1, up);

        let tunnel_acls: Vec<Acl> = self.acls.values().filter(|a| crate::acl::has_tunnel_actions(a)).cloned().collect();

        let mut out = FanOut::new();
        for (this_dp, valve) in self.valves.iter_mut() {
            let mut ofmsgs = valve.recompute_flood_for_stack_topology(&self.topology, crate::flood::StackFloodMode::NoReflection);
            ofmsgs.extend(valve.expire_hosts_on_stack_ports());

            if !tunnel_acls.is_empty() {
                let recompiled = crate::acl::recompile_tunnel_acls(&tunnel_acls, &self.topology, *this_dp);
                ofmsgs.extend(recompiled.into_iter().filter_map(|r| r.ok()).flatten());
            }

            if !ofmsgs.is_empty() {
                out.insert(*this_dp, ValveOutput { ofmsgs, notifications: vec![] });
            }
        }
        out
    }

    /// Runs `fast_state_expire` for every DP and folds any stack state
    /// transition into the shared topology so flood/ACL recompilation
    /// sees a consistent view across the whole arena.
    pub fn fast_state_expire(&mut self, now: u64, send_interval: u64, max_lldp_lost: u64) -> Vec<(DpId, PortNo, StateChange)> {
        let mut transitions = Vec::new();
        for (dp, valve) in self.valves.iter_mut() {
            for (port, change) in valve.fast_state_expire(now, send_interval, max_lldp_lost) {
                let up = matches!(change, StateChange::TransitionedUp);
                self.topology.set_link_state(*dp, port, up);
                transitions.push((*dp, port, change));
            }
        }
        transitions
    }

    /// Runs the idle/LACP/route state_expire sweep across every DP.
    pub fn state_expire(&mut self, now: u64, lacp_timeout: u64) -> FanOut {
        self.valves.iter_mut().map(|(dp, valve)| (*dp, valve.state_expire(now, lacp_timeout))).collect()
    }

    pub fn resolve_gateways(&mut self, now: u64, max_per_cycle: u32, retry_ceiling: u32, backoff_base: u64, backoff_max: u64) -> Result<FanOut> {
        let mut out = FanOut::new();
        for (dp, valve) in self.valves.iter_mut() {
            let result = valve.resolve_gateways(now, max_per_cycle, retry_ceiling, backoff_base, backoff_max)?;
            out.insert(*dp, result);
        }
        Ok(out)
    }

    /// Runs `advertise` across every DP in the arena.
    pub fn advertise(&mut self, now: u64) -> FanOut {
        self.valves.iter_mut().map(|(dp, valve)| (*dp, valve.advertise(now))).collect()
    }

    /// Runs `fast_advertise` across every DP in the arena.
    pub fn fast_advertise(&mut self, now: u64) -> FanOut {
        self.valves.iter_mut().map(|(dp, valve)| (*dp, valve.fast_advertise(now))).collect()
    }

    /// Routes a hardware flow-removed event to the DP it was reported on.
    pub fn flow_timeout(&mut self, dp: DpId, now: u64, table: crate::ofmsg::TableName, m: crate::ofmsg::Match) -> Result<ValveOutput> {
        match self.valves.get_mut(&dp) {
            Some(valve) => valve.flow_timeout(now, table, m),
            None => Err(crate::error::ValveError::UnknownDatapath(dp)),
        }
    }

    pub fn stack_root(&self) -> Option<DpId> {
        self.topology.root()
    }

    pub fn is_stack_connected(&self) -> bool {
        self.topology.is_connected()
    }
}
