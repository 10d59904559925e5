//! The Valve Core: lifecycle, event dispatch, configuration
//! reconciliation, and packet-in routing for a single datapath.

use crate::acl::{self, Acl};
use crate::error::{ConfigError, Result, ValveError};
use crate::hardware::{HardwareProfile, StaticProfile};
use crate::host;
use crate::lacp::{self, LacpPdu};
use crate::metrics::{Metric, MetricSink};
use crate::model::dp::{DpConfig, DpRuntime};
use crate::model::port::{PortConfig, PortRuntime};
use crate::model::vlan::{VlanConfig, VlanRuntime};
use crate::notify::{Notification, NotifySink};
use crate::ofmsg::{valve_flowreorder, FlowMod, Match, OfMsg, TableName};
use crate::pipeline::Pipeline;
use crate::route::{RouteManagerV4, RouteManagerV6, ResolveBudget};
use std::collections::HashMap;
use std::sync::Arc;
use valve_common::{audit_log, debug_log, warn_log};
use valve_common::{AuditCategory, AuditRecord};
use valve_types::{MacAddress, PortNo, VlanId};

const SOURCE: &str = "valve_core::valve";

/// Bundle of messages addressed to this Valve's own datapath plus any
/// structured notifications raised along the way. Cross-Valve fan-out is
/// the Coordinator's job; a bare Valve only ever produces output for
/// itself.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValveOutput {
    pub ofmsgs: Vec<OfMsg>,
    pub notifications: Vec<Notification>,
}

impl ValveOutput {
    fn reordered(mut self, cold_start: bool, profile: &dyn HardwareProfile) -> Self {
        self.ofmsgs = valve_flowreorder(self.ofmsgs, cold_start, profile);
        self
    }
}

/// A received packet, pre-parsed by the external shim down to the fields
/// the core needs to classify it.
#[derive(Debug, Clone, PartialEq)]
pub struct PktMeta {
    pub in_port: PortNo,
    pub vlan: Option<VlanId>,
    pub eth_src: MacAddress,
    pub eth_dst: MacAddress,
    pub eth_type: u16,
}

const LLDP_ETHERTYPE: u16 = 0x88cc;
const LACP_ETHERTYPE: u16 = 0x8809;

struct VlanState {
    config: VlanConfig,
    runtime: VlanRuntime,
    route4: RouteManagerV4,
    route6: RouteManagerV6,
}

struct PortState {
    config: PortConfig,
    runtime: PortRuntime,
}

/// Diff between an outgoing and incoming `DpConfig`, used to decide warm
/// vs. cold reload.
#[derive(Debug, Clone, Default)]
pub struct ConfigDiff {
    pub deleted_ports: Vec<PortNo>,
    pub changed_ports: Vec<PortNo>,
    /// Ports whose own `acl_in`/`acl_out` binding changed, or whose VLAN's
    /// `acl_in` list changed, since the outgoing config.
    pub changed_acl_ports: Vec<PortNo>,
    pub deleted_vids: Vec<VlanId>,
    pub changed_vids: Vec<VlanId>,
    pub all_ports_changed: bool,
    pub pipeline_changed: bool,
}

impl ConfigDiff {
    pub fn compute(
        old: &DpConfig,
        new: &DpConfig,
        old_ports: &[PortConfig],
        new_ports: &[PortConfig],
        old_vlans: &[VlanConfig],
        new_vlans: &[VlanConfig],
    ) -> Self {
        let old_port_set = old.port_set();
        let new_port_set = new.port_set();
        let old_vlan_set = old.vlan_set();
        let new_vlan_set = new.vlan_set();

        let old_port_by_no: HashMap<PortNo, &PortConfig> = old_ports.iter().map(|p| (p.number, p)).collect();
        let new_port_by_no: HashMap<PortNo, &PortConfig> = new_ports.iter().map(|p| (p.number, p)).collect();
        let old_vlan_acl: HashMap<VlanId, &[String]> = old_vlans.iter().map(|v| (v.vid, v.acl_in.as_slice())).collect();
        let new_vlan_acl: HashMap<VlanId, &[String]> = new_vlans.iter().map(|v| (v.vid, v.acl_in.as_slice())).collect();

        let changed_acl_ports = new_port_set
            .intersection(&old_port_set)
            .copied()
            .filter(|no| {
                let (Some(op), Some(np)) = (old_port_by_no.get(no), new_port_by_no.get(no)) else {
                    return false;
                };
                if op.acl_in != np.acl_in || op.acl_out != np.acl_out {
                    return true;
                }
                np.tagged_vlans
                    .iter()
                    .chain(np.native_vlan.iter())
                    .any(|vid| old_vlan_acl.get(vid).copied().unwrap_or(&[]) != new_vlan_acl.get(vid).copied().unwrap_or(&[]))
            })
            .collect();

        Self {
            deleted_ports: old_port_set.difference(&new_port_set).copied().collect(),
            changed_ports: old_port_set.intersection(&new_port_set).copied().collect(),
            changed_acl_ports,
            deleted_vids: old_vlan_set.difference(&new_vlan_set).copied().collect(),
            changed_vids: old_vlan_set.intersection(&new_vlan_set).copied().collect(),
            all_ports_changed: old_port_set.is_disjoint(&new_port_set) && !old_port_set.is_empty(),
            pipeline_changed: !old.same_table_set(new),
        }
    }

    pub fn requires_cold_start(&self) -> bool {
        self.pipeline_changed || self.all_ports_changed
    }
}

/// A per-datapath forwarding controller. Every public method is a pure
/// transformation of `(self, event, now)` into `(self', ValveOutput)` —
/// no method blocks and no method reads a clock.
pub struct Valve {
    config: DpConfig,
    runtime: DpRuntime,
    pipeline: Pipeline,
    profile: StaticProfile,
    vlans: HashMap<VlanId, VlanState>,
    ports: HashMap<PortNo, PortState>,
    /// Named ACL definitions available to this DP; which ones compile to
    /// flows is decided by port `acl_in`/`acl_out` and VLAN `acl_in`
    /// bindings, not by membership in this list alone.
    acl_defs: Vec<Acl>,
    metrics: Arc<dyn MetricSink>,
    notify: Arc<dyn NotifySink>,
    /// Wall-clock second the current `packet_in_counter` was accumulated
    /// in; reset (along with the counter) whenever `now` moves past it.
    last_packet_in_sec: Option<u64>,
    packet_in_counter: u64,
    ignore_learn_ins: u64,
}

impl Valve {
    pub fn new(
        config: DpConfig,
        port_configs: Vec<PortConfig>,
        vlan_configs: Vec<VlanConfig>,
        acl_defs: Vec<Acl>,
        metrics: Arc<dyn MetricSink>,
        notify: Arc<dyn NotifySink>,
    ) -> Self {
        let profile = StaticProfile::for_kind(config.hardware);
        let pipeline = Pipeline::new(config.tables.clone());
        let vlans = vlan_configs
            .into_iter()
            .map(|vc| {
                let runtime = VlanRuntime::new(vc.host_cache_limit);
                let mut route4 = RouteManagerV4::new();
                let mut route6 = RouteManagerV6::new();
                for route in &vc.routes {
                    match route.next_hop {
                        valve_types::IpAddress::V4(_) => route4.add_route(*route),
                        valve_types::IpAddress::V6(_) => route6.add_route(*route),
                    }
                }
                (vc.vid, VlanState { config: vc, runtime, route4, route6 })
            })
            .collect();
        let ports = port_configs
            .into_iter()
            .map(|pc| (pc.number, PortState { config: pc, runtime: PortRuntime::new() }))
            .collect();

        Self {
            config,
            runtime: DpRuntime::new(),
            pipeline,
            profile,
            vlans,
            ports,
            acl_defs,
            metrics,
            notify,
            last_packet_in_sec: None,
            packet_in_counter: 0,
            ignore_learn_ins: 0,
        }
    }

    pub fn dp_id(&self) -> valve_types::DpId {
        self.config.id
    }

    pub fn config(&self) -> &DpConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.runtime.running
    }

    /// Cold start: table features, default miss policy per table, port
    /// programming for every initially-up port.
    pub fn datapath_connect(&mut self, now: u64, up_ports: &[PortNo]) -> ValveOutput {
        self.runtime.running = true;
        self.runtime.last_cold_start = Some(now);
        self.runtime.up_ports = up_ports.iter().copied().collect();

        let mut ofmsgs = self.pipeline.cold_start_messages(&self.profile);
        for port in up_ports {
            if let Some(state) = self.ports.get_mut(port) {
                state.runtime.up = true;
            }
        }
        ofmsgs.extend(self.standalone_flood_flows_for_all_vlans());
        ofmsgs.extend(self.vip_flows_for_all_vlans());
        match self.compile_acls() {
            Ok(flows) => ofmsgs.extend(flows),
            Err(e) => warn_log!(SOURCE, "acl compilation failed on cold start for dp {}: {}", self.config.id, e),
        }

        self.metrics.record(Metric::FlowModsSent { dp: self.config.id, count: ofmsgs.len() as u64 });
        self.notify.notify(Notification::ColdStart { dp: self.config.id });

        ValveOutput { ofmsgs, notifications: vec![Notification::ColdStart { dp: self.config.id }] }
            .reordered(true, &self.profile)
    }

    pub fn datapath_disconnect(&mut self) -> ValveOutput {
        self.runtime.running = false;
        ValveOutput::default()
    }

    fn standalone_flood_flows_for_all_vlans(&self) -> Vec<OfMsg> {
        let up: Vec<PortNo> = self.runtime.up_ports.iter().copied().collect();
        let restricted = self.restricted_bcast_arpnd_ports();
        if self.config.group_table {
            self.vlans
                .values()
                .flat_map(|v| crate::flood::standalone_flood_group_flows(&v.config, &up, &restricted))
                .collect()
        } else {
            self.vlans
                .values()
                .flat_map(|v| crate::flood::standalone_flood_flows(&v.config, &up, &restricted))
                .collect()
        }
    }

    /// Ports configured to receive only ARP/ND broadcasts from the flood
    /// table, never generic broadcast/multicast/unknown-unicast traffic.
    fn restricted_bcast_arpnd_ports(&self) -> Vec<PortNo> {
        self.ports.values().filter(|p| p.config.restricted_bcast_arpnd).map(|p| p.config.number).collect()
    }

    /// This DP's stack-facing ports, i.e. the ones with a declared peer.
    fn stack_ports(&self) -> Vec<PortNo> {
        self.ports.values().filter(|p| p.config.is_stack_port()).map(|p| p.config.number).collect()
    }

    /// Re-emits VLAN flood programming against the current stack topology.
    /// A DP with no stack ports gets the same standalone flood flows as
    /// cold start; a stacked DP gets `flood::stacked_flood_flows` instead,
    /// which knows to forward away from the root and (at the root, under
    /// `Reflection`) back down the link traffic arrived on.
    pub fn recompute_flood_for_stack_topology(
        &self,
        topology: &crate::model::stack::StackTopology,
        mode: crate::flood::StackFloodMode,
    ) -> Vec<OfMsg> {
        let stack_ports = self.stack_ports();
        if stack_ports.is_empty() {
            return self.standalone_flood_flows_for_all_vlans();
        }
        let up: Vec<PortNo> = self.runtime.up_ports.iter().copied().collect();
        let restricted = self.restricted_bcast_arpnd_ports();
        self.vlans
            .values()
            .flat_map(|v| {
                crate::flood::stacked_flood_flows(&v.config, &up, self.config.id, topology, &stack_ports, mode, &restricted)
            })
            .collect()
    }

    /// Drops every host learned on one of this DP's own stack ports, since
    /// a link transition means whatever used to be reachable through it no
    /// longer is. Returns the flow-mods withdrawing their EthSrc/EthDst
    /// entries, mirroring `state_expire`'s host-expiry flow shape.
    pub fn expire_hosts_on_stack_ports(&mut self) -> Vec<OfMsg> {
        let stack_ports = self.stack_ports();
        let mut ofmsgs = Vec::new();
        for (vid, vlan) in self.vlans.iter_mut() {
            for (mac, port) in host::purge_hosts_on_ports(&mut vlan.runtime, &stack_ports) {
                ofmsgs.push(OfMsg::FlowMod(FlowMod::delete(TableName::EthDst, Match::default().with_eth_dst(mac).with_vlan(*vid))));
                ofmsgs.push(OfMsg::FlowMod(FlowMod::delete(TableName::EthSrc, Match::default().with_eth_src(mac).with_in_port(port))));
            }
        }
        ofmsgs
    }

    /// Local-delivery-to-controller flows for every VLAN's configured VIPs.
    fn vip_flows_for_all_vlans(&self) -> Vec<OfMsg> {
        self.vlans
            .values()
            .flat_map(|v| {
                v.config.vips.iter().map(|vip| match vip.address() {
                    valve_types::IpAddress::V4(_) => v.route4.vip_flow(v.config.vid, *vip),
                    valve_types::IpAddress::V6(_) => v.route6.vip_flow(v.config.vid, *vip),
                })
            })
            .collect()
    }

    /// ADD/DELETE/MODIFY port-status events. A MODIFY that transitions an
    /// already-up port to up again is treated as a flap: delete before add.
    pub fn port_status_handler(&mut self, _now: u64, port: PortNo, up: bool) -> Result<ValveOutput> {
        let was_up = self.ports.get(&port).map(|p| p.runtime.up).unwrap_or(false);
        let flap = was_up && up;

        let mut ofmsgs = Vec::new();
        if flap {
            ofmsgs.push(OfMsg::FlowMod(FlowMod::delete(TableName::Flood, Match::default().with_in_port(port))));
            ofmsgs.push(OfMsg::FlowMod(FlowMod::delete(TableName::EthSrc, Match::default().with_in_port(port))));
            for vlan in self.vlans.values_mut() {
                let stale: Vec<MacAddress> = vlan
                    .runtime
                    .host_cache
                    .iter()
                    .filter(|(_, entry)| entry.port == port)
                    .map(|(mac, _)| *mac)
                    .collect();
                for mac in stale {
                    vlan.runtime.host_cache.remove(&mac);
                }
            }
        }

        let state = self.ports.get_mut(&port).ok_or(ValveError::UnknownPort { dp: self.config.id, port })?;
        state.runtime.up = up;
        if up {
            self.runtime.up_ports.insert(port);
        } else {
            self.runtime.up_ports.remove(&port);
        }

        ofmsgs.extend(self.standalone_flood_flows_for_all_vlans());
        self.metrics.record(Metric::FlowModsSent { dp: self.config.id, count: ofmsgs.len() as u64 });

        Ok(ValveOutput {
            ofmsgs,
            notifications: vec![Notification::PortStatus { dp: self.config.id, port, up }],
        })
    }

    /// Validates and routes a received packet to the LACP / LLDP / host
    /// learning pathway. Returns an empty output on a one-line rejection
    /// that only counts toward metrics (unknown VLAN, non-unicast source,
    /// all-zero source, etc).
    pub fn rcv_packet(&mut self, now: u64, pkt: PktMeta) -> Result<ValveOutput> {
        if self.last_packet_in_sec != Some(now) {
            self.last_packet_in_sec = Some(now);
            self.packet_in_counter = 0;
        }
        self.packet_in_counter += 1;
        if self.ignore_learn_ins > 0 && self.packet_in_counter % self.ignore_learn_ins == 0 {
            self.metrics.record(Metric::PacketInDropped { dp: self.config.id, count: 1 });
            return Ok(ValveOutput::default());
        }

        if pkt.eth_src.is_multicast() || pkt.eth_src.is_zero() {
            debug_log!(SOURCE, "dropping packet-in with invalid source {}", pkt.eth_src);
            return Ok(ValveOutput::default());
        }

        match pkt.vlan {
            None => self.non_vlan_rcv_packet(now, pkt),
            Some(vlan) if Some(vlan) == self.config.global_vlan => match pkt.eth_dst.decode_global_vid() {
                Some(real_vlan) => self.vlan_rcv_packet(now, real_vlan, pkt, false),
                None => {
                    debug_log!(SOURCE, "packet on global vlan {} has no decodable vid in {}", vlan, pkt.eth_dst);
                    Ok(ValveOutput::default())
                }
            },
            Some(vlan) => self.vlan_rcv_packet(now, vlan, pkt, true),
        }
    }

    /// Classifies a non-VLAN packet by ethertype. Payload decoding (the
    /// actual LACP PDU or LLDP TLVs) is the external shim's job; once it
    /// has decoded one it calls `lacp_pdu` / `stack_probe` directly rather
    /// than routing the raw bytes back through here. This path only
    /// counts and logs what it saw.
    fn non_vlan_rcv_packet(&mut self, _now: u64, pkt: PktMeta) -> Result<ValveOutput> {
        self.ports.get(&pkt.in_port).ok_or(ValveError::UnknownPort { dp: self.config.id, port: pkt.in_port })?;

        match pkt.eth_type {
            LACP_ETHERTYPE => debug_log!(SOURCE, "LACP PDU on port {}", pkt.in_port),
            LLDP_ETHERTYPE => debug_log!(SOURCE, "LLDP frame on port {}", pkt.in_port),
            _ => {}
        }

        Ok(ValveOutput::default())
    }

    /// Feeds an already-decoded LACP PDU for `port` into the bundle state
    /// machine. The companion entry point to `rcv_packet` for control
    /// frames whose payload the core itself never parses.
    pub fn lacp_pdu(
        &mut self,
        now: u64,
        port: PortNo,
        pdu: LacpPdu,
        expected_partner_system: MacAddress,
        lacp_resp_interval: u64,
    ) -> Result<ValveOutput> {
        let passthrough = self.ports.get(&port).ok_or(ValveError::UnknownPort { dp: self.config.id, port })?.config.lacp_passthrough.clone();
        let passthrough_down = passthrough.iter().any(|peer| !self.ports.get(peer).map(|p| p.runtime.lacp_up).unwrap_or(false));

        let state = self.ports.get_mut(&port).ok_or(ValveError::UnknownPort { dp: self.config.id, port })?;
        if !state.config.is_lacp_port() {
            return Err(crate::error::LacpError::NotLacpPort(port).into());
        }
        let bundle_id = state.config.lacp_bundle.unwrap_or(0);
        let member_vlans: Vec<VlanId> = state.config.tagged_vlans.clone();
        let outcome =
            lacp::receive_pdu(now, port, bundle_id, &member_vlans, &mut state.runtime, pdu, expected_partner_system, passthrough_down, lacp_resp_interval)?;
        if outcome.transitioned {
            self.metrics.record(Metric::LacpBundleUp { dp: self.config.id, bundle_id, up: state.runtime.lacp_up });
        }
        let mut ofmsgs = outcome.flows;
        if outcome.send_reply {
            ofmsgs.push(OfMsg::PacketOut(crate::ofmsg::PacketOut { data: Vec::new(), out_port: port }));
        }
        Ok(ValveOutput { ofmsgs, notifications: vec![] })
    }

    /// Records a decoded LLDP stack probe against `port`'s runtime. Does
    /// not itself emit flows; `fast_state_expire`'s periodic sweep is what
    /// turns an updated probe into a state transition.
    pub fn stack_probe(&mut self, now: u64, port: PortNo, remote_dp: valve_types::DpId, remote_port: PortNo) -> Result<()> {
        let state = self.ports.get_mut(&port).ok_or(ValveError::UnknownPort { dp: self.config.id, port })?;
        let expected = state.config.stack_peer;
        let correct = expected == Some((remote_dp, remote_port));
        state.runtime.stack_probe.last_seen_lldp_time = Some(now);
        state.runtime.stack_probe.stack_correct = correct;
        state.runtime.stack_probe.remote_dp_id = Some(remote_dp);
        state.runtime.stack_probe.remote_port_id = Some(remote_port);
        Ok(())
    }

    /// `check_membership` is false for traffic arriving on the global VLAN:
    /// the port carries the global VLAN itself, not the VID decoded from
    /// `eth_dst`, so the usual per-port VLAN membership check doesn't apply.
    fn vlan_rcv_packet(&mut self, now: u64, vlan_id: VlanId, pkt: PktMeta, check_membership: bool) -> Result<ValveOutput> {
        let vlan = self.vlans.get_mut(&vlan_id).ok_or(ValveError::UnknownVlan(vlan_id))?;
        let port_config = self
            .ports
            .get(&pkt.in_port)
            .map(|p| &p.config)
            .ok_or(ValveError::UnknownPort { dp: self.config.id, port: pkt.in_port })?;
        if check_membership && !port_config.carries_vlan(vlan_id) {
            return Err(ValveError::PortNotInVlan { port: pkt.in_port, vlan: vlan_id });
        }

        let permanent_learn = port_config.permanent_learn;
        let learn = host::learn_host_on_vlan_ports(now, pkt.in_port, &vlan.config, &mut vlan.runtime, pkt.eth_src, permanent_learn)?;

        let mut notifications = Vec::new();
        if learn.update_cache {
            notifications.push(Notification::HostLearned { dp: self.config.id, port: pkt.in_port, vlan: vlan_id, mac: pkt.eth_src });
            self.metrics.record(Metric::HostCount {
                dp: self.config.id,
                port: pkt.in_port,
                vlan: vlan_id,
                count: vlan.runtime.host_cache.len() as u64,
            });
        }

        let mut ofmsgs = learn.flows;
        if let Some(router_flow) = host::router_rewrite_flow(&vlan.config, pkt.in_port, pkt.eth_src, pkt.eth_dst) {
            ofmsgs.push(router_flow);
        }

        Ok(ValveOutput { ofmsgs, notifications })
    }

    /// Reconciles to `new_config`, choosing warm or cold restart per the
    /// diff. On cold start the caller must subsequently invoke
    /// `datapath_connect` again (this returns an empty output with a
    /// `ConfigRejected`-free cold-start signal via `Err` only on genuine
    /// validation failure, never on a warm/cold policy decision).
    pub fn reload_config(
        &mut self,
        _now: u64,
        new_config: DpConfig,
        new_ports: Vec<PortConfig>,
        new_vlans: Vec<VlanConfig>,
        new_acl_defs: Vec<Acl>,
    ) -> Result<(ValveOutput, bool)> {
        for vid in new_config.vlans.iter() {
            if !new_vlans.iter().any(|v| v.vid == *vid) {
                return Err(ConfigError::DanglingVlanReference(*vid).into());
            }
        }

        let old_ports: Vec<PortConfig> = self.ports.values().map(|p| p.config.clone()).collect();
        let old_vlans: Vec<VlanConfig> = self.vlans.values().map(|v| v.config.clone()).collect();
        let diff = ConfigDiff::compute(&self.config, &new_config, &old_ports, &new_ports, &old_vlans, &new_vlans);

        if diff.requires_cold_start() {
            audit_log!(
                AuditRecord::new(AuditCategory::WarmRestart, SOURCE, "reload_config")
                    .with_object_id(new_config.id.to_string())
                    .with_details(serde_json::json!({"restart_type": "cold"}))
            );
            self.notify.notify(Notification::ConfigRejected {
                dp: new_config.id,
                reason: "pipeline or all-ports change forces cold restart".into(),
            });
            return Ok((ValveOutput::default(), true));
        }

        let mut ofmsgs = Vec::new();
        for port in &diff.deleted_ports {
            ofmsgs.push(OfMsg::FlowMod(FlowMod::delete(TableName::EthSrc, Match::default().with_in_port(*port))));
        }
        for vid in &diff.deleted_vids {
            self.vlans.remove(vid);
        }

        self.runtime = DpRuntime::migrate(&self.runtime, &new_config);
        self.config = new_config;
        self.acl_defs = new_acl_defs;

        let mut next_vlans = HashMap::new();
        for vc in new_vlans {
            let mut state = self.vlans.remove(&vc.vid).unwrap_or_else(|| {
                let mut route4 = RouteManagerV4::new();
                let mut route6 = RouteManagerV6::new();
                for route in &vc.routes {
                    match route.next_hop {
                        valve_types::IpAddress::V4(_) => route4.add_route(*route),
                        valve_types::IpAddress::V6(_) => route6.add_route(*route),
                    }
                }
                VlanState { runtime: VlanRuntime::new(vc.host_cache_limit), config: vc.clone(), route4, route6 }
            });
            state.config = vc;
            next_vlans.insert(state.config.vid, state);
        }
        self.vlans = next_vlans;

        let mut next_ports = HashMap::new();
        for pc in new_ports {
            let runtime = self.ports.remove(&pc.number).map(|p| p.runtime).unwrap_or_default();
            next_ports.insert(pc.number, PortState { config: pc, runtime });
        }
        self.ports = next_ports;

        ofmsgs.extend(self.standalone_flood_flows_for_all_vlans());
        ofmsgs.extend(self.vip_flows_for_all_vlans());
        match self.compile_acls() {
            Ok(flows) => ofmsgs.extend(flows),
            Err(e) => warn_log!(SOURCE, "acl compilation failed on reload for dp {}: {}", self.config.id, e),
        }

        audit_log!(
            AuditRecord::new(AuditCategory::WarmRestart, SOURCE, "reload_config")
                .with_object_id(self.config.id.to_string())
                .with_details(serde_json::json!({"restart_type": "warm", "changed_acl_ports": diff.changed_acl_ports.len()}))
        );

        Ok((ValveOutput { ofmsgs, notifications: vec![] }, false))
    }

    /// Periodic router presence advertisement: gratuitous ARP for each
    /// VLAN's IPv4 VIPs, router advertisement for its IPv6 VIPs.
    pub fn advertise(&mut self, _now: u64) -> ValveOutput {
        let mut ofmsgs = Vec::new();
        let out_port = match self.ports.keys().next() {
            Some(p) => *p,
            None => return ValveOutput::default(),
        };
        for (vid, vlan) in self.vlans.iter() {
            let has_v4 = vlan.config.vips.iter().any(|v| matches!(v.address(), valve_types::IpAddress::V4(_)));
            let has_v6 = vlan.config.vips.iter().any(|v| matches!(v.address(), valve_types::IpAddress::V6(_)));
            if has_v4 {
                ofmsgs.push(vlan.route4.gratuitous_arp(*vid, out_port));
            }
            if has_v6 {
                ofmsgs.push(vlan.route6.router_advertisement(*vid, out_port));
            }
        }
        ValveOutput { ofmsgs, notifications: vec![] }
    }

    /// Periodic LACP PDU and LLDP stack-probe beacon transmission
    /// requests. Framing and socket transmission are the external shim's
    /// job; this only decides which ports owe a beacon this tick.
    pub fn fast_advertise(&mut self, _now: u64) -> ValveOutput {
        let mut ofmsgs = Vec::new();
        for (port, state) in self.ports.iter() {
            if state.config.is_lacp_port() || state.config.is_stack_port() {
                ofmsgs.push(OfMsg::PacketOut(crate::ofmsg::PacketOut { data: Vec::new(), out_port: *port }));
            }
        }
        ValveOutput { ofmsgs, notifications: vec![] }
    }

    /// Host-manager idle expiry driven by a hardware flow-removed event,
    /// as an alternative to the wall-clock sweep in `state_expire`.
    pub fn flow_timeout(&mut self, now: u64, table: TableName, m: Match) -> Result<ValveOutput> {
        if table != TableName::EthSrc {
            return Ok(ValveOutput::default());
        }
        let (vid, mac) = match (m.vlan_vid, m.eth_src) {
            (Some(vid), Some(mac)) => (vid, mac),
            _ => return Ok(ValveOutput::default()),
        };
        let vlan = self.vlans.get_mut(&vid).ok_or(ValveError::UnknownVlan(vid))?;
        let entry = match vlan.runtime.host_cache.remove(&mac) {
            Some(entry) => entry,
            None => return Ok(ValveOutput::default()),
        };
        let ofmsgs = vec![OfMsg::FlowMod(FlowMod::delete(TableName::EthDst, Match::default().with_eth_dst(mac).with_vlan(vid)))];
        let notifications = vec![Notification::HostExpired { dp: self.config.id, port: entry.port, vlan: vid, mac }];
        debug_log!(SOURCE, "flow_timeout expired {} on vlan {} at {}", mac, vid, now);
        Ok(ValveOutput { ofmsgs, notifications })
    }

    /// Periodic route-manager resolution pass across every VLAN.
    pub fn resolve_gateways(&mut self, now: u64, max_per_cycle: u32, retry_ceiling: u32, backoff_base: u64, backoff_max: u64) -> Result<ValveOutput> {
        let mut ofmsgs = Vec::new();
        for (vid, vlan) in self.vlans.iter_mut() {
            let out_port = match self.ports.keys().next() {
                Some(p) => *p,
                None => continue,
            };
            let mut budget = ResolveBudget::new(max_per_cycle);
            ofmsgs.extend(vlan.route4.resolve_gateways(now, *vid, out_port, &mut budget, retry_ceiling, backoff_base, backoff_max)?);
            ofmsgs.extend(vlan.route6.resolve_gateways(now, *vid, out_port, &mut budget, retry_ceiling, backoff_base, backoff_max)?);
        }
        Ok(ValveOutput { ofmsgs, notifications: vec![] })
    }

    /// Host cache and LACP timeout expiry sweep.
    pub fn state_expire(&mut self, now: u64, lacp_timeout: u64) -> ValveOutput {
        let mut ofmsgs = Vec::new();
        let mut notifications = Vec::new();

        for (port, state) in self.ports.iter_mut() {
            if state.config.is_lacp_port() {
                let bundle_id = state.config.lacp_bundle.unwrap_or(0);
                if let Some(flows) = lacp::expire(now, *port, bundle_id, &mut state.runtime, lacp_timeout) {
                    ofmsgs.extend(flows);
                }
            }
        }

        for (vid, vlan) in self.vlans.iter_mut() {
            let ports_before: HashMap<MacAddress, PortNo> =
                vlan.runtime.host_cache.iter().map(|(mac, entry)| (*mac, entry.port)).collect();
            let expired = host::expire_stale_hosts(now, &vlan.config, &mut vlan.runtime);
            for mac in expired {
                ofmsgs.push(OfMsg::FlowMod(FlowMod::delete(TableName::EthDst, Match::default().with_eth_dst(mac).with_vlan(*vid))));
                if let Some(&port) = ports_before.get(&mac) {
                    notifications.push(Notification::HostExpired { dp: self.config.id, port, vlan: *vid, mac });
                }
            }

            ofmsgs.extend(vlan.route4.expire_neighbors(now, *vid, vlan.config.neighbor_timeout));
            ofmsgs.extend(vlan.route6.expire_neighbors(now, *vid, vlan.config.neighbor_timeout));
        }

        ValveOutput { ofmsgs, notifications }
    }

    /// Feeds a resolved ARP reply / neighbor advertisement into the route
    /// manager for `vlan_id`, installing the now-resolvable FIB entries for
    /// every route via `next_hop`. The companion entry point to `rcv_packet`
    /// for the ARP/ND payload the core itself never parses.
    pub fn neighbor_resolved(
        &mut self,
        now: u64,
        vlan_id: VlanId,
        next_hop: valve_types::IpAddress,
        mac: MacAddress,
    ) -> Result<ValveOutput> {
        let vlan = self.vlans.get_mut(&vlan_id).ok_or(ValveError::UnknownVlan(vlan_id))?;
        match next_hop {
            valve_types::IpAddress::V4(_) => vlan.route4.mark_resolved(next_hop, mac, now),
            valve_types::IpAddress::V6(_) => vlan.route6.mark_resolved(next_hop, mac, now),
        }
        let mut ofmsgs = vlan.route4.fib_flows(vlan_id);
        ofmsgs.extend(vlan.route6.fib_flows(vlan_id));
        Ok(ValveOutput { ofmsgs, notifications: vec![] })
    }

    /// Re-evaluates stack link state machines for this DP's stack ports.
    pub fn fast_state_expire(&mut self, now: u64, send_interval: u64, max_lldp_lost: u64) -> Vec<(PortNo, crate::stacklink::StateChange)> {
        let mut changes = Vec::new();
        for (port, state) in self.ports.iter_mut() {
            if !state.config.is_stack_port() {
                continue;
            }
            let admin = crate::stacklink::AdminState::Enabled;
            let next = crate::stacklink::next_state(admin, state.runtime.stack_state, &state.runtime.stack_probe, now, send_interval, max_lldp_lost);
            let change = crate::stacklink::apply_transition(self.config.id, *port, state.runtime.stack_state, next, &state.runtime.stack_probe);
            state.runtime.stack_state = next;
            if change != crate::stacklink::StateChange::None {
                let up = matches!(change, crate::stacklink::StateChange::TransitionedUp);
                self.metrics.record(Metric::StackPortUp { dp: self.config.id, port: *port, up });
                changes.push((*port, change));
            }
        }
        changes
    }

    /// Correlates an OFPT_ERROR against recently sent messages. Logged,
    /// never fatal.
    pub fn oferror(&self, of_type: u16, code: u16, xid: u32) {
        warn_log!(SOURCE, "OFPT_ERROR type={} code={} xid={} on dp {}", of_type, code, xid, self.config.id);
    }

    pub fn set_ignore_learn_ins(&mut self, every_nth: u64) {
        self.ignore_learn_ins = every_nth;
    }

    /// Names referenced by any port's `acl_in`/`acl_out` or any VLAN's
    /// `acl_in` list, deduplicated in first-seen order.
    fn referenced_acl_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        for port in self.ports.values() {
            for name in [&port.config.acl_in, &port.config.acl_out].into_iter().flatten() {
                if seen.insert(name.clone()) {
                    names.push(name.clone());
                }
            }
        }
        for vlan in self.vlans.values() {
            for name in &vlan.config.acl_in {
                if seen.insert(name.clone()) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Compiles every ACL actually bound to a port or VLAN on this DP. An
    /// `acl_in`/`acl_out` name with no matching entry in `acl_defs` is
    /// logged and skipped rather than treated as fatal.
    pub fn compile_acls(&self) -> Result<Vec<OfMsg>> {
        let mut out = Vec::new();
        for name in self.referenced_acl_names() {
            match self.acl_defs.iter().find(|a| a.name == name) {
                Some(a) => out.extend(acl::compile_acl(a, |_| None)?),
                None => warn_log!(SOURCE, "acl '{}' referenced on dp {} but not defined", name, self.config.id),
            }
        }
        Ok(out)
    }
}
