//! Flood output set computation: combinatorial per-VLAN flooding for
//! standalone datapaths, and stack-aware flooding that forwards away from
//! the root (or, for tenants that require it, allows controlled
//! reflection at the root).

use crate::model::stack::StackTopology;
use crate::model::vlan::VlanConfig;
use crate::ofmsg::{Action, FlowMod, GroupBucket, GroupMod, GroupModCommand, Instructions, Match, OfMsg, TableName, VlanAction};
use valve_types::{DpId, PortNo};

const FLOOD_PRIORITY: u32 = 0x100;
/// Above `FLOOD_PRIORITY` so a restricted port's narrower ARP/ND flow is
/// consulted before the generic flood entry that excludes it.
const ARPND_FLOOD_PRIORITY: u32 = 0x101;

const ETH_TYPE_ARP: u16 = 0x0806;
const ETH_TYPE_IPV6: u16 = 0x86dd;
/// Router solicitation/advertisement and neighbor solicitation/advertisement:
/// the ICMPv6 types that carry ND's broadcast/multicast traffic.
const ND_ICMPV6_TYPES: [u8; 4] = [133, 134, 135, 136];

fn vlan_action_for(vlan: &VlanConfig, port: PortNo) -> VlanAction {
    if vlan.is_tagged(port) {
        VlanAction::Push(vlan.vid)
    } else {
        VlanAction::Pop
    }
}

fn output_actions(vlan: &VlanConfig, in_port: PortNo, targets: impl Iterator<Item = PortNo>) -> Vec<Action> {
    targets
        .filter(|&out_port| out_port != in_port)
        .flat_map(|out_port| [Action::SetVlan(vlan_action_for(vlan, out_port)), Action::Output(out_port)])
        .collect()
}

/// ARP/ND-only flood flows for `in_port`, reaching every member including
/// restricted-broadcast ones. Only emitted when the VLAN has at least one
/// restricted member, since otherwise the generic flow already covers them.
fn arpnd_flood_flows(vlan: &VlanConfig, in_port: PortNo, members: &[PortNo]) -> Vec<OfMsg> {
    let actions = output_actions(vlan, in_port, members.iter().copied());
    let mut flows = vec![OfMsg::FlowMod(FlowMod::add(
        TableName::Flood,
        ARPND_FLOOD_PRIORITY,
        Match { in_port: Some(in_port), vlan_vid: Some(vlan.vid), eth_type: Some(ETH_TYPE_ARP), ..Match::default() },
        Instructions { actions: actions.clone(), goto: None },
    ))];
    for icmpv6_type in ND_ICMPV6_TYPES {
        flows.push(OfMsg::FlowMod(FlowMod::add(
            TableName::Flood,
            ARPND_FLOOD_PRIORITY,
            Match {
                in_port: Some(in_port),
                vlan_vid: Some(vlan.vid),
                eth_type: Some(ETH_TYPE_IPV6),
                icmpv6_type: Some(icmpv6_type),
                ..Match::default()
            },
            Instructions { actions: actions.clone(), goto: None },
        )));
    }
    flows
}

/// Non-stacked flood: every up member port floods to every other up
/// member port, with VLAN tag rewritten per destination port's membership.
/// Member ports in `restricted_ports` are excluded from the generic flow
/// and instead reachable only through a narrower ARP/ND flood flow.
pub fn standalone_flood_flows(vlan: &VlanConfig, up_ports: &[PortNo], restricted_ports: &[PortNo]) -> Vec<OfMsg> {
    let members: Vec<PortNo> = vlan.all_ports().copied().filter(|p| up_ports.contains(p)).collect();
    let has_restricted = members.iter().any(|p| restricted_ports.contains(p));

    let mut flows = Vec::new();
    for &in_port in &members {
        let generic_targets = members.iter().copied().filter(|p| !restricted_ports.contains(p));
        flows.push(OfMsg::FlowMod(FlowMod::add(
            TableName::Flood,
            FLOOD_PRIORITY,
            Match::default().with_in_port(in_port).with_vlan(vlan.vid),
            Instructions { actions: output_actions(vlan, in_port, generic_targets), goto: None },
        )));
        if has_restricted {
            flows.extend(arpnd_flood_flows(vlan, in_port, &members));
        }
    }
    flows
}

/// Derives a stable OFPGT_ALL group id from the VLAN and its ingress port,
/// so a cold restart reprograms the same ids rather than reallocating.
pub fn flood_group_id(vlan: &VlanConfig, in_port: PortNo) -> u32 {
    (vlan.vid.as_u16() as u32) << 16 | in_port.as_u32()
}

/// Non-stacked flood, group-table variant: one OFPGT_ALL group per ingress
/// port holding a bucket per destination, with a single flow entry per
/// ingress port outputting via the group rather than a combinatorial
/// per-destination action list.
pub fn standalone_flood_group_flows(vlan: &VlanConfig, up_ports: &[PortNo], restricted_ports: &[PortNo]) -> Vec<OfMsg> {
    let members: Vec<PortNo> = vlan.all_ports().copied().filter(|p| up_ports.contains(p)).collect();
    let has_restricted = members.iter().any(|p| restricted_ports.contains(p));

    let mut msgs = Vec::new();
    for &in_port in &members {
        let group_id = flood_group_id(vlan, in_port);
        let buckets = members
            .iter()
            .copied()
            .filter(|&p| p != in_port && !restricted_ports.contains(&p))
            .map(|out_port| GroupBucket { actions: vec![Action::SetVlan(vlan_action_for(vlan, out_port)), Action::Output(out_port)] })
            .collect();

        msgs.push(OfMsg::GroupMod(GroupMod { command: GroupModCommand::Add, group_id, buckets }));
        msgs.push(OfMsg::FlowMod(FlowMod::add(
            TableName::Flood,
            FLOOD_PRIORITY,
            Match::default().with_in_port(in_port).with_vlan(vlan.vid),
            Instructions { actions: vec![Action::Group(group_id)], goto: None },
        )));
        if has_restricted {
            msgs.extend(arpnd_flood_flows(vlan, in_port, &members));
        }
    }
    msgs
}

/// Whether reflection at the stack root is enabled for a VLAN. Most
/// deployments want `NoReflection` (forward away from root only); a
/// tenant that needs traffic reflected back down the same link at the
/// root opts into `Reflection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFloodMode {
    NoReflection,
    Reflection,
}

/// Stack-aware flood: a port floods to every other up member port on this
/// DP, plus (unless this DP is a non-root DP flooding back toward the
/// root under `NoReflection`) the stack port(s) leading away from root.
/// Member ports in `restricted_ports` are excluded from the generic flow
/// and instead reachable only through a narrower ARP/ND flood flow.
pub fn stacked_flood_flows(
    vlan: &VlanConfig,
    up_ports: &[PortNo],
    this_dp: DpId,
    topology: &StackTopology,
    stack_ports: &[PortNo],
    mode: StackFloodMode,
    restricted_ports: &[PortNo],
) -> Vec<OfMsg> {
    let local_members: Vec<PortNo> = vlan.all_ports().copied().filter(|p| up_ports.contains(p)).collect();
    let is_root = topology.root() == Some(this_dp);
    let path_to_root = topology.shortest_path_port(this_dp);
    let has_restricted = local_members.iter().any(|p| restricted_ports.contains(p));

    let stack_targets = |in_port: PortNo, came_from_root_port: bool| -> Vec<PortNo> {
        stack_ports
            .iter()
            .copied()
            .filter(|&stack_port| {
                if stack_port == in_port {
                    return false;
                }
                let forwards_away_from_root = !is_root && Some(stack_port) == path_to_root;
                let reflects_at_root = is_root && mode == StackFloodMode::Reflection;
                let forwards_downstream = !is_root && !came_from_root_port;
                forwards_away_from_root || reflects_at_root || forwards_downstream || is_root
            })
            .collect()
    };

    local_members
        .iter()
        .flat_map(|&in_port| {
            let came_from_root_port = path_to_root == Some(in_port);
            let stack_out = stack_targets(in_port, came_from_root_port);

            let generic_local: Vec<PortNo> =
                local_members.iter().copied().filter(|p| !restricted_ports.contains(p)).collect();
            let mut actions = output_actions(vlan, in_port, generic_local.into_iter());
            actions.extend(stack_out.iter().copied().map(Action::Output));

            let mut flows = vec![OfMsg::FlowMod(FlowMod::add(
                TableName::Flood,
                FLOOD_PRIORITY,
                Match::default().with_in_port(in_port).with_vlan(vlan.vid),
                Instructions { actions, goto: None },
            ))];

            if has_restricted {
                let mut all_targets = local_members.clone();
                for p in stack_out {
                    if !all_targets.contains(&p) {
                        all_targets.push(p);
                    }
                }
                flows.extend(arpnd_flood_flows(vlan, in_port, &all_targets));
            }

            flows
        })
        .collect()
}
