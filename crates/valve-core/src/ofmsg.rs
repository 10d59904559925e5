//! OpenFlow 1.3 message model and the deterministic reordering pass
//! (`valve_flowreorder`) applied before messages leave a Valve.
//!
//! This module models only the structure the core needs to reason about
//! ordering and content; wire framing and socket transmission are owned by
//! the external shim (out of scope, per the purpose statement).

use crate::hardware::HardwareProfile;
use serde::{Deserialize, Serialize};
use valve_types::{MacAddress, PortNo, VlanId};

/// Which table an instruction targets, referenced symbolically — never a
/// hard-coded numeric id — so the Pipeline remains the single source of
/// truth for table assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableName {
    Vlan,
    Classification,
    VlanAcl,
    EthSrc,
    Ipv4Fib,
    Ipv6Fib,
    Vip,
    EthDst,
    EthDstHairpin,
    Flood,
    EgressAcl,
    PortAcl,
}

/// Match fields a flow-mod may specify. All fields are optional (wildcarded
/// when absent); an empty match matches everything in the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub in_port: Option<PortNo>,
    pub vlan_vid: Option<VlanId>,
    pub eth_src: Option<MacAddress>,
    pub eth_dst: Option<MacAddress>,
    pub eth_type: Option<u16>,
    pub ipv4_src: Option<(std::net::Ipv4Addr, u8)>,
    pub ipv4_dst: Option<(std::net::Ipv4Addr, u8)>,
    pub ipv6_src: Option<(std::net::Ipv6Addr, u8)>,
    pub ipv6_dst: Option<(std::net::Ipv6Addr, u8)>,
    pub arp_tpa: Option<std::net::Ipv4Addr>,
    pub icmpv6_type: Option<u8>,
}

impl Match {
    pub fn with_in_port(mut self, port: PortNo) -> Self {
        self.in_port = Some(port);
        self
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan_vid = Some(vlan);
        self
    }

    pub fn with_eth_src(mut self, mac: MacAddress) -> Self {
        self.eth_src = Some(mac);
        self
    }

    pub fn with_eth_dst(mut self, mac: MacAddress) -> Self {
        self.eth_dst = Some(mac);
        self
    }

    pub fn with_ipv4_dst(mut self, addr: std::net::Ipv4Addr, prefix_len: u8) -> Self {
        self.ipv4_dst = Some((addr, prefix_len));
        self
    }

    pub fn with_ipv6_dst(mut self, addr: std::net::Ipv6Addr, prefix_len: u8) -> Self {
        self.ipv6_dst = Some((addr, prefix_len));
        self
    }
}

/// VLAN tag action applied to a packet on its way out a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VlanAction {
    /// Leave the tag as-is.
    None,
    /// Push a tag with this VID (port is a tagged member).
    Push(VlanId),
    /// Pop the tag (port is the untagged/native member).
    Pop,
}

/// A single output or mutation action within an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Output(PortNo),
    OutputController { max_len: u16 },
    SetVlan(VlanAction),
    SetEthSrc(MacAddress),
    SetEthDst(MacAddress),
    DecTtl,
    Meter(u32),
    GotoTable(TableName),
    /// Output via an OFPAT_GROUP action, the group-table flood alternative
    /// to a combinatorial per-destination action list.
    Group(u32),
}

/// The instruction set of a single flow-mod: actions applied in order,
/// then (if present) a goto to the next table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instructions {
    pub actions: Vec<Action>,
    pub goto: Option<TableName>,
}

/// Flow-mod command, mirroring OFPFC_*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowModCommand {
    Add,
    Modify,
    Delete,
    /// Delete exactly the entries matching by strict priority+match, not wildcard.
    DeleteStrict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMod {
    pub command: FlowModCommand,
    pub table: TableName,
    pub priority: u32,
    pub cookie: u64,
    pub r#match: Match,
    pub instructions: Instructions,
    /// Seconds of inactivity before the flow expires; 0 disables idle expiry.
    pub idle_timeout: u16,
    /// Seconds before the flow expires regardless of activity; 0 disables.
    pub hard_timeout: u16,
    /// Request a flow-removed notification when this entry expires or is deleted.
    pub send_flow_rem: bool,
}

impl FlowMod {
    pub fn add(table: TableName, priority: u32, r#match: Match, instructions: Instructions) -> Self {
        Self {
            command: FlowModCommand::Add,
            table,
            priority,
            cookie: 0,
            r#match,
            instructions,
            idle_timeout: 0,
            hard_timeout: 0,
            send_flow_rem: false,
        }
    }

    pub fn delete(table: TableName, r#match: Match) -> Self {
        Self {
            command: FlowModCommand::Delete,
            table,
            priority: 0,
            cookie: 0,
            r#match,
            instructions: Instructions::default(),
            idle_timeout: 0,
            hard_timeout: 0,
            send_flow_rem: false,
        }
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_idle_timeout(mut self, secs: u16) -> Self {
        self.idle_timeout = secs;
        self.send_flow_rem = secs > 0 || self.send_flow_rem;
        self
    }

    pub fn with_hard_timeout(mut self, secs: u16) -> Self {
        self.hard_timeout = secs;
        self.send_flow_rem = secs > 0 || self.send_flow_rem;
        self
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.command, FlowModCommand::Delete | FlowModCommand::DeleteStrict)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupModCommand {
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBucket {
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMod {
    pub command: GroupModCommand,
    pub group_id: u32,
    pub buckets: Vec<GroupBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterMod {
    pub meter_id: u32,
    pub rate_kbps: u64,
    pub burst_kb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketOut {
    pub data: Vec<u8>,
    pub out_port: PortNo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFeatures {
    pub tables: Vec<TableName>,
}

/// The full set of OpenFlow 1.3 structures a Valve can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OfMsg {
    FlowMod(FlowMod),
    GroupMod(GroupMod),
    MeterMod(MeterMod),
    PacketOut(PacketOut),
    TableFeaturesRequest(TableFeatures),
    AsyncConfigSet,
    BarrierRequest,
}

impl OfMsg {
    fn sort_rank(&self, cold_start: bool) -> u32 {
        match self {
            OfMsg::TableFeaturesRequest(_) if cold_start => 0,
            OfMsg::FlowMod(fm) if fm.is_delete() => 1,
            OfMsg::FlowMod(_) => 2,
            OfMsg::GroupMod(g) if g.command == GroupModCommand::Delete => 1,
            OfMsg::GroupMod(_) => 2,
            OfMsg::MeterMod(_) => 2,
            OfMsg::PacketOut(_) => 3,
            OfMsg::TableFeaturesRequest(_) => 2,
            OfMsg::AsyncConfigSet => 3,
            OfMsg::BarrierRequest => 4,
        }
    }

    fn table_order(&self) -> u32 {
        match self {
            OfMsg::FlowMod(fm) => table_order_index(fm.table),
            _ => 0,
        }
    }
}

fn table_order_index(table: TableName) -> u32 {
    match table {
        TableName::Vlan => 0,
        TableName::Classification => 1,
        TableName::VlanAcl => 2,
        TableName::PortAcl => 2,
        TableName::EthSrc => 3,
        TableName::Ipv4Fib => 4,
        TableName::Ipv6Fib => 4,
        TableName::Vip => 5,
        TableName::EthDst => 6,
        TableName::EthDstHairpin => 6,
        TableName::Flood => 7,
        TableName::EgressAcl => 8,
    }
}

/// Re-sorts a batch of outbound messages into the deterministic sequence
/// the rest of the stack relies on: deletes before adds within a table,
/// table-features first only at cold start, and a barrier inserted after
/// every table boundary when the hardware profile requires it
/// (`USE_BARRIERS`).
pub fn valve_flowreorder(mut msgs: Vec<OfMsg>, cold_start: bool, profile: &dyn HardwareProfile) -> Vec<OfMsg> {
    msgs.sort_by_key(|m| (m.sort_rank(cold_start), m.table_order()));

    if !profile.use_barriers() {
        return msgs;
    }

    let mut out = Vec::with_capacity(msgs.len() + msgs.len() / 4);
    let mut last_table = None;
    for msg in msgs {
        if let OfMsg::FlowMod(fm) = &msg {
            let current = table_order_index(fm.table);
            if let Some(prev) = last_table {
                if prev != current {
                    out.push(OfMsg::BarrierRequest);
                }
            }
            last_table = Some(current);
        }
        out.push(msg);
    }
    out
}
