//! Port configuration and runtime state.

use crate::lacp::LacpPdu;
use serde::{Deserialize, Serialize};
use valve_types::{DpId, PortNo, VlanId};

/// Declared, immutable attributes of a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    pub number: PortNo,
    pub description: String,
    /// VLANs this port carries tagged.
    pub tagged_vlans: Vec<VlanId>,
    /// VLAN this port carries untagged, if any.
    pub native_vlan: Option<VlanId>,
    pub lacp_bundle: Option<u32>,
    /// Peer ports whose LACP state gates this port's own PDU emission: if
    /// any is down, this port suppresses its LACP replies too.
    #[serde(default)]
    pub lacp_passthrough: Vec<PortNo>,
    pub stack_peer: Option<(DpId, PortNo)>,
    pub mirror_targets: Vec<PortNo>,
    pub permanent_learn: bool,
    /// Restricted to ARP/ND broadcast only, not generic flood.
    pub restricted_bcast_arpnd: bool,
    pub acl_in: Option<String>,
    pub acl_out: Option<String>,
    pub coprocessor: bool,
}

impl PortConfig {
    pub fn is_stack_port(&self) -> bool {
        self.stack_peer.is_some()
    }

    pub fn is_lacp_port(&self) -> bool {
        self.lacp_bundle.is_some()
    }

    pub fn carries_vlan(&self, vlan: VlanId) -> bool {
        self.native_vlan == Some(vlan) || self.tagged_vlans.contains(&vlan)
    }
}

/// Per-stack-port probe state accumulated from received LLDP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StackProbeInfo {
    pub last_seen_lldp_time: Option<u64>,
    pub stack_correct: bool,
    pub remote_dp_id: Option<DpId>,
    pub remote_port_id: Option<PortNo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StackState {
    #[default]
    Init,
    Up,
    Down,
}

/// Mutable per-port state migrated across reloads when the port persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortRuntime {
    pub up: bool,
    pub lacp_up: bool,
    pub last_lacp_update: Option<u64>,
    pub last_lacp_pdu_sent: Option<u64>,
    /// Content of the last PDU received, to detect a change independent
    /// of the up/down transition it may or may not cause.
    pub last_lacp_pdu: Option<LacpPdu>,
    pub stack_probe: StackProbeInfo,
    pub stack_state: StackState,
    pub last_lldp_beacon_sent: Option<u64>,
}

impl PortRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}
