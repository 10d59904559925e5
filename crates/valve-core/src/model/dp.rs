//! Datapath configuration and runtime state.
//!
//! Splits the legacy "DP with embedded dyn_* fields" shape into an
//! immutable `DpConfig` and a mutable `DpRuntime` keyed by DP id, with
//! `DpRuntime::migrate` cloning forward dynamic state across a reload.

use crate::hardware::HardwareProfileKind;
use crate::ofmsg::TableName;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use valve_types::{DpId, PortNo, VlanId};

/// Declared, immutable attributes of a datapath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpConfig {
    pub id: DpId,
    pub name: String,
    pub hardware: HardwareProfileKind,
    pub ports: Vec<PortNo>,
    pub vlans: Vec<VlanId>,
    pub tables: Vec<TableName>,
    pub stack_root: Option<DpId>,
    /// The synthetic VLAN, if any, that carries inter-DP routed traffic with
    /// the true destination VID encoded in the low 12 bits of `eth_dst`.
    #[serde(default)]
    pub global_vlan: Option<VlanId>,
    /// When set and this DP is not the stack root, a learned host is also
    /// learned on every other DP's stack port toward this one, so the rest
    /// of the stack can reach it without flooding.
    #[serde(default)]
    pub stack_route_learning: bool,
    /// Program flood as a single OFPGT_ALL group per ingress port rather
    /// than a combinatorial per-destination flow, when the hardware
    /// profile supports group tables.
    #[serde(default)]
    pub group_table: bool,
}

impl DpConfig {
    /// True if `other` declares the same table *set* as this config — a
    /// change here forces a cold restart regardless of anything else.
    pub fn same_table_set(&self, other: &DpConfig) -> bool {
        let mine: HashSet<_> = self.tables.iter().collect();
        let theirs: HashSet<_> = other.tables.iter().collect();
        mine == theirs
    }

    pub fn port_set(&self) -> HashSet<PortNo> {
        self.ports.iter().copied().collect()
    }

    pub fn vlan_set(&self) -> HashSet<VlanId> {
        self.vlans.iter().copied().collect()
    }
}

/// Mutable, per-DP state that survives a warm reload.
#[derive(Debug, Clone, Default)]
pub struct DpRuntime {
    pub running: bool,
    pub up_ports: HashSet<PortNo>,
    pub last_cold_start: Option<u64>,
    /// Flags set when a tunnel ACL needs regenerating after a topology change.
    pub tunnel_update_pending: HashSet<String>,
}

impl DpRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones the dynamic state of `old` forward into a fresh runtime for
    /// `new_config`, dropping any up-port that no longer exists in the new
    /// config's port set.
    pub fn migrate(old: &DpRuntime, new_config: &DpConfig) -> DpRuntime {
        let new_ports = new_config.port_set();
        DpRuntime {
            running: old.running,
            up_ports: old.up_ports.iter().filter(|p| new_ports.contains(p)).copied().collect(),
            last_cold_start: old.last_cold_start,
            tunnel_update_pending: old.tunnel_update_pending.clone(),
        }
    }
}
