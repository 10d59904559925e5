//! VLAN configuration and runtime state, including the bounded host cache.

use crate::route::RouteEntry;
use serde::{Deserialize, Serialize};
use valve_common::LruCache;
use valve_types::{IpAddress, IpPrefix, MacAddress, PortNo, VlanId};

/// Declared, immutable attributes of a VLAN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanConfig {
    pub vid: VlanId,
    pub tagged_ports: Vec<PortNo>,
    pub untagged_ports: Vec<PortNo>,
    pub faucet_mac: Option<MacAddress>,
    pub vips: Vec<IpPrefix>,
    /// Static routes whose next hop is resolved via ARP/ND and installed
    /// into the v4/v6 FIB once resolved.
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    pub acl_in: Vec<String>,
    pub host_cache_limit: usize,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub learn_jitter: u32,
    pub learn_ban_timeout: u64,
    pub cache_update_guard_time: u64,
    pub neighbor_timeout: u64,
}

impl VlanConfig {
    pub fn all_ports(&self) -> impl Iterator<Item = &PortNo> {
        self.tagged_ports.iter().chain(self.untagged_ports.iter())
    }

    pub fn is_tagged(&self, port: PortNo) -> bool {
        self.tagged_ports.contains(&port)
    }

    pub fn is_untagged(&self, port: PortNo) -> bool {
        self.untagged_ports.contains(&port)
    }
}

/// A learned host: the port it was last seen on and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostEntry {
    pub port: PortNo,
    pub last_move: u64,
}

/// A resolved (or pending) neighbor entry, IP-version agnostic at this layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborEntry {
    pub mac: Option<MacAddress>,
    pub last_refresh: u64,
}

/// Mutable per-VLAN state migrated across reloads.
#[derive(Debug)]
pub struct VlanRuntime {
    pub host_cache: LruCache<MacAddress, HostEntry>,
    pub neighbors: std::collections::HashMap<IpAddress, NeighborEntry>,
    pub learn_bans: u64,
    /// Count of learn attempts in the current learn-ban accounting window.
    pub learn_rate_count: u32,
    pub learn_rate_window_start: u64,
    pub learn_ban_until: Option<u64>,
    /// Last known non-zero host count written per port, for the
    /// high-water mark stats discipline.
    pub host_count_high_water: std::collections::HashMap<PortNo, u64>,
}

impl VlanRuntime {
    pub fn new(host_cache_limit: usize) -> Self {
        Self {
            host_cache: LruCache::new(host_cache_limit),
            neighbors: std::collections::HashMap::new(),
            learn_bans: 0,
            learn_rate_count: 0,
            learn_rate_window_start: 0,
            learn_ban_until: None,
            host_count_high_water: std::collections::HashMap::new(),
        }
    }

    pub fn is_learn_banned(&self, now: u64) -> bool {
        matches!(self.learn_ban_until, Some(until) if now < until)
    }

    /// Records a learn attempt in the current one-second accounting
    /// window, resetting the window when the wall-clock second changes,
    /// and returns the attempt count so far this window.
    pub fn record_learn_attempt(&mut self, now: u64) -> u32 {
        if now != self.learn_rate_window_start {
            self.learn_rate_window_start = now;
            self.learn_rate_count = 0;
        }
        self.learn_rate_count += 1;
        self.learn_rate_count
    }

    /// Counts hosts currently cached on a given port.
    pub fn host_count_on_port(&self, port: PortNo) -> u64 {
        self.host_cache.iter().filter(|(_, entry)| entry.port == port).count() as u64
    }

    /// Applies the high-water mark discipline: returns the set of ports
    /// whose previously-reported nonzero count must now be reported as
    /// zero, because they no longer host any MAC on this VLAN. Updates
    /// the stored high-water marks to the current counts.
    pub fn host_count_zero_out_stale(&mut self, current_ports: &[PortNo]) -> Vec<PortNo> {
        let mut stale = Vec::new();
        for port in current_ports {
            let current = self.host_count_on_port(*port);
            let previous = self.host_count_high_water.get(port).copied().unwrap_or(0);
            if current == 0 && previous > 0 {
                stale.push(*port);
            }
            if current > 0 {
                self.host_count_high_water.insert(*port, current);
            } else {
                self.host_count_high_water.remove(port);
            }
        }
        stale
    }
}
