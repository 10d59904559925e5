//! Error types shared across the core's managers.
//!
//! Each manager gets its own variant set rather than one flat enum, mirroring
//! how the teacher keeps orchestrator-specific error enums next to the
//! orchestrator they belong to; `ValveError` is the umbrella a caller sees
//! once events have been dispatched through the Valve Core.

use thiserror::Error;
use valve_types::{DpId, ParseError, PortNo, VlanId};

pub type Result<T> = std::result::Result<T, ValveError>;

#[derive(Debug, Clone, Error)]
pub enum ValveError {
    #[error("unknown datapath: {0}")]
    UnknownDatapath(DpId),
    #[error("unknown port {port} on datapath {dp}")]
    UnknownPort { dp: DpId, port: PortNo },
    #[error("unknown VLAN {0}")]
    UnknownVlan(VlanId),
    #[error("port {port} is not a member of VLAN {vlan}")]
    PortNotInVlan { port: PortNo, vlan: VlanId },
    #[error("host cache error: {0}")]
    Host(#[from] HostError),
    #[error("route error: {0}")]
    Route(#[from] RouteError),
    #[error("ACL error: {0}")]
    Acl(#[from] AclError),
    #[error("LACP error: {0}")]
    Lacp(#[from] LacpError),
    #[error("stack error: {0}")]
    Stack(#[from] StackError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid value: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("host cache for VLAN {0} is at capacity and refused an evictable insert")]
    CacheFull(VlanId),
    #[error("source MAC {0} is an invalid learning source (multicast or zero)")]
    InvalidSourceMac(valve_types::MacAddress),
}

#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("no FIB configured for VLAN {0}")]
    NoFib(VlanId),
    #[error("route {0} has no resolved next hop")]
    Unresolved(valve_types::IpPrefix),
    #[error("gateway {0} is outside any configured subnet for VLAN {1}")]
    GatewayNotLocal(valve_types::IpAddress, VlanId),
}

#[derive(Debug, Clone, Error)]
pub enum AclError {
    #[error("ACL '{0}' not found")]
    NotFound(String),
    #[error("ACL '{0}' match field is unsupported on this hardware profile")]
    UnsupportedMatch(String),
    #[error("ACL rule in '{0}' has no terminating action")]
    NoTerminatingAction(String),
}

#[derive(Debug, Clone, Error)]
pub enum LacpError {
    #[error("LACP bundle {0} has no active member ports")]
    NoActiveMembers(u32),
    #[error("port {0} is not configured for LACP")]
    NotLacpPort(PortNo),
}

#[derive(Debug, Clone, Error)]
pub enum StackError {
    #[error("stack port {port} on datapath {dp} has no configured peer")]
    NoPeer { dp: DpId, port: PortNo },
    #[error("stack topology contains a cabling mismatch at datapath {0}")]
    CablingMismatch(DpId),
    #[error("no loop-free root could be computed for the stack")]
    NoRoot,
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("datapath {0} configuration requires a cold start: {1}")]
    RequiresColdStart(DpId, String),
    #[error("VLAN {0} referenced by configuration does not exist")]
    DanglingVlanReference(VlanId),
    #[error("duplicate port {0} in configuration")]
    DuplicatePort(PortNo),
}
