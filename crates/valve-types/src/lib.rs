//! Core value types shared across the Valve control plane.
//!
//! This crate provides type-safe representations of the primitives the
//! Valve managers pass between each other:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers, plus the distinguished
//!   [`VlanId::NULL`] and global-routing encodings
//! - [`IpAddress`] / [`IpPrefix`]: IPv4 and IPv6 addresses and CIDR prefixes
//! - [`PortNo`]: OpenFlow port numbers
//! - [`DpId`]: datapath identifiers

mod dp;
mod ip;
mod mac;
mod port;
mod vlan;

pub use dp::DpId;
pub use ip::{IpAddress, IpPrefix, IpVersion, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;
pub use port::PortNo;
pub use vlan::VlanId;

/// Common error type for parsing/validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094, or 0 for untagged)")]
    InvalidVlanId(u16),

    #[error("invalid port number: {0}")]
    InvalidPortNo(u32),
}
