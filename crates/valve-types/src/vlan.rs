//! VLAN ID type with validation and the distinguished NullVLAN sentinel.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IEEE 802.1Q VLAN identifier.
///
/// VLAN 0 is reserved by this type for the "no tag" sentinel ([`VlanId::NULL`]);
/// valid tagged VLANs are 1-4094. VLAN 4095 is reserved by the 802.1Q standard
/// and rejected here as it is everywhere else in the stack.
///
/// # Examples
///
/// ```
/// use valve_types::VlanId;
///
/// let vlan = VlanId::new(100).unwrap();
/// assert_eq!(vlan.as_u16(), 100);
/// assert!(VlanId::new(4095).is_err());
/// assert!(VlanId::NULL.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid tagged VLAN ID.
    pub const MIN: u16 = 1;

    /// Maximum valid tagged VLAN ID.
    pub const MAX: u16 = 4094;

    /// Sentinel denoting "no VLAN tag" in a match (untagged traffic).
    pub const NULL: VlanId = VlanId(0);

    /// Creates a new tagged VLAN ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the VLAN ID is not in the valid tagged range (1-4094).
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    /// Returns the VLAN ID as a u16 (0 for [`VlanId::NULL`]).
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// True for the distinguished "no tag" sentinel.
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Masks an arbitrary 16-bit value down to the 12 bits a VID occupies.
    pub const fn mask_u16(raw: u16) -> u16 {
        raw & 0x0fff
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "untagged")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id_str = if s.to_lowercase().starts_with("vlan") {
            &s[4..]
        } else {
            s
        };
        let id: u16 = id_str
            .parse()
            .map_err(|_| ParseError::InvalidVlanId(0))?;
        VlanId::new(id)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}
