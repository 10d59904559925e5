//! OpenFlow port number type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An OpenFlow port number (1..=OFPP_MAX). Reserved port numbers
/// (OFPP_CONTROLLER, OFPP_ALL, OFPP_FLOOD, ...) are out of the valid range
/// this type accepts, since those are special output actions, not port identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNo(u32);

impl PortNo {
    pub const MIN: u32 = 1;
    /// OFPP_MAX per the OpenFlow 1.3 spec.
    pub const MAX: u32 = 0xffff_ff00;

    pub const fn new(no: u32) -> Result<Self, ParseError> {
        if no >= Self::MIN && no <= Self::MAX {
            Ok(PortNo(no))
        } else {
            Err(ParseError::InvalidPortNo(no))
        }
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for PortNo {
    type Error = ParseError;

    fn try_from(no: u32) -> Result<Self, Self::Error> {
        PortNo::new(no)
    }
}

impl From<PortNo> for u32 {
    fn from(port: PortNo) -> u32 {
        port.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero() {
        assert!(PortNo::new(0).is_err());
    }

    #[test]
    fn accepts_typical_port() {
        assert!(PortNo::new(1).is_ok());
        assert!(PortNo::new(48).is_ok());
    }
}
