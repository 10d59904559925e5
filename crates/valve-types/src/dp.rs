//! Datapath identifier type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a single OpenFlow datapath (and, 1:1, the Valve managing it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DpId(u64);

impl DpId {
    pub const fn new(id: u64) -> Self {
        DpId(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for DpId {
    fn from(id: u64) -> Self {
        DpId(id)
    }
}
