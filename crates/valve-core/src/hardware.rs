//! Hardware capability profiles.
//!
//! A Valve selects one profile at datapath construction and never switches
//! it afterwards; every other module consults the profile through the
//! `HardwareProfile` trait rather than matching on a vendor string.

use serde::{Deserialize, Serialize};

/// Known hardware/software switch families. `Generic` is the conservative
/// default when a datapath's `hardware` config field is absent or unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareProfileKind {
    Generic,
    OpenVSwitch,
    Allied,
    Aruba,
    Cisco,
    Lagopus,
    Netronome,
    NoviFlow,
    Zodiac,
}

/// Capability surface every manager consults before emitting or shaping
/// OpenFlow messages. Implemented by `StaticProfile`; kept as a trait so
/// tests can inject arbitrary capability combinations.
pub trait HardwareProfile: std::fmt::Debug {
    fn kind(&self) -> HardwareProfileKind;

    /// Whether a `BarrierRequest` must be inserted between table boundaries
    /// to guarantee ordering.
    fn use_barriers(&self) -> bool;

    /// Whether OXM ids (rather than legacy NXM) must be used in matches.
    fn use_oxm_ids(&self) -> bool;

    /// Whether table ids are fixed by the hardware rather than negotiated
    /// from `OFPMP_TABLE_FEATURES`.
    fn static_table_ids(&self) -> bool;

    /// Whether the pipeline can rely on hardware TTL decrement or must
    /// emit an explicit `DecTtl` action.
    fn supports_dec_ttl(&self) -> bool;

    /// Highest table id this hardware can address.
    fn max_table_id(&self) -> u8;

    /// Minimum flow table capacity guaranteed by the vendor, used to size
    /// ACL and route table budgets conservatively.
    fn min_max_flows(&self) -> u32;

    /// Whether flow-mod instruction sets must be fully populated (no
    /// implicit "leave unspecified actions unchanged" semantics).
    fn fill_req(&self) -> bool;

    /// Whether a cold start must explicitly delete all groups, rather than
    /// relying on table-clear to also clear groups.
    fn delete_all_groups_on_cold(&self) -> bool;
}

/// A concrete, statically-defined hardware profile: one of the known
/// `HardwareProfileKind`s with its capability flags baked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProfile {
    kind: HardwareProfileKind,
    use_barriers: bool,
    use_oxm_ids: bool,
    static_table_ids: bool,
    supports_dec_ttl: bool,
    max_table_id: u8,
    min_max_flows: u32,
    fill_req: bool,
    delete_all_groups_on_cold: bool,
}

impl StaticProfile {
    pub const fn for_kind(kind: HardwareProfileKind) -> Self {
        match kind {
            HardwareProfileKind::Generic => Self {
                kind,
                use_barriers: false,
                use_oxm_ids: true,
                static_table_ids: false,
                supports_dec_ttl: true,
                max_table_id: 254,
                min_max_flows: 4096,
                fill_req: false,
                delete_all_groups_on_cold: false,
            },
            HardwareProfileKind::OpenVSwitch => Self {
                kind,
                use_barriers: true,
                use_oxm_ids: true,
                static_table_ids: false,
                supports_dec_ttl: true,
                max_table_id: 254,
                min_max_flows: 1_000_000,
                fill_req: false,
                delete_all_groups_on_cold: false,
            },
            HardwareProfileKind::Allied => Self {
                kind,
                use_barriers: true,
                use_oxm_ids: false,
                static_table_ids: true,
                supports_dec_ttl: false,
                max_table_id: 9,
                min_max_flows: 1500,
                fill_req: true,
                delete_all_groups_on_cold: true,
            },
            HardwareProfileKind::Aruba => Self {
                kind,
                use_barriers: true,
                use_oxm_ids: true,
                static_table_ids: true,
                supports_dec_ttl: true,
                max_table_id: 8,
                min_max_flows: 2048,
                fill_req: false,
                delete_all_groups_on_cold: true,
            },
            HardwareProfileKind::Cisco => Self {
                kind,
                use_barriers: true,
                use_oxm_ids: true,
                static_table_ids: true,
                supports_dec_ttl: true,
                max_table_id: 8,
                min_max_flows: 4000,
                fill_req: false,
                delete_all_groups_on_cold: true,
            },
            HardwareProfileKind::Lagopus => Self {
                kind,
                use_barriers: false,
                use_oxm_ids: true,
                static_table_ids: false,
                supports_dec_ttl: true,
                max_table_id: 254,
                min_max_flows: 100_000,
                fill_req: false,
                delete_all_groups_on_cold: false,
            },
            HardwareProfileKind::Netronome => Self {
                kind,
                use_barriers: true,
                use_oxm_ids: true,
                static_table_ids: false,
                supports_dec_ttl: true,
                max_table_id: 64,
                min_max_flows: 80_000,
                fill_req: false,
                delete_all_groups_on_cold: false,
            },
            HardwareProfileKind::NoviFlow => Self {
                kind,
                use_barriers: false,
                use_oxm_ids: true,
                static_table_ids: false,
                supports_dec_ttl: true,
                max_table_id: 200,
                min_max_flows: 500_000,
                fill_req: false,
                delete_all_groups_on_cold: false,
            },
            HardwareProfileKind::Zodiac => Self {
                kind,
                use_barriers: true,
                use_oxm_ids: false,
                static_table_ids: true,
                supports_dec_ttl: false,
                max_table_id: 2,
                min_max_flows: 128,
                fill_req: true,
                delete_all_groups_on_cold: true,
            },
        }
    }
}

impl HardwareProfile for StaticProfile {
    fn kind(&self) -> HardwareProfileKind {
        self.kind
    }

    fn use_barriers(&self) -> bool {
        self.use_barriers
    }

    fn use_oxm_ids(&self) -> bool {
        self.use_oxm_ids
    }

    fn static_table_ids(&self) -> bool {
        self.static_table_ids
    }

    fn supports_dec_ttl(&self) -> bool {
        self.supports_dec_ttl
    }

    fn max_table_id(&self) -> u8 {
        self.max_table_id
    }

    fn min_max_flows(&self) -> u32 {
        self.min_max_flows
    }

    fn fill_req(&self) -> bool {
        self.fill_req
    }

    fn delete_all_groups_on_cold(&self) -> bool {
        self.delete_all_groups_on_cold
    }
}

impl Default for StaticProfile {
    fn default() -> Self {
        Self::for_kind(HardwareProfileKind::Generic)
    }
}
