//! Owns the ordered set of flow tables for a datapath and produces the
//! table-features message and default miss policy for each table.

use crate::hardware::HardwareProfile;
use crate::ofmsg::{FlowMod, Instructions, Match, OfMsg, TableFeatures, TableName};

/// What a table does when nothing else matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissPolicy {
    /// Forward the packet to the next table at lowest priority.
    GotoNext,
    /// Drop the packet at lowest priority.
    Drop,
}

const LOWEST_PRIORITY: u32 = 0;

/// The ordered pipeline: vlan → classification → [vlan_acl] → eth_src →
/// ipv{4,6}_fib → vip → eth_dst[_hairpin] → flood → egress_acl.
///
/// Table IDs are derived from position in `tables` and are fixed for the
/// lifetime of this `Pipeline` — a changed table set requires building a
/// new `Pipeline`, which is what forces a cold restart on the caller's side.
#[derive(Debug, Clone)]
pub struct Pipeline {
    tables: Vec<TableName>,
}

impl Pipeline {
    /// Builds a pipeline from the datapath's declared table list. The
    /// order given here becomes each table's id (position in the vec) and
    /// is never renumbered for the lifetime of this pipeline.
    pub fn new(tables: Vec<TableName>) -> Self {
        Self { tables }
    }

    pub fn table_id(&self, table: TableName) -> Option<u8> {
        self.tables.iter().position(|t| *t == table).map(|i| i as u8)
    }

    pub fn tables(&self) -> &[TableName] {
        &self.tables
    }

    /// The first table reached after VLAN classification — where ACL and
    /// learning managers anchor their matches.
    pub fn classification_table(&self) -> TableName {
        if self.tables.contains(&TableName::Classification) {
            TableName::Classification
        } else {
            TableName::EthSrc
        }
    }

    fn miss_policy(&self, table: TableName) -> MissPolicy {
        match table {
            TableName::Vlan
            | TableName::Classification
            | TableName::EthSrc
            | TableName::Ipv4Fib
            | TableName::Ipv6Fib
            | TableName::Vip
            | TableName::EthDst
            | TableName::EthDstHairpin => MissPolicy::GotoNext,
            TableName::VlanAcl | TableName::PortAcl | TableName::EgressAcl | TableName::Flood => {
                MissPolicy::Drop
            }
        }
    }

    fn next_table(&self, table: TableName) -> Option<TableName> {
        let idx = self.tables.iter().position(|t| *t == table)?;
        self.tables.get(idx + 1).copied()
    }

    /// Produces the table-features request (when the hardware requires
    /// one) and each table's default miss flow.
    pub fn cold_start_messages(&self, profile: &dyn HardwareProfile) -> Vec<OfMsg> {
        let mut msgs = Vec::new();
        if profile.static_table_ids() {
            msgs.push(OfMsg::TableFeaturesRequest(TableFeatures { tables: self.tables.clone() }));
        }
        for &table in &self.tables {
            let instructions = match self.miss_policy(table) {
                MissPolicy::Drop => Instructions::default(),
                MissPolicy::GotoNext => match self.next_table(table) {
                    Some(next) => Instructions { actions: vec![], goto: Some(next) },
                    None => Instructions::default(),
                },
            };
            msgs.push(OfMsg::FlowMod(FlowMod::add(table, LOWEST_PRIORITY, Match::default(), instructions)));
        }
        msgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareProfileKind, StaticProfile};

    fn pipeline() -> Pipeline {
        Pipeline::new(vec![
            TableName::Vlan,
            TableName::Classification,
            TableName::EthSrc,
            TableName::Flood,
        ])
    }

    #[test]
    fn table_ids_follow_declared_order() {
        let p = pipeline();
        assert_eq!(p.table_id(TableName::Vlan), Some(0));
        assert_eq!(p.table_id(TableName::Classification), Some(1));
        assert_eq!(p.table_id(TableName::Flood), Some(3));
        assert_eq!(p.table_id(TableName::EgressAcl), None);
    }

    #[test]
    fn miss_policy_chains_goto_until_flood_drops() {
        let p = pipeline();
        let profile = StaticProfile::for_kind(HardwareProfileKind::Generic);
        let msgs = p.cold_start_messages(&profile);
        let vlan_miss = msgs.iter().find_map(|m| match m {
            OfMsg::FlowMod(fm) if fm.table == TableName::Vlan => Some(fm),
            _ => None,
        });
        assert_eq!(vlan_miss.unwrap().instructions.goto, Some(TableName::Classification));

        let flood_miss = msgs.iter().find_map(|m| match m {
            OfMsg::FlowMod(fm) if fm.table == TableName::Flood => Some(fm),
            _ => None,
        });
        assert!(flood_miss.unwrap().instructions.goto.is_none());
    }

    #[test]
    fn table_features_only_emitted_for_static_table_id_hardware() {
        let p = pipeline();
        let generic = StaticProfile::for_kind(HardwareProfileKind::Generic);
        let aruba = StaticProfile::for_kind(HardwareProfileKind::Aruba);
        assert!(!matches!(p.cold_start_messages(&generic)[0], OfMsg::TableFeaturesRequest(_)));
        assert!(matches!(p.cold_start_messages(&aruba)[0], OfMsg::TableFeaturesRequest(_)));
    }
}
