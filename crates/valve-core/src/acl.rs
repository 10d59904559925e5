//! ACL compilation: port/VLAN/egress rule lists compiled into flow
//! entries and meters, including tunnel ingress/egress actions
//! recomputed whenever the stack topology changes.

use crate::error::{AclError, Result};
use crate::model::stack::StackTopology;
use crate::ofmsg::{Action, FlowMod, Instructions, Match, MeterMod, OfMsg, TableName, VlanAction};
use valve_types::{DpId, MacAddress, PortNo, VlanId};

/// Which table a compiled ACL targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclStage {
    Port,
    Vlan,
    Egress,
}

impl AclStage {
    fn table(self) -> TableName {
        match self {
            AclStage::Port => TableName::PortAcl,
            AclStage::Vlan => TableName::VlanAcl,
            AclStage::Egress => TableName::EgressAcl,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AclAction {
    Allow,
    Drop,
    Mirror(PortNo),
    Meter(u32),
    Output(PortNo),
    RewriteVlan(VlanId),
    /// Encapsulate toward the stack port leading to `target_dp`, decapsulating
    /// the reverse direction at egress from that DP.
    Tunnel { target_dp: DpId },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AclMatch {
    pub in_port: Option<PortNo>,
    pub vlan: Option<VlanId>,
    pub eth_src: Option<MacAddress>,
    pub eth_dst: Option<MacAddress>,
    pub eth_type: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AclRule {
    pub priority: u32,
    pub matches: AclMatch,
    pub actions: Vec<AclAction>,
}

/// A meter referenced by an `AclAction::Meter` rule action, provisioned
/// via a meter-mod alongside the ACL's flow entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterConfig {
    pub id: u32,
    pub rate_kbps: u64,
    pub burst_kb: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Acl {
    pub name: String,
    pub stage: AclStage,
    pub rules: Vec<AclRule>,
    pub meters: Vec<MeterConfig>,
}

fn to_of_match(m: &AclMatch) -> Match {
    Match {
        in_port: m.in_port,
        vlan_vid: m.vlan,
        eth_src: m.eth_src,
        eth_dst: m.eth_dst,
        eth_type: m.eth_type,
        ..Match::default()
    }
}

/// Compiles an ACL's rules into a deterministic, priority-ordered set of
/// flow/meter messages. `topology` and `stack_port_toward` resolve
/// `Tunnel` actions to a concrete output port; rules with a `Tunnel`
/// action but no resolvable path are skipped with an error rather than
/// silently dropped.
pub fn compile_acl<F>(acl: &Acl, stack_port_toward: F) -> Result<Vec<OfMsg>>
where
    F: Fn(DpId) -> Option<PortNo>,
{
    let table = acl.stage.table();
    let mut out: Vec<OfMsg> = acl.meters.iter().map(|m| meter_mod(m.id, m.rate_kbps, m.burst_kb)).collect();

    for rule in &acl.rules {
        if rule.actions.is_empty() {
            return Err(AclError::NoTerminatingAction(acl.name.clone()).into());
        }

        let mut of_actions = Vec::new();
        for action in &rule.actions {
            match action {
                AclAction::Allow => {}
                AclAction::Drop => {
                    of_actions.clear();
                    break;
                }
                AclAction::Mirror(port) => of_actions.push(Action::Output(*port)),
                AclAction::Meter(id) => of_actions.push(Action::Meter(*id)),
                AclAction::Output(port) => of_actions.push(Action::Output(*port)),
                AclAction::RewriteVlan(vlan) => of_actions.push(Action::SetVlan(VlanAction::Push(*vlan))),
                AclAction::Tunnel { target_dp } => {
                    let port = stack_port_toward(*target_dp)
                        .ok_or_else(|| AclError::UnsupportedMatch(format!("no stack path to {target_dp}")))?;
                    of_actions.push(Action::Output(port));
                }
            }
        }

        out.push(OfMsg::FlowMod(FlowMod::add(
            table,
            rule.priority,
            to_of_match(&rule.matches),
            Instructions { actions: of_actions, goto: Some(next_table_after(table)) },
        )));
    }

    Ok(out)
}

fn next_table_after(table: TableName) -> TableName {
    match table {
        TableName::PortAcl => TableName::Vlan,
        TableName::VlanAcl => TableName::EthSrc,
        TableName::EgressAcl => TableName::Flood,
        other => other,
    }
}

/// True if any rule in `acl` uses a `Tunnel` action, meaning it must be
/// recompiled whenever the stack topology (and therefore the path to the
/// target DP) changes.
pub fn has_tunnel_actions(acl: &Acl) -> bool {
    acl.rules.iter().any(|r| r.actions.iter().any(|a| matches!(a, AclAction::Tunnel { .. })))
}

/// Recompiles every tunnel-bearing ACL against the current topology.
/// Called by the Valve Core after a stack link UP/DOWN transition.
pub fn recompile_tunnel_acls(acls: &[Acl], topology: &StackTopology, this_dp: DpId) -> Vec<Result<Vec<OfMsg>>> {
    acls.iter()
        .filter(|acl| has_tunnel_actions(acl))
        .map(|acl| compile_acl(acl, |target| if target == this_dp { None } else { topology.shortest_path_port(this_dp) }))
        .collect()
}

pub fn meter_mod(meter_id: u32, rate_kbps: u64, burst_kb: u64) -> OfMsg {
    OfMsg::MeterMod(MeterMod { meter_id, rate_kbps, burst_kb })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(n: u32) -> PortNo {
        PortNo::new(n).unwrap()
    }

    #[test]
    fn allow_rule_falls_through_to_next_table() {
        let acl = Acl {
            name: "a".into(),
            stage: AclStage::Port,
            rules: vec![AclRule { priority: 100, matches: AclMatch::default(), actions: vec![AclAction::Allow] }],
            meters: vec![],
        };
        let compiled = compile_acl(&acl, |_| None).unwrap();
        let OfMsg::FlowMod(fm) = &compiled[0] else { panic!() };
        assert_eq!(fm.instructions.goto, Some(TableName::Vlan));
        assert!(fm.instructions.actions.is_empty());
    }

    #[test]
    fn drop_rule_clears_all_actions() {
        let acl = Acl {
            name: "a".into(),
            stage: AclStage::Port,
            rules: vec![AclRule {
                priority: 100,
                matches: AclMatch::default(),
                actions: vec![AclAction::Mirror(port(4)), AclAction::Drop],
            }],
            meters: vec![],
        };
        let compiled = compile_acl(&acl, |_| None).unwrap();
        let OfMsg::FlowMod(fm) = &compiled[0] else { panic!() };
        assert!(fm.instructions.actions.is_empty());
    }

    #[test]
    fn tunnel_action_without_path_errors() {
        let acl = Acl {
            name: "a".into(),
            stage: AclStage::Egress,
            rules: vec![AclRule {
                priority: 100,
                matches: AclMatch::default(),
                actions: vec![AclAction::Tunnel { target_dp: DpId::new(9) }],
            }],
            meters: vec![],
        };
        assert!(compile_acl(&acl, |_| None).is_err());
    }

    #[test]
    fn empty_action_list_is_rejected() {
        let acl = Acl {
            name: "a".into(),
            stage: AclStage::Port,
            rules: vec![AclRule { priority: 1, matches: AclMatch::default(), actions: vec![] }],
            meters: vec![],
        };
        assert!(compile_acl(&acl, |_| None).is_err());
    }

    #[test]
    fn a_meter_action_provisions_its_meter_mod_alongside_the_flow() {
        let acl = Acl {
            name: "a".into(),
            stage: AclStage::Port,
            rules: vec![AclRule {
                priority: 100,
                matches: AclMatch::default(),
                actions: vec![AclAction::Meter(7), AclAction::Output(port(2))],
            }],
            meters: vec![MeterConfig { id: 7, rate_kbps: 1000, burst_kb: 100 }],
        };
        let compiled = compile_acl(&acl, |_| None).unwrap();
        assert_eq!(compiled.len(), 2);
        assert!(matches!(&compiled[0], OfMsg::MeterMod(m) if m.meter_id == 7 && m.rate_kbps == 1000));
        let OfMsg::FlowMod(fm) = &compiled[1] else { panic!() };
        assert!(fm.instructions.actions.contains(&Action::Meter(7)));
    }
}
