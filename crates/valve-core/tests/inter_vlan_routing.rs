//! Traffic crossing a VLAN's router MAC gets its eth_dst rewrite flow
//! refreshed for the routed peer, on top of the usual host-learning flows.

use std::sync::Arc;
use valve_core::hardware::HardwareProfileKind;
use valve_core::model::dp::DpConfig;
use valve_core::model::port::PortConfig;
use valve_core::model::vlan::VlanConfig;
use valve_core::ofmsg::{OfMsg, TableName};
use valve_core::{PktMeta, Valve};
use valve_types::{DpId, MacAddress, PortNo, VlanId};

fn port(n: u32) -> PortNo {
    PortNo::new(n).unwrap()
}

fn vlan(n: u16) -> VlanId {
    VlanId::new(n).unwrap()
}

fn router_mac() -> MacAddress {
    MacAddress::new([0x0e, 0, 0, 0, 0, 1])
}

fn routed_vlan_dp() -> (DpConfig, Vec<PortConfig>, Vec<VlanConfig>) {
    let dp = DpConfig {
        id: DpId::new(1),
        name: "dp1".into(),
        hardware: HardwareProfileKind::Generic,
        ports: vec![port(1)],
        vlans: vec![vlan(0x100)],
        tables: vec![TableName::Vlan, TableName::Classification, TableName::EthSrc, TableName::EthDst, TableName::Flood],
        stack_root: None,
        global_vlan: None,
        stack_route_learning: false,
        group_table: false,
    };
    let ports = vec![PortConfig {
        number: port(1),
        description: "p1".into(),
        tagged_vlans: vec![],
        native_vlan: Some(vlan(0x100)),
        lacp_bundle: None,
        lacp_passthrough: vec![],
        stack_peer: None,
        mirror_targets: vec![],
        permanent_learn: false,
        restricted_bcast_arpnd: false,
        acl_in: None,
        acl_out: None,
        coprocessor: false,
    }];
    let vlans = vec![VlanConfig {
        vid: vlan(0x100),
        tagged_ports: vec![],
        untagged_ports: vec![port(1)],
        faucet_mac: Some(router_mac()),
        vips: vec![],
        routes: vec![],
        acl_in: vec![],
        host_cache_limit: 1024,
        idle_timeout: 300,
        hard_timeout: 0,
        learn_jitter: 0,
        learn_ban_timeout: 60,
        cache_update_guard_time: 2,
        neighbor_timeout: 600,
    }];
    (dp, ports, vlans)
}

fn new_valve() -> Valve {
    let (dp, ports, vlans) = routed_vlan_dp();
    Valve::new(dp, ports, vlans, vec![], Arc::new(valve_core::metrics::NullMetricSink), Arc::new(valve_core::notify::NullNotifySink))
}

#[test]
fn a_frame_arriving_from_the_router_mac_gets_an_extra_eth_dst_flow() {
    let mut v = new_valve();
    v.datapath_connect(0, &[port(1)]);

    let pkt = PktMeta {
        in_port: port(1),
        vlan: Some(vlan(0x100)),
        eth_src: router_mac(),
        eth_dst: MacAddress::new([0x02, 0, 0, 0, 0, 2]),
        eth_type: 0x0800,
    };
    let out = v.rcv_packet(10, pkt).unwrap();

    let eth_dst_flows = out.ofmsgs.iter().filter(|m| matches!(m, OfMsg::FlowMod(fm) if fm.table == TableName::EthDst)).count();
    assert_eq!(eth_dst_flows, 2, "the learn flow plus the routed-peer refresh flow");
}

#[test]
fn plain_host_to_host_traffic_gets_no_extra_router_flow() {
    let mut v = new_valve();
    v.datapath_connect(0, &[port(1)]);

    let pkt = PktMeta {
        in_port: port(1),
        vlan: Some(vlan(0x100)),
        eth_src: MacAddress::new([0x02, 0, 0, 0, 0, 2]),
        eth_dst: MacAddress::new([0x02, 0, 0, 0, 0, 3]),
        eth_type: 0x0800,
    };
    let out = v.rcv_packet(10, pkt).unwrap();

    let eth_dst_flows = out.ofmsgs.iter().filter(|m| matches!(m, OfMsg::FlowMod(fm) if fm.table == TableName::EthDst)).count();
    assert_eq!(eth_dst_flows, 1, "only the ordinary host-learn flow");
}
