//! Traffic arriving on the synthetic global VLAN carries its true VID in
//! the low bits of `eth_dst`; the core must decode it and learn the host
//! on the real VLAN, bypassing the arriving port's usual membership check.

use std::sync::Arc;
use valve_core::hardware::HardwareProfileKind;
use valve_core::model::dp::DpConfig;
use valve_core::model::port::PortConfig;
use valve_core::model::vlan::VlanConfig;
use valve_core::ofmsg::TableName;
use valve_core::{PktMeta, Valve};
use valve_types::{DpId, MacAddress, PortNo, VlanId};

fn port(n: u32) -> PortNo {
    PortNo::new(n).unwrap()
}

fn vlan(n: u16) -> VlanId {
    VlanId::new(n).unwrap()
}

fn routed_dp() -> (DpConfig, Vec<PortConfig>, Vec<VlanConfig>) {
    let dp = DpConfig {
        id: DpId::new(1),
        name: "dp1".into(),
        hardware: HardwareProfileKind::Generic,
        ports: vec![port(1)],
        vlans: vec![vlan(100)],
        tables: vec![TableName::Vlan, TableName::Classification, TableName::EthSrc, TableName::EthDst, TableName::Flood],
        stack_root: None,
        global_vlan: Some(vlan(4094)),
        stack_route_learning: false,
        group_table: false,
    };
    let ports = vec![PortConfig {
        number: port(1),
        description: "inter-dp link".into(),
        tagged_vlans: vec![vlan(4094)],
        native_vlan: None,
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
        vid: vlan(100),
        tagged_ports: vec![],
        untagged_ports: vec![],
        faucet_mac: None,
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
    let (dp, ports, vlans) = routed_dp();
    Valve::new(dp, ports, vlans, vec![], Arc::new(valve_core::metrics::NullMetricSink), Arc::new(valve_core::notify::NullNotifySink))
}

#[test]
fn packet_on_the_global_vlan_is_learned_on_the_vid_encoded_in_eth_dst() {
    let mut v = new_valve();
    v.datapath_connect(0, &[port(1)]);

    let eth_dst = MacAddress::with_low_vid(MacAddress::new([0x0e, 0, 0, 0, 0, 0]), 100);
    let pkt = PktMeta {
        in_port: port(1),
        vlan: Some(vlan(4094)),
        eth_src: MacAddress::new([0x02, 0, 0, 0, 0, 1]),
        eth_dst,
        eth_type: 0x0800,
    };

    let out = v.rcv_packet(10, pkt).unwrap();
    assert_eq!(out.notifications.len(), 1, "the arriving port carries only the global vlan, not vlan 100");
}

#[test]
fn a_global_vlan_packet_whose_eth_dst_has_no_legal_vid_is_dropped_without_an_error() {
    let mut v = new_valve();
    v.datapath_connect(0, &[port(1)]);

    let pkt = PktMeta {
        in_port: port(1),
        vlan: Some(vlan(4094)),
        eth_src: MacAddress::new([0x02, 0, 0, 0, 0, 1]),
        eth_dst: MacAddress::new([0x0e, 0, 0, 0, 0, 0]),
        eth_type: 0x0800,
    };

    let out = v.rcv_packet(10, pkt).unwrap();
    assert!(out.ofmsgs.is_empty());
    assert!(out.notifications.is_empty());
}
