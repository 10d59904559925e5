//! The periodic advertisement and flow-removed-driven expiry entry points
//! named in the Valve Core's dispatch table.

use std::sync::Arc;
use valve_core::hardware::HardwareProfileKind;
use valve_core::model::dp::DpConfig;
use valve_core::model::port::PortConfig;
use valve_core::model::vlan::VlanConfig;
use valve_core::notify::NullNotifySink;
use valve_core::ofmsg::{Match, TableName};
use valve_core::{PktMeta, Valve};
use valve_types::{DpId, IpAddress, IpPrefix, Ipv4Address, MacAddress, PortNo, VlanId};

fn port(n: u32) -> PortNo {
    PortNo::new(n).unwrap()
}

fn vlan(n: u16) -> VlanId {
    VlanId::new(n).unwrap()
}

fn fixture(vips: Vec<IpPrefix>) -> Valve {
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
        faucet_mac: None,
        vips,
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
    Valve::new(dp, ports, vlans, vec![], Arc::new(valve_core::metrics::NullMetricSink), Arc::new(NullNotifySink))
}

#[test]
fn advertise_emits_gratuitous_arp_for_a_configured_v4_vip() {
    let vip = IpPrefix::new(IpAddress::V4(Ipv4Address::new(10, 0, 0, 1)), 24).unwrap();
    let mut v = fixture(vec![vip]);
    v.datapath_connect(0, &[port(1)]);

    let out = v.advertise(0);
    assert_eq!(out.ofmsgs.len(), 1);
}

#[test]
fn a_flow_removed_event_for_eth_src_expires_the_host_and_its_eth_dst_entry() {
    let mut v = fixture(vec![]);
    v.datapath_connect(0, &[port(1)]);

    let learn = PktMeta {
        in_port: port(1),
        vlan: Some(vlan(0x100)),
        eth_src: MacAddress::new([0x02, 0, 0, 0, 0, 1]),
        eth_dst: MacAddress::BROADCAST,
        eth_type: 0x0800,
    };
    v.rcv_packet(5, learn.clone()).unwrap();

    let m = Match::default().with_vlan(vlan(0x100)).with_eth_src(learn.eth_src);
    let out = v.flow_timeout(10, TableName::EthSrc, m).unwrap();

    assert_eq!(out.notifications.len(), 1);
    assert_eq!(out.ofmsgs.len(), 1);

    let relearn = v.rcv_packet(11, learn).unwrap();
    assert_eq!(relearn.ofmsgs.len(), 2, "the host must be treated as new again after flow_timeout expired it");
}
