//! Scenario 2 (§8): learning a host produces exactly two flows and a
//! notification; re-feeding the identical packet is a no-op.

use std::sync::Arc;
use valve_core::hardware::HardwareProfileKind;
use valve_core::model::dp::DpConfig;
use valve_core::model::port::PortConfig;
use valve_core::model::vlan::VlanConfig;
use valve_core::notify::Notification;
use valve_core::ofmsg::TableName;
use valve_core::{PktMeta, Valve};
use valve_types::{DpId, MacAddress, PortNo, VlanId};

mod support;
use support::RecordingNotifySink;

fn port(n: u32) -> PortNo {
    PortNo::new(n).unwrap()
}

fn vlan(n: u16) -> VlanId {
    VlanId::new(n).unwrap()
}

fn single_vlan_dp() -> (DpConfig, Vec<PortConfig>, Vec<VlanConfig>) {
    let dp = DpConfig {
        id: DpId::new(1),
        name: "dp1".into(),
        hardware: HardwareProfileKind::Generic,
        ports: vec![port(1), port(3)],
        vlans: vec![vlan(0x100)],
        tables: vec![TableName::Vlan, TableName::Classification, TableName::EthSrc, TableName::EthDst, TableName::Flood],
        stack_root: None,
        global_vlan: None,
        stack_route_learning: false,
        group_table: false,
    };
    let ports = vec![
        PortConfig {
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
        },
        PortConfig {
            number: port(3),
            description: "p3".into(),
            tagged_vlans: vec![vlan(0x100)],
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
        },
    ];
    let vlans = vec![VlanConfig {
        vid: vlan(0x100),
        tagged_ports: vec![port(3)],
        untagged_ports: vec![port(1)],
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

fn learn_packet() -> PktMeta {
    PktMeta {
        in_port: port(1),
        vlan: Some(vlan(0x100)),
        eth_src: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
        eth_dst: MacAddress::BROADCAST,
        eth_type: 0x0800,
    }
}

#[test]
fn first_packet_learns_host_with_two_flows_and_one_notification() {
    let (dp, ports, vlans) = single_vlan_dp();
    let notify = Arc::new(RecordingNotifySink::default());
    let mut v = Valve::new(dp, ports, vlans, vec![], Arc::new(valve_core::metrics::NullMetricSink), notify.clone());
    v.datapath_connect(0, &[port(1), port(3)]);

    let out = v.rcv_packet(10, learn_packet()).unwrap();
    assert_eq!(out.ofmsgs.len(), 2);
    assert_eq!(out.notifications.len(), 1);
    assert!(matches!(&out.notifications[0], Notification::HostLearned { vlan: vlan_id, mac, .. }
        if *vlan_id == vlan(0x100) && *mac == learn_packet().eth_src));
}

#[test]
fn repeat_packet_from_same_port_is_a_no_op() {
    let (dp, ports, vlans) = single_vlan_dp();
    let mut v = Valve::new(dp, ports, vlans, vec![], Arc::new(valve_core::metrics::NullMetricSink), Arc::new(valve_core::notify::NullNotifySink));
    v.datapath_connect(0, &[port(1), port(3)]);

    v.rcv_packet(10, learn_packet()).unwrap();
    let second = v.rcv_packet(11, learn_packet()).unwrap();
    assert!(second.ofmsgs.is_empty());
    assert!(second.notifications.is_empty());
}

#[test]
fn host_count_metric_reflects_the_learned_host() {
    let (dp, ports, vlans) = single_vlan_dp();
    let metrics = Arc::new(support::RecordingMetricSink::default());
    let mut v = Valve::new(dp, ports, vlans, vec![], metrics.clone(), Arc::new(valve_core::notify::NullNotifySink));
    v.datapath_connect(0, &[port(1), port(3)]);
    v.rcv_packet(10, learn_packet()).unwrap();

    let recorded = metrics.recorded.lock().unwrap();
    let saw_host_count = recorded.iter().any(|m| matches!(m, valve_core::metrics::Metric::HostCount { count: 1, .. }));
    assert!(saw_host_count);
}
