//! Scenario 3 (§8): a port flap emits deletes before adds and the host
//! cache drops the flapped port's entries, then rebuilds on the next learn.

use std::sync::Arc;
use valve_core::hardware::HardwareProfileKind;
use valve_core::model::dp::DpConfig;
use valve_core::model::port::PortConfig;
use valve_core::model::vlan::VlanConfig;
use valve_core::notify::NullNotifySink;
use valve_core::ofmsg::{OfMsg, TableName};
use valve_core::{PktMeta, Valve};
use valve_types::{DpId, MacAddress, PortNo, VlanId};

fn port(n: u32) -> PortNo {
    PortNo::new(n).unwrap()
}

fn vlan(n: u16) -> VlanId {
    VlanId::new(n).unwrap()
}

fn new_valve() -> Valve {
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
    Valve::new(dp, ports, vlans, vec![], Arc::new(valve_core::metrics::NullMetricSink), Arc::new(NullNotifySink))
}

fn learn_packet() -> PktMeta {
    PktMeta {
        in_port: port(1),
        vlan: Some(vlan(0x100)),
        eth_src: MacAddress::new([0x02, 0, 0, 0, 0, 1]),
        eth_dst: MacAddress::BROADCAST,
        eth_type: 0x0800,
    }
}

#[test]
fn flap_on_already_up_port_deletes_before_it_adds() {
    let mut v = new_valve();
    v.datapath_connect(0, &[port(1), port(3)]);
    v.rcv_packet(5, learn_packet()).unwrap();

    let out = v.port_status_handler(10, port(1), true).unwrap();

    let delete_idx = out.ofmsgs.iter().position(|m| matches!(m, OfMsg::FlowMod(fm) if fm.is_delete()));
    let add_idx = out.ofmsgs.iter().position(|m| matches!(m, OfMsg::FlowMod(fm) if !fm.is_delete()));
    assert!(delete_idx.is_some());
    if let (Some(d), Some(a)) = (delete_idx, add_idx) {
        assert!(d < a, "delete at {d} must precede add at {a}");
    }
}

#[test]
fn flap_drops_cached_hosts_on_the_flapped_port_and_relearning_rebuilds() {
    let mut v = new_valve();
    v.datapath_connect(0, &[port(1), port(3)]);
    v.rcv_packet(5, learn_packet()).unwrap();

    v.port_status_handler(10, port(1), true).unwrap();

    let relearn = v.rcv_packet(11, learn_packet()).unwrap();
    assert_eq!(relearn.ofmsgs.len(), 2, "host must be treated as new after the flap purged its cache entry");
}
