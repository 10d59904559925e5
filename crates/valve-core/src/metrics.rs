//! Metrics sink: an injected, fire-and-forget callback trait.
//!
//! The core never owns a metrics transport (no Prometheus registry, no
//! exporter); it only ever calls out through this trait, exactly as the
//! teacher's FDB orchestrator calls out through `FdbOrchCallbacks` rather
//! than touching SAI or Redis directly.

use valve_types::{DpId, PortNo, VlanId};

/// A single forwarding-plane measurement the core wants recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// Number of learned hosts currently cached for a VLAN on a port.
    HostCount { dp: DpId, port: PortNo, vlan: VlanId, count: u64 },
    /// High-water mark of `HostCount` since the last report, per the
    /// host cache's stats discipline.
    HostCountHighWater { dp: DpId, port: PortNo, vlan: VlanId, count: u64 },
    /// Number of flow-mods sent to a datapath in the current batch.
    FlowModsSent { dp: DpId, count: u64 },
    /// Packet-in rate-limiter drop count for a datapath.
    PacketInDropped { dp: DpId, count: u64 },
    /// LACP bundle state change (0 = down, 1 = up).
    LacpBundleUp { dp: DpId, bundle_id: u32, up: bool },
    /// Stack port state change.
    StackPortUp { dp: DpId, port: PortNo, up: bool },
}

/// Receives metrics emitted by core managers. Implementations must not
/// block the caller; if publishing can fail or stall, buffer internally.
pub trait MetricSink: Send + Sync {
    fn record(&self, metric: Metric);
}

/// A `MetricSink` that discards everything, for tests and for datapaths
/// with metrics disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record(&self, _metric: Metric) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecordingMetricSink {
        pub recorded: Mutex<Vec<Metric>>,
    }

    impl MetricSink for RecordingMetricSink {
        fn record(&self, metric: Metric) {
            self.recorded.lock().unwrap().push(metric);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingMetricSink;
    use super::*;

    #[test]
    fn null_sink_accepts_without_panicking() {
        let sink = NullMetricSink;
        sink.record(Metric::FlowModsSent { dp: DpId::new(1), count: 3 });
    }

    #[test]
    fn recording_sink_captures_metrics_in_order() {
        let sink = RecordingMetricSink::default();
        sink.record(Metric::FlowModsSent { dp: DpId::new(1), count: 1 });
        sink.record(Metric::FlowModsSent { dp: DpId::new(1), count: 2 });
        let recorded = sink.recorded.lock().unwrap();
        assert_eq!(recorded.len(), 2);
    }
}
