//! Notification sink: an injected, fire-and-forget callback trait for
//! events operators or other Valves need to react to, distinct from the
//! `MetricSink`'s time-series measurements.

use valve_types::{DpId, MacAddress, PortNo, VlanId};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A host was learned on a port/VLAN.
    HostLearned { dp: DpId, port: PortNo, vlan: VlanId, mac: MacAddress },
    /// A previously-learned host expired from the cache.
    HostExpired { dp: DpId, port: PortNo, vlan: VlanId, mac: MacAddress },
    /// A port's link state changed.
    PortStatus { dp: DpId, port: PortNo, up: bool },
    /// A datapath connected and is being configured from scratch.
    ColdStart { dp: DpId },
    /// A datapath reconnected and has been reconciled without a cold start.
    WarmStart { dp: DpId },
    /// The stack topology elected a new root datapath.
    StackRootChanged { new_root: DpId },
    /// A configuration change was rejected and the previous configuration
    /// remains in force.
    ConfigRejected { dp: DpId, reason: String },
}

/// Receives notifications emitted by core managers. Implementations must
/// not block the caller.
pub trait NotifySink: Send + Sync {
    fn notify(&self, event: Notification);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifySink;

impl NotifySink for NullNotifySink {
    fn notify(&self, _event: Notification) {}
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingNotifySink;
    use super::*;

    #[test]
    fn null_sink_accepts_without_panicking() {
        let sink = NullNotifySink;
        sink.notify(Notification::ColdStart { dp: DpId::new(1) });
    }

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingNotifySink::default();
        sink.notify(Notification::ColdStart { dp: DpId::new(1) });
        sink.notify(Notification::WarmStart { dp: DpId::new(1) });
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Notification::ColdStart { dp: DpId::new(1) });
    }
}
