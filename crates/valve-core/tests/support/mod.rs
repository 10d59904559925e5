//! Recording sinks shared by the integration tests. `valve-core`'s own
//! `test_support` modules are crate-private, so the integration test
//! binaries get their own copy built against the public `MetricSink` /
//! `NotifySink` traits.

use std::sync::Mutex;
use valve_core::metrics::{Metric, MetricSink};
use valve_core::notify::{Notification, NotifySink};

#[derive(Debug, Default)]
pub struct RecordingMetricSink {
    pub recorded: Mutex<Vec<Metric>>,
}

impl MetricSink for RecordingMetricSink {
    fn record(&self, metric: Metric) {
        self.recorded.lock().unwrap().push(metric);
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifySink {
    pub events: Mutex<Vec<Notification>>,
}

impl NotifySink for RecordingNotifySink {
    fn notify(&self, event: Notification) {
        self.events.lock().unwrap().push(event);
    }
}
