//! The Valve: a per-datapath OpenFlow 1.3 forwarding controller.
//!
//! A [`valve::Valve`] owns one datapath's pipeline, host cache, route
//! managers, ACLs, LACP bundles, and stack-port state machine, and turns
//! external events (`datapath_connect`, `rcv_packet`, `reload_config`, the
//! periodic timers) into a deterministically-ordered batch of OpenFlow
//! messages. A [`coordinator::Coordinator`] owns every Valve in a stack
//! and is the only thing allowed to fan an event out across more than one
//! of them.

pub mod acl;
pub mod coordinator;
pub mod error;
pub mod flood;
pub mod hardware;
pub mod host;
pub mod lacp;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod ofmsg;
pub mod pipeline;
pub mod route;
pub mod stacklink;
pub mod valve;

pub use coordinator::{Coordinator, DpBundle, FanOut};
pub use error::{Result, ValveError};
pub use valve::{PktMeta, Valve, ValveOutput};
