//! Shared ambient stack for the Valve control plane: structured audit
//! logging, bounded caches with deterministic eviction, periodic-task
//! gating, and a ring buffer for OpenFlow error correlation.
//!
//! None of this crate touches I/O. It exists because every manager in
//! `valve-core` needs at least one of these primitives, and duplicating
//! them per-manager would drift.

pub mod audit;
pub mod backoff;
pub mod lru_cache;
pub mod ring;
pub mod ticker;

pub use audit::{AuditCategory, AuditOutcome, AuditRecord};
pub use backoff::ExponentialBackoff;
pub use lru_cache::LruCache;
pub use ring::RingBuffer;
pub use ticker::Ticker;
