//! Per-IP-version FIB programming and neighbor resolution, built on the
//! version-agnostic logic in [`common`].

pub mod common;
pub mod v4;
pub mod v6;

pub use common::{RouteEntry, ResolveBudget, ResolveState};
pub use v4::RouteManagerV4;
pub use v6::RouteManagerV6;
