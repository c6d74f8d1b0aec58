//! Multimodal journey planning over a street graph combined with a
//! time-expanded public transit network.
//!
//! The crate is organised leaves first:
//!
//! - [`model`] holds the street graph, the append-only transit graph store and
//!   the [`TransitModel`] tying both together.
//! - [`loading`] turns already-parsed schedule facts into the time-expanded
//!   network.
//! - [`realtime`] builds a read-only overlay of delays, blocked edges and
//!   synthetic edges from trip updates.
//! - [`routing`] contains labels, the graph explorer, the multi-criteria label
//!   setting and the router that stitches access, main and egress searches into
//!   itineraries.

pub mod error;
pub mod loading;
pub mod model;
pub mod prelude;
pub mod realtime;
pub mod routing;

pub use error::Error;
pub use model::{PtGraph, StreetGraph, TransitModel};
pub use petgraph::graph::NodeIndex as StreetNodeId;

/// Node id in the transit graph id space
pub type PtNodeId = u32;
/// Edge id in the transit graph id space, shared with realtime overlay edges
pub type PtEdgeId = u32;
/// Milliseconds since the unix epoch, or a duration in milliseconds
pub type Millis = i64;
/// Seconds since midnight of a service day
pub type Time = u32;

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;
pub const MILLIS_PER_DAY: Millis = 24 * 60 * 60 * 1000;
