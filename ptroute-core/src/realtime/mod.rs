//! Realtime overlay: delays, blocked edges and synthetic edges derived from
//! trip updates, layered over the static transit graph without mutating it

mod build;
mod feed;
mod overlay;

pub use feed::{
    RealtimeFeed, StopDelay, StopScheduleRelationship, StopTimeEvent, StopTimeUpdate,
    TripScheduleRelationship, TripUpdate,
};
pub use overlay::RealtimeOverlay;
