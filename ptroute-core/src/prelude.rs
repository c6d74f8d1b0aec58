//! Commonly used items, for `use ptroute_core::prelude::*`

pub use crate::loading::schedule::Feed;
pub use crate::loading::{TransitModelConfig, create_transit_model};
pub use crate::model::{StreetGraph, StreetWeighting, TransitModel};
pub use crate::realtime::{RealtimeFeed, RealtimeOverlay, TripUpdate};
pub use crate::routing::{
    Itinerary, Leg, Location, PtRequest, PtResponse, PtRouter, RouterConfig,
};
pub use crate::{Error, Millis, PtEdgeId, PtNodeId, Time};
