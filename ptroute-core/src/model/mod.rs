//! Data model for multimodal routing
//!
//! Contains the street network, the time-expanded transit network and the
//! model that links both id spaces.

pub mod streets;
pub mod transit;
pub mod transit_model;

pub use transit_model::{
    FeedInfo, NodeId, PlatformNodes, PlannedStop, Station, TransitModel, TransitModelMeta,
    TripInfo,
};

pub use streets::{FootWeighting, StreetEdge, StreetGraph, StreetNode, StreetWeighting};
pub use transit::{
    EdgePayload, EdgeType, PtEdge, PtEdgeAttributes, PtGraph, PtGraphBuilder, Validity,
};
