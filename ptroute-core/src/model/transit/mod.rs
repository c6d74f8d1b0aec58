//! Time-expanded public transit network

pub mod pt_graph;
pub mod side_tables;
pub(crate) mod storage;
pub mod types;

pub use pt_graph::{EdgeIter, EdgeSink, PtGraph, PtGraphBuilder};
pub use side_tables::SideTables;
pub use types::{
    EdgePayload, EdgeType, FeedIdWithTimezone, PlatformDescriptor, PtEdge, PtEdgeAttributes,
    TripDescriptor, Validity,
};
