//! Pedestrian and street network model

pub mod components;
pub mod network;

pub use components::{FootWeighting, StreetEdge, StreetNode, StreetWeighting, walk_millis};
pub use network::{IndexedPoint, StreetGraph};
