//! Multimodal model: street graph, transit graph and the tables linking them

use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use geo::Point;
use hashbrown::HashMap;
use petgraph::graph::NodeIndex;

use super::streets::StreetGraph;
use super::transit::{FeedIdWithTimezone, PlatformDescriptor, PtGraph, TripDescriptor};
use crate::{Error, PtEdgeId, PtNodeId, Time};

/// A node of the multimodal graph. Stations exist in both id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub street: Option<NodeIndex>,
    pub pt: Option<PtNodeId>,
}

impl NodeId {
    pub fn street(node: NodeIndex) -> Self {
        Self {
            street: Some(node),
            pt: None,
        }
    }

    pub fn pt(node: PtNodeId) -> Self {
        Self {
            street: None,
            pt: Some(node),
        }
    }
}

/// A stop of a feed, represented by a station node in the transit graph and,
/// when it could be snapped, a connector node in the street graph
#[derive(Debug, Clone)]
pub struct Station {
    pub feed_id: String,
    pub stop_id: String,
    pub name: String,
    pub geometry: Point<f64>,
    pub pt_node: PtNodeId,
    pub street_node: Option<NodeIndex>,
}

/// Entry and exit nodes of one (stop, route) platform
#[derive(Debug, Clone)]
pub struct PlatformNodes {
    pub enter: PtNodeId,
    pub exit: PtNodeId,
    pub route_type: i32,
    pub descriptor: Arc<PlatformDescriptor>,
}

#[derive(Debug, Clone)]
pub struct FeedInfo {
    pub feed: Arc<FeedIdWithTimezone>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl FeedInfo {
    pub fn zone(&self) -> Tz {
        self.feed.zone
    }
}

/// Scheduled call of a trip at a stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStop {
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival: Time,
    pub departure: Time,
}

#[derive(Debug, Clone)]
pub struct TripInfo {
    pub descriptor: Arc<TripDescriptor>,
    pub route_type: i32,
    pub stops: Vec<PlannedStop>,
    /// `BOARD` edge at the first stop, the entry point of the hop/dwell chain
    pub first_board_edge: PtEdgeId,
}

impl TripInfo {
    pub fn stop_by_sequence(&self, stop_sequence: u32) -> Option<(usize, &PlannedStop)> {
        self.stops
            .iter()
            .enumerate()
            .find(|(_, stop)| stop.stop_sequence == stop_sequence)
    }
}

/// Parameters the model was built with
#[derive(Debug, Clone, Copy)]
pub struct TransitModelMeta {
    pub max_transfer_walk_time: Time,
    pub walk_speed_kmh: f64,
}

/// Read-only multimodal model shared by all searches
#[derive(Debug, Clone)]
pub struct TransitModel {
    pub street_graph: StreetGraph,
    pub pt_graph: PtGraph,
    pub(crate) stations: Vec<Station>,
    pub(crate) station_index: HashMap<(String, String), usize>,
    pub(crate) platforms: HashMap<PlatformDescriptor, PlatformNodes>,
    pub(crate) route_types: HashMap<(String, String), i32>,
    pub(crate) pt_to_street: HashMap<PtNodeId, NodeIndex>,
    pub(crate) street_to_pt: HashMap<NodeIndex, PtNodeId>,
    pub(crate) trips: HashMap<(String, String), TripInfo>,
    pub(crate) feeds: HashMap<String, FeedInfo>,
    pub meta: TransitModelMeta,
}

impl TransitModel {
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Station of `stop_id` in feed `feed_id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::StationNotFound`] for unknown stops
    pub fn station(&self, feed_id: &str, stop_id: &str) -> Result<&Station, Error> {
        self.station_index
            .get(&(feed_id.to_string(), stop_id.to_string()))
            .map(|&idx| &self.stations[idx])
            .ok_or_else(|| Error::StationNotFound(format!("{feed_id}:{stop_id}")))
    }

    pub fn station_by_pt_node(&self, node: PtNodeId) -> Option<&Station> {
        // station nodes are created first, in stop order
        self.stations
            .binary_search_by_key(&node, |station| station.pt_node)
            .ok()
            .map(|idx| &self.stations[idx])
    }

    pub fn platform(&self, descriptor: &PlatformDescriptor) -> Option<&PlatformNodes> {
        self.platforms.get(descriptor)
    }

    pub fn route_type(&self, feed_id: &str, route_id: &str) -> Option<i32> {
        self.route_types
            .get(&(feed_id.to_string(), route_id.to_string()))
            .copied()
    }

    pub fn trip(&self, feed_id: &str, trip_id: &str) -> Option<&TripInfo> {
        self.trips.get(&(feed_id.to_string(), trip_id.to_string()))
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    pub fn feed(&self, feed_id: &str) -> Option<&FeedInfo> {
        self.feeds.get(feed_id)
    }

    pub fn street_node_of(&self, pt: PtNodeId) -> Option<NodeIndex> {
        self.pt_to_street.get(&pt).copied()
    }

    pub fn pt_node_of(&self, street: NodeIndex) -> Option<PtNodeId> {
        self.street_to_pt.get(&street).copied()
    }

    /// Multimodal node for a street node, joined with its station if any
    pub fn node_for_street(&self, street: NodeIndex) -> NodeId {
        NodeId {
            street: Some(street),
            pt: self.pt_node_of(street),
        }
    }

    /// Multimodal node for a transit node, joined with its connector if any
    pub fn node_for_pt(&self, pt: PtNodeId) -> NodeId {
        NodeId {
            street: self.street_node_of(pt),
            pt: Some(pt),
        }
    }
}

#[cfg(test)]
impl TransitModel {
    /// Model without any schedule, for search tests over streets
    pub(crate) fn streets_only(street_graph: StreetGraph) -> Self {
        Self {
            street_graph,
            pt_graph: super::transit::PtGraphBuilder::new().finish(),
            stations: Vec::new(),
            station_index: HashMap::new(),
            platforms: HashMap::new(),
            route_types: HashMap::new(),
            pt_to_street: HashMap::new(),
            street_to_pt: HashMap::new(),
            trips: HashMap::new(),
            feeds: HashMap::new(),
            meta: TransitModelMeta {
                max_transfer_walk_time: 0,
                walk_speed_kmh: 5.0,
            },
        }
    }
}
