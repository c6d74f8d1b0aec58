use hashbrown::{HashMap, HashSet};

use super::feed::StopDelay;
use crate::model::transit::{EdgeSink, PlatformDescriptor, PtEdge, PtEdgeAttributes};
use crate::model::{PlatformNodes, PtGraph, TripInfo};
use crate::{Millis, PtEdgeId, PtNodeId};

/// Read-only realtime state layered over the static transit graph.
///
/// Synthetic nodes and edges live in their own append-only id range starting
/// right above the static graph, so searches treat both id spaces alike.
#[derive(Debug, Clone, Default)]
pub struct RealtimeOverlay {
    base_nodes: PtNodeId,
    base_edges: PtEdgeId,
    next_node: PtNodeId,
    pub(super) blocked: HashSet<PtEdgeId>,
    pub(super) board_delays: HashMap<PtEdgeId, Millis>,
    pub(super) alight_delays: HashMap<PtEdgeId, Millis>,
    edges: Vec<PtEdge>,
    out_edges: HashMap<PtNodeId, Vec<usize>>,
    in_edges: HashMap<PtNodeId, Vec<usize>>,
    pub(super) platforms: HashMap<PlatformDescriptor, PlatformNodes>,
    pub(super) trip_delays: HashMap<(String, String), Vec<StopDelay>>,
    pub(super) added_trips: HashMap<(String, String), TripInfo>,
}

impl RealtimeOverlay {
    /// Overlay without any realtime information for `graph`
    pub fn empty(graph: &PtGraph) -> Self {
        Self {
            base_nodes: graph.node_count(),
            base_edges: graph.edge_count(),
            next_node: graph.node_count(),
            ..Self::default()
        }
    }

    pub fn is_blocked(&self, edge: PtEdgeId) -> bool {
        self.blocked.contains(&edge)
    }

    /// Known departure delay of a `BOARD` edge in milliseconds
    pub fn board_delay(&self, edge: PtEdgeId) -> Millis {
        self.board_delays.get(&edge).copied().unwrap_or(0)
    }

    /// Known arrival delay of an `ALIGHT` edge in milliseconds
    pub fn alight_delay(&self, edge: PtEdgeId) -> Millis {
        self.alight_delays.get(&edge).copied().unwrap_or(0)
    }

    pub fn blocked_edges(&self) -> &HashSet<PtEdgeId> {
        &self.blocked
    }

    /// Synthetic edges leaving `node`
    pub fn edges_around(&self, node: PtNodeId) -> impl Iterator<Item = &PtEdge> {
        Self::indexed(&self.edges, self.out_edges.get(&node))
    }

    /// Synthetic edges entering `node`
    pub fn back_edges_around(&self, node: PtNodeId) -> impl Iterator<Item = &PtEdge> {
        Self::indexed(&self.edges, self.in_edges.get(&node))
    }

    fn indexed<'a>(
        edges: &'a [PtEdge],
        index: Option<&'a Vec<usize>>,
    ) -> impl Iterator<Item = &'a PtEdge> {
        index
            .into_iter()
            .flatten()
            .map(move |&position| &edges[position])
    }

    pub fn synthetic_edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_synthetic_edge(&self, edge: PtEdgeId) -> bool {
        edge >= self.base_edges
    }

    pub fn is_synthetic_node(&self, node: PtNodeId) -> bool {
        node >= self.base_nodes
    }

    /// Realtime state per stop of a trip, in stop order
    pub fn trip_delays(&self, feed_id: &str, trip_id: &str) -> Option<&[StopDelay]> {
        self.trip_delays
            .get(&(feed_id.to_string(), trip_id.to_string()))
            .map(Vec::as_slice)
    }

    /// Trip that exists only in the realtime feed
    pub fn added_trip(&self, feed_id: &str, trip_id: &str) -> Option<&TripInfo> {
        self.added_trips
            .get(&(feed_id.to_string(), trip_id.to_string()))
    }

    pub fn added_trip_count(&self) -> usize {
        self.added_trips.len()
    }
}

impl EdgeSink for RealtimeOverlay {
    fn create_node(&mut self) -> PtNodeId {
        let node = self.next_node;
        self.next_node += 1;
        node
    }

    #[allow(clippy::cast_possible_truncation)]
    fn create_edge(
        &mut self,
        src: PtNodeId,
        dest: PtNodeId,
        attrs: PtEdgeAttributes,
    ) -> PtEdgeId {
        let position = self.edges.len();
        let id = self.base_edges + position as PtEdgeId;
        self.edges.push(PtEdge {
            id,
            src,
            dest,
            attrs,
        });
        self.out_edges.entry(src).or_default().push(position);
        self.in_edges.entry(dest).or_default().push(position);
        id
    }
}
