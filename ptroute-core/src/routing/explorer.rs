//! Edge exploration over the street graph, the static transit graph and the
//! realtime overlay.

use petgraph::{
    Direction,
    graph::{EdgeIndex, NodeIndex},
    visit::EdgeRef,
};

use crate::model::streets::walk_millis;
use crate::model::transit::{EdgeType, PtEdge, types::millis_of_day};
use crate::model::{FootWeighting, NodeId, StreetWeighting, TransitModel};
use crate::realtime::RealtimeOverlay;
use crate::{MILLIS_PER_DAY, Millis};

use super::label::Label;

/// A street segment traversed on foot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreetHop {
    pub edge: EdgeIndex,
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub distance: f64,
    pub millis: Millis,
}

/// An edge of the multimodal graph in its stored orientation
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEdge {
    Street(StreetHop),
    Transit(PtEdge),
}

impl GraphEdge {
    pub fn edge_type(&self) -> EdgeType {
        match self {
            GraphEdge::Street(_) => EdgeType::Highway,
            GraphEdge::Transit(edge) => edge.edge_type(),
        }
    }

    pub fn transfers(&self) -> u32 {
        match self {
            GraphEdge::Street(_) => 0,
            GraphEdge::Transit(edge) => edge.attrs.transfers(),
        }
    }

    pub fn route_type(&self) -> Option<i32> {
        match self {
            GraphEdge::Street(_) => None,
            GraphEdge::Transit(edge) => edge.attrs.route_type(),
        }
    }

    pub fn as_transit(&self) -> Option<&PtEdge> {
        match self {
            GraphEdge::Street(_) => None,
            GraphEdge::Transit(edge) => Some(edge),
        }
    }
}

/// Which parts of the network a search may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExploreMode {
    /// Streets and the complete transit network
    #[default]
    Mixed,
    /// Streets plus the platform entries (forward) or exits (reverse) that
    /// bound the transit network
    WalkOnly,
    /// Never leaves the transit network in search direction
    PtOnly,
}

/// Yields the edges a label can be extended across and their traversal times
#[derive(Clone, Copy)]
pub struct GraphExplorer<'a> {
    model: &'a TransitModel,
    overlay: Option<&'a RealtimeOverlay>,
    weighting: &'a dyn StreetWeighting,
    reverse: bool,
    mode: ExploreMode,
    ignore_validity: bool,
    blocked_route_types: u32,
    walk_speed_kmh: f64,
}

impl<'a> GraphExplorer<'a> {
    pub fn new(model: &'a TransitModel, reverse: bool, mode: ExploreMode) -> Self {
        Self {
            model,
            overlay: None,
            weighting: &FootWeighting,
            reverse,
            mode,
            ignore_validity: false,
            blocked_route_types: 0,
            walk_speed_kmh: model.meta.walk_speed_kmh,
        }
    }

    #[must_use]
    pub fn with_overlay(mut self, overlay: Option<&'a RealtimeOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    #[must_use]
    pub fn with_weighting(mut self, weighting: &'a dyn StreetWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    #[must_use]
    pub fn with_walk_speed(mut self, walk_speed_kmh: f64) -> Self {
        self.walk_speed_kmh = walk_speed_kmh;
        self
    }

    /// Route types whose bit is set are never entered or transferred to
    #[must_use]
    pub fn with_blocked_route_types(mut self, mask: u32) -> Self {
        self.blocked_route_types = mask;
        self
    }

    #[must_use]
    pub fn ignoring_validity(mut self, ignore: bool) -> Self {
        self.ignore_validity = ignore;
        self
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn model(&self) -> &'a TransitModel {
        self.model
    }

    pub fn overlay(&self) -> Option<&'a RealtimeOverlay> {
        self.overlay
    }

    /// Edges leaving the node of `label` in search direction
    pub fn explore(&self, label: &Label) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        if let Some(pt) = label.node.pt {
            self.transit_edges(pt, label.time, &mut edges);
        }
        if let Some(street) = label.node.street {
            self.street_edges(street, &mut edges);
        }
        edges
    }

    fn transit_edges(&self, node: u32, time: Millis, out: &mut Vec<GraphEdge>) {
        let graph = &self.model.pt_graph;
        let stored = if self.reverse {
            graph.back_edges_around(node)
        } else {
            graph.edges_around(node)
        };

        // later departures stay reachable through WAIT edges
        let mut earliest_entry: Option<(Millis, PtEdge)> = None;
        for edge in stored {
            if !self.is_usable(&edge, time) {
                continue;
            }
            if !self.reverse
                && self.mode != ExploreMode::WalkOnly
                && edge.edge_type() == EdgeType::EnterTimeExpandedNetwork
            {
                let wait = self.day_wrapped_wait(&edge, time);
                if earliest_entry.as_ref().is_none_or(|(best, _)| wait < *best) {
                    earliest_entry = Some((wait, edge));
                }
                continue;
            }
            out.push(GraphEdge::Transit(edge));
        }
        out.extend(earliest_entry.map(|(_, edge)| GraphEdge::Transit(edge)));

        if let Some(overlay) = self.overlay {
            let synthetic: Vec<&PtEdge> = if self.reverse {
                overlay.back_edges_around(node).collect()
            } else {
                overlay.edges_around(node).collect()
            };
            out.extend(
                synthetic
                    .into_iter()
                    .filter(|edge| self.is_usable(edge, time))
                    .cloned()
                    .map(GraphEdge::Transit),
            );
        }
    }

    fn street_edges(&self, node: NodeIndex, out: &mut Vec<GraphEdge>) {
        let direction = if self.reverse {
            Direction::Incoming
        } else {
            Direction::Outgoing
        };
        for edge in self.model.street_graph.edges_directed(node, direction) {
            let street = edge.weight();
            if !self.weighting.edge_cost(street).is_finite() {
                continue;
            }
            out.push(GraphEdge::Street(StreetHop {
                edge: edge.id(),
                from: edge.source(),
                to: edge.target(),
                distance: street.distance,
                millis: walk_millis(street.distance, self.walk_speed_kmh),
            }));
        }
    }

    fn is_usable(&self, edge: &PtEdge, time: Millis) -> bool {
        let edge_type = edge.edge_type();
        let (boundary_in, boundary_out) = if self.reverse {
            (EdgeType::ExitPt, EdgeType::EnterPt)
        } else {
            (EdgeType::EnterPt, EdgeType::ExitPt)
        };
        match self.mode {
            ExploreMode::WalkOnly if edge_type != boundary_in => return false,
            ExploreMode::PtOnly if edge_type == boundary_out => return false,
            _ => {}
        }
        if edge
            .attrs
            .route_type()
            .is_some_and(|route_type| self.is_route_type_blocked(route_type))
        {
            return false;
        }
        if self.overlay.is_some_and(|overlay| overlay.is_blocked(edge.id)) {
            return false;
        }
        let gated = if self.reverse {
            edge_type == EdgeType::Alight
        } else {
            edge_type == EdgeType::Board
        };
        if gated && !self.ignore_validity {
            return edge
                .attrs
                .validity()
                .is_some_and(|validity| validity.is_valid_on(time));
        }
        true
    }

    fn is_route_type_blocked(&self, route_type: i32) -> bool {
        u32::try_from(route_type)
            .ok()
            .and_then(|bit| self.blocked_route_types.checked_shr(bit))
            .is_some_and(|shifted| shifted & 1 == 1)
    }

    /// Node reached by traversing `edge` in search direction
    pub fn adj_node(&self, edge: &GraphEdge) -> NodeId {
        match edge {
            GraphEdge::Street(hop) => self
                .model
                .node_for_street(if self.reverse { hop.from } else { hop.to }),
            GraphEdge::Transit(edge) => self
                .model
                .node_for_pt(if self.reverse { edge.src } else { edge.dest }),
        }
    }

    /// Time needed to traverse `edge` when starting at `time`, always
    /// non-negative. Searches subtract it when running in reverse.
    pub fn travel_time(&self, edge: &GraphEdge, time: Millis) -> Millis {
        match edge {
            GraphEdge::Street(hop) => hop.millis,
            GraphEdge::Transit(edge) => match edge.edge_type() {
                EdgeType::EnterTimeExpandedNetwork if !self.reverse => {
                    self.day_wrapped_wait(edge, time)
                }
                EdgeType::LeaveTimeExpandedNetwork if self.reverse => {
                    -self.day_wrapped_wait(edge, time)
                }
                EdgeType::EnterTimeExpandedNetwork | EdgeType::LeaveTimeExpandedNetwork => 0,
                _ => Millis::from(edge.attrs.time) * 1000,
            },
        }
    }

    /// Offset from `time` to the slot of a network boundary edge in the local
    /// time of its feed: the next occurrence going forward, the previous one
    /// (as a non-positive value) going in reverse
    pub fn day_wrapped_wait(&self, edge: &PtEdge, time: Millis) -> Millis {
        let Some(feed) = edge.attrs.feed() else {
            return 0;
        };
        let mut wait = Millis::from(edge.attrs.time) * 1000 - millis_of_day(time, &feed.zone);
        if !self.reverse && wait < 0 {
            wait += MILLIS_PER_DAY;
        } else if self.reverse && wait > 0 {
            wait -= MILLIS_PER_DAY;
        }
        wait
    }

    pub fn is_blocked(&self, edge: &GraphEdge) -> bool {
        match (edge, self.overlay) {
            (GraphEdge::Transit(edge), Some(overlay)) => overlay.is_blocked(edge.id),
            _ => false,
        }
    }

    pub fn board_delay(&self, edge: &GraphEdge) -> Millis {
        match (edge, self.overlay) {
            (GraphEdge::Transit(edge), Some(overlay)) => overlay.board_delay(edge.id),
            _ => 0,
        }
    }

    pub fn alight_delay(&self, edge: &GraphEdge) -> Millis {
        match (edge, self.overlay) {
            (GraphEdge::Transit(edge), Some(overlay)) => overlay.alight_delay(edge.id),
            _ => 0,
        }
    }
}
