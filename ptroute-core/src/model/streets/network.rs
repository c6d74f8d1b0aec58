//! Street graph with a spatial index over its nodes

use geo::{Distance, Haversine, LineString, Point};
use petgraph::{
    Direction,
    graph::{DiGraph, EdgeIndex, Edges, NodeIndex},
};
use rstar::{RTree, primitives::GeomWithData};

use super::components::{StreetEdge, StreetNode, StreetWeighting};

/// R-tree entry: node coordinate with its graph index
pub type IndexedPoint = GeomWithData<[f64; 2], NodeIndex>;

/// Directed street graph. Two-way streets are stored as two edges.
#[derive(Debug, Clone, Default)]
pub struct StreetGraph {
    pub(crate) graph: DiGraph<StreetNode, StreetEdge>,
    rtree: RTree<IndexedPoint>,
}

impl StreetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, geometry: Point<f64>) -> NodeIndex {
        let idx = self.graph.add_node(StreetNode { geometry });
        self.rtree
            .insert(GeomWithData::new([geometry.x(), geometry.y()], idx));
        idx
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: StreetEdge) -> EdgeIndex {
        self.graph.add_edge(from, to, edge)
    }

    /// Adds a straight two-way segment between two existing nodes, with
    /// haversine length.
    pub fn add_street(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        name: Option<&str>,
        foot_access: bool,
    ) -> (EdgeIndex, EdgeIndex) {
        let a = self.graph[from].geometry;
        let b = self.graph[to].geometry;
        let distance = Haversine.distance(a, b);
        let segment = |start: Point<f64>, end: Point<f64>| StreetEdge {
            distance,
            geometry: LineString::from(vec![start.0, end.0]),
            name: name.map(str::to_string),
            foot_access,
        };
        let forward = self.graph.add_edge(from, to, segment(a, b));
        let backward = self.graph.add_edge(to, from, segment(b, a));
        (forward, backward)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&StreetNode> {
        self.graph.node_weight(idx)
    }

    pub fn edge(&self, idx: EdgeIndex) -> Option<&StreetEdge> {
        self.graph.edge_weight(idx)
    }

    pub fn edge_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    /// Outgoing edges of `node`
    pub fn edges(&self, node: NodeIndex) -> Edges<'_, StreetEdge, petgraph::Directed> {
        self.graph.edges(node)
    }

    /// Outgoing or incoming edges of `node`
    pub fn edges_directed(
        &self,
        node: NodeIndex,
        direction: Direction,
    ) -> Edges<'_, StreetEdge, petgraph::Directed> {
        self.graph.edges_directed(node, direction)
    }

    /// Nearest node to `point`, with haversine distance in metres
    pub fn nearest_node(&self, point: &Point<f64>) -> Option<(NodeIndex, f64)> {
        self.rtree
            .nearest_neighbor(&[point.x(), point.y()])
            .map(|entry| (entry.data, distance_to(entry, point)))
    }

    /// Nearest node within `max_distance` metres that has at least one usable
    /// edge under `weighting`
    pub fn nearest_accessible_node(
        &self,
        point: &Point<f64>,
        max_distance: f64,
        weighting: &dyn StreetWeighting,
    ) -> Option<(NodeIndex, f64)> {
        self.rtree
            .nearest_neighbor_iter(&[point.x(), point.y()])
            .map(|entry| (entry.data, distance_to(entry, point)))
            .take_while(|&(_, distance)| distance <= max_distance)
            .find(|&(node, _)| {
                self.graph
                    .edges_directed(node, Direction::Outgoing)
                    .chain(self.graph.edges_directed(node, Direction::Incoming))
                    .any(|edge| weighting.edge_cost(edge.weight()).is_finite())
            })
    }
}

fn distance_to(entry: &IndexedPoint, point: &Point<f64>) -> f64 {
    let [x, y] = *entry.geom();
    Haversine.distance(Point::new(x, y), *point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::streets::FootWeighting;

    #[test]
    fn add_street_creates_both_directions() {
        let mut streets = StreetGraph::new();
        let a = streets.add_node(Point::new(13.40, 52.52));
        let b = streets.add_node(Point::new(13.41, 52.52));
        let (forward, backward) = streets.add_street(a, b, Some("Unter den Linden"), true);

        assert_eq!(streets.edge_endpoints(forward), Some((a, b)));
        assert_eq!(streets.edge_endpoints(backward), Some((b, a)));
        let distance = streets.edge(forward).unwrap().distance;
        assert!((distance - 677.0).abs() < 5.0, "got {distance}");
    }

    #[test]
    fn snapping_skips_nodes_without_foot_access() {
        let mut streets = StreetGraph::new();
        let motorway_a = streets.add_node(Point::new(13.4000, 52.5200));
        let motorway_b = streets.add_node(Point::new(13.4010, 52.5200));
        let path_a = streets.add_node(Point::new(13.4003, 52.5203));
        let path_b = streets.add_node(Point::new(13.4013, 52.5203));
        streets.add_street(motorway_a, motorway_b, Some("A100"), false);
        streets.add_street(path_a, path_b, None, true);

        let query = Point::new(13.4000, 52.5200);
        assert_eq!(streets.nearest_node(&query).unwrap().0, motorway_a);
        let (snapped, distance) = streets
            .nearest_accessible_node(&query, 100.0, &FootWeighting)
            .unwrap();
        assert_eq!(snapped, path_a);
        assert!(distance < 50.0);
        assert!(
            streets
                .nearest_accessible_node(&query, 10.0, &FootWeighting)
                .is_none()
        );
    }
}
