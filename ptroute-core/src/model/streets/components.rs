//! Street network components - nodes, edges and the edge weighting seam

use geo::{LineString, Point};

use crate::Millis;

/// Street graph node
#[derive(Debug, Clone)]
pub struct StreetNode {
    /// Node coordinates
    pub geometry: Point<f64>,
}

/// Street graph edge (street segment), stored once per travel direction
#[derive(Debug, Clone)]
pub struct StreetEdge {
    /// Length in metres
    pub distance: f64,
    /// Geometry in travel direction
    pub geometry: LineString<f64>,
    /// Street name, used for turn instructions
    pub name: Option<String>,
    /// Whether pedestrians may use the segment in this direction
    pub foot_access: bool,
}

/// Access cost of street edges. Street edge weighting profiles are external
/// collaborators, the router only needs to know whether a segment is usable.
pub trait StreetWeighting: Send + Sync {
    /// Traversal cost of `edge` in its stored direction, infinite if the
    /// edge cannot be used
    fn edge_cost(&self, edge: &StreetEdge) -> f64;
}

/// Pedestrian weighting: cost equals distance where foot access is allowed
#[derive(Debug, Clone, Copy, Default)]
pub struct FootWeighting;

impl StreetWeighting for FootWeighting {
    fn edge_cost(&self, edge: &StreetEdge) -> f64 {
        if edge.foot_access {
            edge.distance
        } else {
            f64::INFINITY
        }
    }
}

/// Walking time in milliseconds for `distance` metres at `walk_speed_kmh`
#[allow(clippy::cast_possible_truncation)]
pub fn walk_millis(distance: f64, walk_speed_kmh: f64) -> Millis {
    (distance / (walk_speed_kmh / 3.6) * 1000.0).round() as Millis
}
