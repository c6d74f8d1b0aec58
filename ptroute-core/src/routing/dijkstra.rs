use std::{cmp::Ordering, collections::BinaryHeap};

use hashbrown::HashMap;
use petgraph::{graph::NodeIndex, visit::EdgeRef};

use crate::Millis;
use crate::model::{StreetGraph, StreetWeighting, streets::walk_millis};

#[derive(Copy, Clone, Eq, PartialEq)]
struct State {
    cost: Millis,
    node: NodeIndex,
}

// Implement Ord for State to use in BinaryHeap
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by cost (reversed from standard Rust BinaryHeap)
        other.cost.cmp(&self.cost)
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra's algorithm over the walkable part of the street network.
/// Returns a map of node indices to walking times in milliseconds
pub(crate) fn walking_times(
    graph: &StreetGraph,
    start: NodeIndex,
    weighting: &dyn StreetWeighting,
    walk_speed_kmh: f64,
    max_cost: Option<Millis>,
) -> HashMap<NodeIndex, Millis> {
    let mut distances: HashMap<NodeIndex, Millis> = HashMap::new();
    let mut heap = BinaryHeap::new();

    // Start node has distance 0
    heap.push(State {
        cost: 0,
        node: start,
    });
    distances.insert(start, 0);

    while let Some(State { cost, node }) = heap.pop() {
        // Skip if we've found a better path
        if distances.get(&node).is_some_and(|&best| cost > best) {
            continue;
        }

        for edge in graph.edges(node) {
            if !weighting.edge_cost(edge.weight()).is_finite() {
                continue;
            }
            let next = edge.target();
            let next_cost = cost + walk_millis(edge.weight().distance, walk_speed_kmh);
            if max_cost.is_some_and(|max| next_cost > max) {
                continue;
            }

            // Add or update distance if better using Entry API
            match distances.entry(next) {
                hashbrown::hash_map::Entry::Vacant(entry) => {
                    entry.insert(next_cost);
                    heap.push(State {
                        cost: next_cost,
                        node: next,
                    });
                }
                hashbrown::hash_map::Entry::Occupied(mut entry) => {
                    if next_cost < *entry.get() {
                        *entry.get_mut() = next_cost;
                        heap.push(State {
                            cost: next_cost,
                            node: next,
                        });
                    }
                }
            }
        }
    }

    distances
}

#[cfg(test)]
mod tests {
    use geo::Point;

    use super::*;
    use crate::model::FootWeighting;

    #[test]
    fn respects_access_and_budget() {
        let mut streets = StreetGraph::new();
        let a = streets.add_node(Point::new(13.400, 52.52));
        let b = streets.add_node(Point::new(13.401, 52.52));
        let c = streets.add_node(Point::new(13.402, 52.52));
        let d = streets.add_node(Point::new(13.403, 52.52));
        streets.add_street(a, b, None, true);
        streets.add_street(b, c, None, true);
        streets.add_street(c, d, None, false);

        let all = walking_times(&streets, a, &FootWeighting, 3.6, None);
        assert_eq!(all.len(), 3);
        assert!(!all.contains_key(&d));
        // about 68 m per segment at 1 m/s
        assert!((all[&c] - 135_500).abs() < 1_000, "got {}", all[&c]);

        let near = walking_times(&streets, a, &FootWeighting, 3.6, Some(100_000));
        assert!(near.contains_key(&b));
        assert!(!near.contains_key(&c));
    }
}
