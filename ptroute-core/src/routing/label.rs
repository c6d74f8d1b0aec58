//! Parent-linked search labels

use std::cell::Cell;
use std::rc::Rc;

use crate::Millis;
use crate::model::NodeId;

use super::explorer::GraphEdge;

/// A partial journey ending at `node`. Labels own their parent, so a path is
/// only materialized when [`Label::transitions`] walks the chain.
#[derive(Debug)]
pub struct Label {
    pub node: NodeId,
    /// Absolute time at `node`
    pub time: Millis,
    /// Edge traversed to reach this label, `None` at the root
    pub edge: Option<GraphEdge>,
    pub transfers: u32,
    /// Departure from the origin (forward) or arrival at the destination
    /// (reverse), fixed once the first vehicle is boarded
    pub departure_time: Option<Millis>,
    pub walk_time: Millis,
    /// Boarding and transfer penalties
    pub extra_weight: Millis,
    /// Delay that has not been absorbed by waiting yet
    pub residual_delay: Millis,
    /// Only reachable if known delays do not materialize
    pub impossible: bool,
    pub parent: Option<Rc<Label>>,
    pub(crate) deleted: Cell<bool>,
}

impl Label {
    pub fn root(node: NodeId, time: Millis) -> Self {
        Self {
            node,
            time,
            edge: None,
            transfers: 0,
            departure_time: None,
            walk_time: 0,
            extra_weight: 0,
            residual_delay: 0,
            impossible: false,
            parent: None,
            deleted: Cell::new(false),
        }
    }

    /// Removed from its node's Pareto set after being enqueued
    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }

    pub(crate) fn delete(&self) {
        self.deleted.set(true);
    }

    /// Number of labels on the chain up to the root, inclusive
    pub fn depth(&self) -> usize {
        std::iter::successors(Some(self), |label| label.parent.as_deref()).count()
    }

    /// Path ending in `leaf` in temporal order.
    ///
    /// A forward search grows from the origin, so the chain is reversed. A
    /// reverse search grows from the destination and its leaf is the earliest
    /// point of the journey: every transition then carries the edge its child
    /// traversed.
    pub fn transitions(leaf: &Rc<Label>, reverse: bool) -> Vec<Transition> {
        let chain: Vec<Rc<Label>> =
            std::iter::successors(Some(Rc::clone(leaf)), |label| label.parent.clone()).collect();
        if reverse {
            let mut transitions = Vec::with_capacity(chain.len());
            transitions.push(Transition {
                label: Rc::clone(&chain[0]),
                edge: None,
            });
            for pair in chain.windows(2) {
                transitions.push(Transition {
                    label: Rc::clone(&pair[1]),
                    edge: pair[0].edge.clone(),
                });
            }
            transitions
        } else {
            chain
                .into_iter()
                .rev()
                .map(|label| Transition {
                    edge: label.edge.clone(),
                    label,
                })
                .collect()
        }
    }
}

/// A label together with the edge that led to it in temporal order
#[derive(Debug, Clone)]
pub struct Transition {
    pub label: Rc<Label>,
    pub edge: Option<GraphEdge>,
}

#[cfg(test)]
mod tests {
    use petgraph::graph::{EdgeIndex, NodeIndex};

    use super::*;
    use crate::routing::explorer::StreetHop;

    fn hop(from: u32, to: u32) -> GraphEdge {
        GraphEdge::Street(StreetHop {
            edge: EdgeIndex::new(from as usize),
            from: NodeIndex::new(from as usize),
            to: NodeIndex::new(to as usize),
            distance: 10.0,
            millis: 1_000,
        })
    }

    fn extend(parent: &Rc<Label>, edge: GraphEdge, node: u32, time: Millis) -> Rc<Label> {
        Rc::new(Label {
            node: NodeId::street(NodeIndex::new(node as usize)),
            time,
            edge: Some(edge),
            parent: Some(Rc::clone(parent)),
            ..Label::root(parent.node, time)
        })
    }

    #[test]
    fn forward_transitions_start_at_root() {
        let root = Rc::new(Label::root(NodeId::street(NodeIndex::new(0)), 0));
        let a = extend(&root, hop(0, 1), 1, 1_000);
        let b = extend(&a, hop(1, 2), 2, 2_000);

        let path = Label::transitions(&b, false);
        assert_eq!(path.len(), 3);
        assert!(path[0].edge.is_none());
        assert_eq!(path[0].label.time, 0);
        assert_eq!(path[2].label.time, 2_000);
        assert_eq!(path[2].edge, Some(hop(1, 2)));
        assert_eq!(b.depth(), 3);
    }

    #[test]
    fn reverse_transitions_follow_parents() {
        // reverse search from node 2 at t=2000 back to node 0 at t=0
        let root = Rc::new(Label::root(NodeId::street(NodeIndex::new(2)), 2_000));
        let a = extend(&root, hop(1, 2), 1, 1_000);
        let b = extend(&a, hop(0, 1), 0, 0);

        let path = Label::transitions(&b, true);
        let times: Vec<_> = path.iter().map(|t| t.label.time).collect();
        assert_eq!(times, vec![0, 1_000, 2_000]);
        assert!(path[0].edge.is_none());
        assert_eq!(path[1].edge, Some(hop(0, 1)));
        assert_eq!(path[2].edge, Some(hop(1, 2)));
    }
}
