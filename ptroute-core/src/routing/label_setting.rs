//! Multi-criteria label setting over the multimodal graph
//!
//! The search is a lazy iterator: every call to `next` settles one label and
//! expands the previously returned one, so callers can stop at any point
//! without paying for work they never look at.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

use hashbrown::HashMap;
use log::{debug, trace};

use crate::Millis;
use crate::model::NodeId;
use crate::model::transit::EdgeType;

use super::criteria::{Criteria, LabelKey};
use super::explorer::{GraphEdge, GraphExplorer};
use super::label::Label;

/// Labels shared between the main search and its caller
pub type Solutions = Rc<RefCell<Vec<Rc<Label>>>>;

/// Bounds on label extension and search effort
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    pub street_time: Millis,
    pub trip_time: Millis,
    pub max_visited_nodes: usize,
    /// Extra weight of entering a vehicle per route type
    pub boarding_penalties: HashMap<i32, Millis>,
}

pub struct LabelSetting<'a> {
    explorer: GraphExplorer<'a>,
    criteria: Criteria,
    limits: &'a SearchLimits,
    solutions: Solutions,
}

impl<'a> LabelSetting<'a> {
    pub fn new(explorer: GraphExplorer<'a>, criteria: Criteria, limits: &'a SearchLimits) -> Self {
        debug_assert_eq!(explorer.is_reverse(), criteria.reverse);
        Self {
            explorer,
            criteria,
            limits,
            solutions: Solutions::default(),
        }
    }

    /// Labels that are never kept when one of `solutions` dominates them
    #[must_use]
    pub fn with_solutions(mut self, solutions: Solutions) -> Self {
        self.solutions = solutions;
        self
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn explorer(&self) -> &GraphExplorer<'a> {
        &self.explorer
    }

    /// Starts a search at `start` at time `time`
    pub fn search(&self, start: NodeId, time: Millis) -> LabelIter<'_, 'a> {
        let mut iter = LabelIter {
            setting: self,
            queue: BinaryHeap::new(),
            settled: HashMap::new(),
            pending: None,
            visited: 0,
            budget_exceeded: false,
            seq: 0,
        };
        iter.insert_if_not_dominated(Rc::new(Label::root(start, time)));
        iter
    }
}

struct QueueEntry {
    key: LabelKey,
    seq: u64,
    label: Rc<Label>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Settled labels of one running search, best first
pub struct LabelIter<'s, 'a> {
    setting: &'s LabelSetting<'a>,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    settled: HashMap<NodeId, Vec<Rc<Label>>>,
    /// Last returned label, expanded on the following call
    pending: Option<Rc<Label>>,
    visited: usize,
    budget_exceeded: bool,
    seq: u64,
}

impl LabelIter<'_, '_> {
    pub fn visited_nodes(&self) -> usize {
        self.visited
    }

    pub fn budget_exceeded(&self) -> bool {
        self.budget_exceeded
    }

    /// Current Pareto set at `node`
    pub fn labels_at(&self, node: &NodeId) -> &[Rc<Label>] {
        self.settled.get(node).map_or(&[], Vec::as_slice)
    }

    fn insert_if_not_dominated(&mut self, label: Rc<Label>) {
        let criteria = &self.setting.criteria;
        let dominated_by_solution = self.setting.solutions.borrow().iter().any(|solution| {
            criteria.profile_comparable(solution, &label) && criteria.dominates(solution, &label)
        });
        if dominated_by_solution {
            return;
        }

        let labels = self.settled.entry(label.node).or_default();
        if labels.iter().any(|other| criteria.dominates(other, &label)) {
            return;
        }
        labels.retain(|other| {
            if criteria.dominates(&label, other) {
                other.delete();
                false
            } else {
                true
            }
        });
        labels.push(Rc::clone(&label));

        self.seq += 1;
        self.queue.push(Reverse(QueueEntry {
            key: criteria.key(&label),
            seq: self.seq,
            label,
        }));
    }

    fn expand(&mut self, label: &Rc<Label>) {
        let explorer = self.setting.explorer;
        let reverse = explorer.is_reverse();
        let limits = self.setting.limits;
        let start_time = self.setting.criteria.start_time;

        for edge in explorer.explore(label) {
            let travel = explorer.travel_time(&edge, label.time);
            let mut next_time = if reverse {
                label.time - travel
            } else {
                label.time + travel
            };
            let edge_type = edge.edge_type();

            let walk_time = if matches!(
                edge_type,
                EdgeType::Highway | EdgeType::EnterPt | EdgeType::ExitPt
            ) {
                label.walk_time + travel
            } else {
                label.walk_time
            };
            if walk_time > limits.street_time {
                continue;
            }
            if (next_time - start_time).abs() > limits.trip_time {
                continue;
            }

            let boarding = match edge_type {
                EdgeType::EnterPt => !reverse,
                EdgeType::ExitPt => reverse,
                EdgeType::Transfer => true,
                _ => false,
            };
            let penalty = if boarding {
                edge.route_type()
                    .and_then(|route_type| limits.boarding_penalties.get(&route_type))
                    .copied()
                    .unwrap_or(0)
            } else {
                0
            };

            let departure_time = departure_criterion(label, edge_type, next_time, reverse);
            let (mut residual_delay, impossible) = if reverse {
                reverse_residual_delay(&explorer, label, &edge, travel)
            } else {
                forward_residual_delay(&explorer, label, &edge, travel)
            };

            let node = explorer.adj_node(&edge);
            let transfers = label.transfers + edge.transfers();
            let extra_weight = label.extra_weight + penalty;

            if !reverse && edge_type == EdgeType::LeaveTimeExpandedNetwork && residual_delay > 0 {
                // valid only if the delay does not materialize
                let scheduled = Label {
                    node,
                    time: next_time,
                    edge: Some(edge.clone()),
                    transfers,
                    departure_time,
                    walk_time,
                    extra_weight,
                    residual_delay,
                    impossible: true,
                    parent: Some(Rc::clone(label)),
                    deleted: Default::default(),
                };
                self.insert_if_not_dominated(Rc::new(scheduled));
                next_time += residual_delay;
                residual_delay = 0;
            }

            let next = Label {
                node,
                time: next_time,
                edge: Some(edge),
                transfers,
                departure_time,
                walk_time,
                extra_weight,
                residual_delay,
                impossible,
                parent: Some(Rc::clone(label)),
                deleted: Default::default(),
            };
            self.insert_if_not_dominated(Rc::new(next));
        }
    }
}

/// Departure from the origin, fixed at the first slot entered before any
/// vehicle is boarded
fn departure_criterion(
    label: &Label,
    edge_type: EdgeType,
    next_time: Millis,
    reverse: bool,
) -> Option<Millis> {
    if label.transfers > 0 {
        return label.departure_time;
    }
    let fixes_departure = if reverse {
        matches!(
            edge_type,
            EdgeType::LeaveTimeExpandedNetwork | EdgeType::WaitArrival | EdgeType::Overnight
        )
    } else {
        matches!(
            edge_type,
            EdgeType::EnterTimeExpandedNetwork | EdgeType::Wait | EdgeType::Overnight
        )
    };
    if !fixes_departure {
        return label.departure_time;
    }
    Some(if reverse {
        next_time + label.walk_time
    } else {
        next_time - label.walk_time
    })
}

/// Residual delay and feasibility going forward: alighting adds the known
/// arrival delay, waiting absorbs it, boarding with delay left over is only
/// possible if the delay does not happen
fn forward_residual_delay(
    explorer: &GraphExplorer<'_>,
    label: &Label,
    edge: &GraphEdge,
    travel: Millis,
) -> (Millis, bool) {
    let edge_type = edge.edge_type();
    let residual = match edge_type {
        EdgeType::Wait | EdgeType::WaitArrival | EdgeType::Transfer | EdgeType::Overnight => {
            (label.residual_delay - travel).max(0)
        }
        EdgeType::Alight => label.residual_delay + explorer.alight_delay(edge),
        EdgeType::Board => -explorer.board_delay(edge),
        _ => label.residual_delay,
    };
    let impossible = label.impossible
        || explorer.is_blocked(edge)
        || (edge_type == EdgeType::Board && label.residual_delay > 0);
    (residual, impossible)
}

/// Going backwards the residual is the slack before the latest arrival; an
/// arrival delay larger than the slack makes the connection impossible
fn reverse_residual_delay(
    explorer: &GraphExplorer<'_>,
    label: &Label,
    edge: &GraphEdge,
    travel: Millis,
) -> (Millis, bool) {
    let edge_type = edge.edge_type();
    let alight_delay = if edge_type == EdgeType::Alight {
        explorer.alight_delay(edge)
    } else {
        0
    };
    let residual = match edge_type {
        EdgeType::LeaveTimeExpandedNetwork | EdgeType::WaitArrival | EdgeType::Transfer => {
            label.residual_delay + travel
        }
        EdgeType::Alight => label.residual_delay - alight_delay,
        EdgeType::Board => 0,
        _ => label.residual_delay,
    };
    let impossible = label.impossible
        || explorer.is_blocked(edge)
        || (edge_type == EdgeType::Alight && label.residual_delay < alight_delay);
    (residual, impossible)
}

impl Iterator for LabelIter<'_, '_> {
    type Item = Rc<Label>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(label) = self.pending.take() {
            self.expand(&label);
        }
        loop {
            let Reverse(entry) = self.queue.peek()?;
            if entry.label.is_deleted() {
                self.queue.pop();
                continue;
            }
            // only a live label left in the queue means the budget cut the search short
            if self.visited >= self.setting.limits.max_visited_nodes {
                if !self.budget_exceeded {
                    debug!("Label setting stopped after visiting {} nodes", self.visited);
                }
                self.budget_exceeded = true;
                return None;
            }
            let Reverse(entry) = self.queue.pop()?;
            self.visited += 1;
            trace!(
                "Settled label at {:?}, time {}, transfers {}",
                entry.label.node, entry.label.time, entry.label.transfers
            );
            self.pending = Some(Rc::clone(&entry.label));
            return Some(entry.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::Point;

    use super::*;
    use crate::model::{StreetGraph, TransitModel};
    use crate::routing::explorer::ExploreMode;

    /// Three nodes on a line, 100 m apart
    fn triangle() -> (TransitModel, [petgraph::graph::NodeIndex; 3]) {
        let mut streets = StreetGraph::new();
        let a = streets.add_node(Point::new(13.0, 52.0));
        let b = streets.add_node(Point::new(13.001_46, 52.0));
        let c = streets.add_node(Point::new(13.002_92, 52.0));
        streets.add_street(a, b, Some("Hauptstraße"), true);
        streets.add_street(b, c, Some("Hauptstraße"), true);
        (TransitModel::streets_only(streets), [a, b, c])
    }

    fn limits() -> SearchLimits {
        SearchLimits {
            street_time: Millis::MAX / 4,
            trip_time: Millis::MAX / 4,
            max_visited_nodes: 1_000,
            boarding_penalties: HashMap::new(),
        }
    }

    #[test]
    fn labels_come_out_in_weight_order() {
        let (model, [a, _, c]) = triangle();
        let limits = limits();
        let explorer = GraphExplorer::new(&model, false, ExploreMode::Mixed);
        let setting = LabelSetting::new(explorer, Criteria::new(0, false), &limits);

        let times: Vec<_> = setting
            .search(model.node_for_street(a), 0)
            .map(|label| label.time)
            .collect();
        assert_eq!(times.len(), 3);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        let reached_c = setting
            .search(model.node_for_street(a), 0)
            .find(|label| label.node.street == Some(c))
            .unwrap();
        // 200 m at 5 km/h
        assert!((reached_c.time - 144_000).abs() < 1_000);
        assert_eq!(reached_c.walk_time, reached_c.time);
        assert_eq!(reached_c.depth(), 3);
    }

    #[test]
    fn reverse_search_counts_backwards() {
        let (model, [a, _, c]) = triangle();
        let limits = limits();
        let explorer = GraphExplorer::new(&model, true, ExploreMode::Mixed);
        let setting = LabelSetting::new(explorer, Criteria::new(1_000_000, true), &limits);
        let reached_a = setting
            .search(model.node_for_street(c), 1_000_000)
            .find(|label| label.node.street == Some(a))
            .unwrap();
        assert!(reached_a.time < 1_000_000 - 140_000);
        let path = Label::transitions(&reached_a, true);
        assert_eq!(path.first().unwrap().label.node.street, Some(a));
        assert_eq!(path.last().unwrap().label.node.street, Some(c));
    }

    #[test]
    fn street_time_limit_stops_expansion() {
        let (model, [a, b, c]) = triangle();
        let limits = SearchLimits {
            street_time: 100_000,
            ..limits()
        };
        let explorer = GraphExplorer::new(&model, false, ExploreMode::Mixed);
        let setting = LabelSetting::new(explorer, Criteria::new(0, false), &limits);
        let nodes: Vec<_> = setting
            .search(model.node_for_street(a), 0)
            .filter_map(|label| label.node.street)
            .collect();
        assert!(nodes.contains(&b));
        assert!(!nodes.contains(&c));
    }

    #[test]
    fn visited_budget_is_reported() {
        let (model, [a, _, _]) = triangle();
        let limits = SearchLimits {
            max_visited_nodes: 2,
            ..limits()
        };
        let explorer = GraphExplorer::new(&model, false, ExploreMode::Mixed);
        let setting = LabelSetting::new(explorer, Criteria::new(0, false), &limits);
        let mut iter = setting.search(model.node_for_street(a), 0);
        let mut settled = 0;
        while iter.next().is_some() {
            settled += 1;
        }
        assert_eq!(settled, 2);
        assert_eq!(iter.visited_nodes(), 2);
        assert!(iter.budget_exceeded());
    }

    #[test]
    fn exhausted_search_within_budget_is_not_exceeded() {
        let (model, [a, _, _]) = triangle();
        let explorer = GraphExplorer::new(&model, false, ExploreMode::Mixed);
        let unlimited = limits();
        let settled = LabelSetting::new(explorer, Criteria::new(0, false), &unlimited)
            .search(model.node_for_street(a), 0)
            .count();

        let limits = SearchLimits {
            max_visited_nodes: settled,
            ..limits()
        };
        let setting = LabelSetting::new(explorer, Criteria::new(0, false), &limits);
        let mut iter = setting.search(model.node_for_street(a), 0);
        let mut seen = 0;
        while iter.next().is_some() {
            seen += 1;
        }
        assert_eq!(seen, settled);
        assert!(!iter.budget_exceeded());
    }

    #[test]
    fn solutions_prune_worse_labels() {
        let (model, [a, b, _]) = triangle();
        let limits = limits();
        let explorer = GraphExplorer::new(&model, false, ExploreMode::Mixed);
        let solution = Rc::new(Label::root(model.node_for_street(b), 10_000));
        let solutions = Solutions::new(RefCell::new(vec![solution]));
        let setting =
            LabelSetting::new(explorer, Criteria::new(0, false), &limits).with_solutions(solutions);
        let settled: Vec<_> = setting.search(model.node_for_street(a), 0).collect();
        // only the root is cheaper than the known solution
        assert_eq!(settled.len(), 1);
    }
}
