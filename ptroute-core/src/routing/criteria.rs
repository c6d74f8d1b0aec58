//! Label weights, queue ordering and Pareto dominance

use crate::Millis;

use super::label::Label;

/// Optimization criteria of one search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criteria {
    pub reverse: bool,
    /// Keep labels with fewer transfers even when they are slower
    pub mind_transfers: bool,
    pub profile: bool,
    pub max_profile_duration: Millis,
    /// Penalty per transfer in milliseconds
    pub beta_transfers: Millis,
    /// Weight of walking time relative to riding time
    pub beta_street_time: f64,
    pub start_time: Millis,
}

/// Composite queue order: weight, transfers, walking time, departure, then
/// possible before impossible
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LabelKey {
    weight: Millis,
    transfers: u32,
    walk_time: Millis,
    /// Labels without a departure sort last
    departure: (bool, Millis),
    impossible: bool,
}

impl Criteria {
    pub fn new(start_time: Millis, reverse: bool) -> Self {
        Self {
            reverse,
            mind_transfers: true,
            profile: false,
            max_profile_duration: 0,
            beta_transfers: 0,
            beta_street_time: 1.0,
            start_time,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn weight(&self, label: &Label) -> Millis {
        let elapsed = if self.reverse {
            self.start_time - label.time
        } else {
            label.time - self.start_time
        };
        let walk_penalty = (label.walk_time as f64 * (self.beta_street_time - 1.0)).round() as Millis;
        elapsed + Millis::from(label.transfers) * self.beta_transfers + walk_penalty + label.extra_weight
    }

    pub fn key(&self, label: &Label) -> LabelKey {
        let departure = match label.departure_time {
            None => (true, 0),
            Some(departure) if self.reverse => (false, departure),
            // later departures are preferred going forward
            Some(departure) => (false, -departure),
        };
        LabelKey {
            weight: self.weight(label),
            transfers: if self.mind_transfers { label.transfers } else { 0 },
            walk_time: label.walk_time,
            departure,
            impossible: label.impossible,
        }
    }

    /// Whether `me` makes `they` redundant. Reflexive, and transitive among
    /// labels that are compared at all.
    pub fn dominates(&self, me: &Label, they: &Label) -> bool {
        let my_weight = self.weight(me);
        let their_weight = self.weight(they);
        if my_weight > their_weight {
            return false;
        }
        if self.mind_transfers && me.transfers > they.transfers {
            return false;
        }
        if me.impossible && !they.impossible {
            return false;
        }
        if self.profile {
            if let (Some(mine), Some(theirs)) = (me.departure_time, they.departure_time) {
                let worse = if self.reverse { mine > theirs } else { mine < theirs };
                if worse {
                    return false;
                }
            }
        }
        if my_weight < their_weight {
            return true;
        }
        if self.mind_transfers && me.transfers < they.transfers {
            return true;
        }
        self.key(me) <= self.key(they)
    }

    /// Profile searches only compare labels departing within one window of
    /// each other
    pub fn profile_comparable(&self, a: &Label, b: &Label) -> bool {
        if !self.profile {
            return true;
        }
        match (a.departure_time, b.departure_time) {
            (Some(a), Some(b)) => (a - b).abs() <= self.max_profile_duration,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use petgraph::graph::NodeIndex;
    use proptest::prelude::*;

    use super::*;
    use crate::model::NodeId;

    fn label(time: Millis, transfers: u32, walk: Millis, departure: Option<Millis>) -> Label {
        Label {
            transfers,
            walk_time: walk,
            departure_time: departure,
            ..Label::root(NodeId::street(NodeIndex::new(0)), time)
        }
    }

    #[test]
    fn weight_counts_transfers_and_walking() {
        let criteria = Criteria {
            beta_transfers: 60_000,
            beta_street_time: 1.5,
            ..Criteria::new(1_000, false)
        };
        let l = label(11_000, 2, 4_000, None);
        assert_eq!(criteria.weight(&l), 10_000 + 120_000 + 2_000);

        let reverse = Criteria::new(11_000, true);
        assert_eq!(reverse.weight(&label(1_000, 0, 0, None)), 10_000);
    }

    #[test]
    fn fewer_transfers_survive_slower_arrival() {
        let criteria = Criteria::new(0, false);
        let fast = label(100, 2, 0, None);
        let slow = label(200, 1, 0, None);
        assert!(!criteria.dominates(&fast, &slow));
        assert!(!criteria.dominates(&slow, &fast));

        let ignoring = Criteria {
            mind_transfers: false,
            ..criteria
        };
        assert!(ignoring.dominates(&fast, &slow));
    }

    #[test]
    fn impossible_never_dominates_possible() {
        let criteria = Criteria::new(0, false);
        let mut optimistic = label(100, 0, 0, None);
        optimistic.impossible = true;
        let realistic = label(300, 0, 0, None);
        assert!(!criteria.dominates(&optimistic, &realistic));
        // both survive: the slower one is the only one sure to work
        assert!(!criteria.dominates(&realistic, &optimistic));
    }

    #[test]
    fn profile_keeps_later_departures() {
        let criteria = Criteria {
            profile: true,
            max_profile_duration: 3_600_000,
            ..Criteria::new(0, false)
        };
        let early = label(1_000, 0, 0, Some(0));
        let late = label(2_000, 0, 0, Some(500));
        assert!(!criteria.dominates(&early, &late));
        assert!(criteria.dominates(&late, &label(2_500, 0, 0, Some(400))));

        let far = label(5_000, 0, 0, Some(7_200_000));
        assert!(!criteria.profile_comparable(&early, &far));
        assert!(criteria.profile_comparable(&early, &label(0, 0, 0, None)));
    }

    fn arb_label() -> impl Strategy<Value = Label> {
        (
            0..50i64,
            0..4u32,
            0..20i64,
            proptest::option::of(0..10i64),
            any::<bool>(),
        )
            .prop_map(|(time, transfers, walk, departure, impossible)| {
                let mut l = label(time * 1_000, transfers, walk * 1_000, departure.map(|d| d * 1_000));
                l.impossible = impossible;
                l
            })
    }

    fn arb_criteria() -> impl Strategy<Value = Criteria> {
        (any::<bool>(), any::<bool>(), 0..3i64, 1..3u32).prop_map(
            |(reverse, mind_transfers, beta_transfers, beta_street)| Criteria {
                mind_transfers,
                beta_transfers: beta_transfers * 1_000,
                beta_street_time: f64::from(beta_street),
                ..Criteria::new(if reverse { 50_000 } else { 0 }, reverse)
            },
        )
    }

    proptest! {
        #[test]
        fn dominance_is_reflexive(criteria in arb_criteria(), l in arb_label()) {
            prop_assert!(criteria.dominates(&l, &l));
        }

        #[test]
        fn dominance_is_transitive(
            criteria in arb_criteria(),
            a in arb_label(),
            b in arb_label(),
            c in arb_label(),
        ) {
            if criteria.dominates(&a, &b) && criteria.dominates(&b, &c) {
                prop_assert!(criteria.dominates(&a, &c));
            }
        }

        #[test]
        fn mutual_dominance_means_equal_keys(
            criteria in arb_criteria(),
            a in arb_label(),
            b in arb_label(),
        ) {
            if criteria.dominates(&a, &b) && criteria.dominates(&b, &a) {
                prop_assert_eq!(criteria.key(&a), criteria.key(&b));
            }
        }

        #[test]
        fn dominator_never_weighs_more(
            criteria in arb_criteria(),
            a in arb_label(),
            b in arb_label(),
        ) {
            if criteria.dominates(&a, &b) {
                prop_assert!(criteria.weight(&a) <= criteria.weight(&b));
                prop_assert!(!a.impossible || b.impossible);
            }
        }
    }
}
