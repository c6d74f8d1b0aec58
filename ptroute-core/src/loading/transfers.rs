use std::collections::BTreeMap;

use hashbrown::HashMap;
use log::{debug, info};
use rayon::prelude::*;

use super::schedule::{FeedTransfer, TransferType};
use super::time_expanded::{WiredTimelines, wrapped_duration};
use crate::model::transit::{EdgePayload, EdgeSink, PtEdgeAttributes};
use crate::model::{FootWeighting, PlatformNodes, Station, StreetGraph};
use crate::routing::dijkstra;
use crate::{PtNodeId, SECONDS_PER_DAY, Time};

/// A walking connection between two stations, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WalkingTransfer {
    pub(crate) from: usize,
    pub(crate) to: usize,
    pub(crate) duration: Time,
}

/// Calculate walking transfers between stations using the street network
pub(crate) fn walking_transfers(
    street_graph: &StreetGraph,
    stations: &[Station],
    max_transfer_time: Time,
    walk_speed_kmh: f64,
) -> Vec<WalkingTransfer> {
    if max_transfer_time == 0 {
        return Vec::new();
    }
    info!(
        "Calculating walking transfers between {} stations",
        stations.len()
    );

    let by_street_node: HashMap<_, Vec<usize>> =
        stations
            .iter()
            .enumerate()
            .fold(HashMap::new(), |mut acc, (idx, station)| {
                if let Some(node) = station.street_node {
                    acc.entry(node).or_insert_with(Vec::new).push(idx);
                }
                acc
            });

    (0..stations.len())
        .into_par_iter()
        .filter_map(|from| stations[from].street_node.map(|node| (from, node)))
        .flat_map_iter(|(from, source_node)| {
            let reachable = dijkstra::walking_times(
                street_graph,
                source_node,
                &FootWeighting,
                walk_speed_kmh,
                Some(i64::from(max_transfer_time) * 1000),
            );
            reachable
                .into_iter()
                .filter_map(|(node, millis)| by_street_node.get(&node).map(|to| (to, millis)))
                .flat_map(|(targets, millis)| {
                    targets.iter().map(move |&to| WalkingTransfer {
                        from,
                        to,
                        duration: u32::try_from((millis + 999) / 1000).unwrap_or(Time::MAX),
                    })
                })
                .filter(move |transfer| transfer.to != from)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Inputs of transfer edge wiring
pub(crate) struct TransferInputs<'a> {
    pub(crate) stations: &'a [Station],
    pub(crate) station_index: &'a HashMap<(String, String), usize>,
    pub(crate) station_platforms: &'a HashMap<usize, Vec<PlatformNodes>>,
    /// Transfer rules per feed id
    pub(crate) rules: &'a HashMap<String, Vec<FeedTransfer>>,
    pub(crate) walking: &'a [WalkingTransfer],
    pub(crate) implicit_same_stop_transfers: bool,
}

/// Creates `TRANSFER` edges from arrival slots to the first reachable
/// departure slot of another platform. Returns the number of edges created.
pub(crate) fn wire_transfers<S: EdgeSink>(
    sink: &mut S,
    inputs: &TransferInputs<'_>,
    wired: &WiredTimelines,
) -> usize {
    // default minimum transfer time per station pair, from implicit and
    // walking transfers
    let mut defaults: HashMap<(usize, usize), Time> = HashMap::new();
    if inputs.implicit_same_stop_transfers {
        for &station in inputs.station_platforms.keys() {
            defaults.insert((station, station), 0);
        }
    }
    for walk in inputs.walking {
        defaults
            .entry((walk.from, walk.to))
            .and_modify(|d| *d = (*d).min(walk.duration))
            .or_insert(walk.duration);
    }

    let mut rules: HashMap<(usize, usize), Vec<&FeedTransfer>> = HashMap::new();
    for (feed_id, feed_rules) in inputs.rules {
        for rule in feed_rules {
            let from = inputs
                .station_index
                .get(&(feed_id.clone(), rule.from_stop_id.clone()));
            let to = inputs
                .station_index
                .get(&(feed_id.clone(), rule.to_stop_id.clone()));
            match (from, to) {
                (Some(&from), Some(&to)) => rules.entry((from, to)).or_default().push(rule),
                _ => log::warn!(
                    "Transfer rule {} -> {} in feed {feed_id} references an unknown stop",
                    rule.from_stop_id,
                    rule.to_stop_id
                ),
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = defaults.keys().chain(rules.keys()).copied().collect();
    pairs.sort_unstable();
    pairs.dedup();

    let no_platforms = Vec::new();
    let mut created = 0;
    for (from, to) in pairs {
        let pair_rules = rules.get(&(from, to)).map_or(&[][..], Vec::as_slice);
        let default = defaults.get(&(from, to)).copied();
        let from_platforms = inputs.station_platforms.get(&from).unwrap_or(&no_platforms);
        let to_platforms = inputs.station_platforms.get(&to).unwrap_or(&no_platforms);

        for from_platform in from_platforms {
            let Some(arrivals) = wired.arrival_slots.get(&from_platform.exit) else {
                continue;
            };
            for to_platform in to_platforms {
                let Some(departures) = wired.departure_slots.get(&to_platform.enter) else {
                    continue;
                };
                let rule = most_specific_rule(pair_rules, from_platform, to_platform);
                let min_transfer_time = match (rule, default) {
                    (Some(rule), _) if rule.transfer_type == TransferType::NotPossible => continue,
                    (Some(rule), default) => rule.min_transfer_time.or(default).unwrap_or(0),
                    (None, Some(default)) => default,
                    (None, None) => continue,
                };
                created += connect_timelines(
                    sink,
                    arrivals,
                    departures,
                    min_transfer_time,
                    to_platform,
                );
            }
        }
    }

    debug!(
        "Wired {created} transfer edges for {} stations",
        inputs.stations.len()
    );
    created
}

fn most_specific_rule<'r>(
    rules: &[&'r FeedTransfer],
    from: &PlatformNodes,
    to: &PlatformNodes,
) -> Option<&'r FeedTransfer> {
    let matches = |filter: &Option<String>, route_id: &str| {
        filter.as_deref().is_none_or(|route| route == route_id)
    };
    rules
        .iter()
        .filter(|rule| {
            matches(&rule.from_route_id, &from.descriptor.route_id)
                && matches(&rule.to_route_id, &to.descriptor.route_id)
        })
        .max_by_key(|rule| {
            usize::from(rule.from_route_id.is_some()) + usize::from(rule.to_route_id.is_some())
        })
        .copied()
}

fn connect_timelines<S: EdgeSink>(
    sink: &mut S,
    arrivals: &BTreeMap<Time, PtNodeId>,
    departures: &BTreeMap<Time, PtNodeId>,
    min_transfer_time: Time,
    to_platform: &PlatformNodes,
) -> usize {
    let Some((&first_time, &first_slot)) = departures.first_key_value() else {
        return 0;
    };
    let mut created = 0;
    for (&arrival, &arrival_slot) in arrivals {
        let earliest = (arrival + min_transfer_time) % SECONDS_PER_DAY;
        let (departure, departure_slot) = departures
            .range(earliest..)
            .next()
            .map_or((first_time, first_slot), |(&time, &slot)| (time, slot));
        sink.create_edge(
            arrival_slot,
            departure_slot,
            PtEdgeAttributes::new(
                min_transfer_time + wrapped_duration(earliest, departure),
                EdgePayload::Transfer {
                    route_type: to_platform.route_type,
                    platform: to_platform.descriptor.clone(),
                },
            ),
        );
        created += 1;
    }
    created
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::transit::{EdgeType, PlatformDescriptor, PtGraphBuilder};

    fn platform(builder: &mut PtGraphBuilder, route: &str, route_type: i32) -> PlatformNodes {
        PlatformNodes {
            enter: builder.create_node(),
            exit: builder.create_node(),
            route_type,
            descriptor: Arc::new(PlatformDescriptor {
                feed_id: "gtfs_0".into(),
                stop_id: "S2".into(),
                route_id: route.into(),
            }),
        }
    }

    #[test]
    fn transfer_targets_first_departure_after_buffer() {
        let mut builder = PtGraphBuilder::new();
        let b = platform(&mut builder, "B", 0);
        let arrival_slot = builder.create_node();
        let early = builder.create_node();
        let late = builder.create_node();

        let arrivals = BTreeMap::from([(29_400, arrival_slot)]);
        let departures = BTreeMap::from([(29_580, early), (31_500, late)]);
        assert_eq!(connect_timelines(&mut builder, &arrivals, &departures, 180, &b), 1);
        // 08:17 arrival misses the 08:13 departure
        let arrivals_late = BTreeMap::from([(29_820, arrival_slot)]);
        connect_timelines(&mut builder, &arrivals_late, &departures, 180, &b);
        let graph = builder.finish();

        let transfers: Vec<_> = graph
            .edges_around(arrival_slot)
            .filter(|e| e.edge_type() == EdgeType::Transfer)
            .map(|e| (e.dest, e.attrs.time, e.attrs.route_type()))
            .collect();
        assert!(transfers.contains(&(early, 180, Some(0))));
        assert!(transfers.contains(&(late, 1_680, Some(0))));
    }

    #[test]
    fn transfer_wraps_to_first_departure_of_next_day() {
        let mut builder = PtGraphBuilder::new();
        let b = platform(&mut builder, "B", 3);
        let arrival_slot = builder.create_node();
        let first = builder.create_node();
        let arrivals = BTreeMap::from([(86_100, arrival_slot)]);
        let departures = BTreeMap::from([(300, first), (3_600, builder.create_node())]);
        connect_timelines(&mut builder, &arrivals, &departures, 120, &b);
        let graph = builder.finish();
        let edge = graph.edges_around(arrival_slot).next().unwrap();
        assert_eq!(edge.dest, first);
        // 23:55 arrival, two minutes buffer, first departure 00:05
        assert_eq!(edge.attrs.time, 600);
    }

    #[test]
    fn route_specific_rule_wins() {
        let mut builder = PtGraphBuilder::new();
        let a = platform(&mut builder, "A", 3);
        let b = platform(&mut builder, "B", 3);
        let generic = FeedTransfer {
            from_stop_id: "S2".into(),
            to_stop_id: "S2".into(),
            from_route_id: None,
            to_route_id: None,
            transfer_type: TransferType::MinTime,
            min_transfer_time: Some(180),
        };
        let forbidden = FeedTransfer {
            from_route_id: Some("A".into()),
            to_route_id: Some("B".into()),
            transfer_type: TransferType::NotPossible,
            min_transfer_time: None,
            ..generic.clone()
        };
        let rules = [&generic, &forbidden];
        let chosen = most_specific_rule(&rules, &a, &b).unwrap();
        assert_eq!(chosen.transfer_type, TransferType::NotPossible);
        let chosen = most_specific_rule(&rules, &b, &a).unwrap();
        assert_eq!(chosen.min_transfer_time, Some(180));
    }
}
