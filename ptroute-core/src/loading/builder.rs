use std::sync::Arc;

use geo::{ConvexHull, Intersects, MultiPoint, Point};
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use log::{info, warn};

use super::config::TransitModelConfig;
use super::schedule::{Feed, FeedStopTime, calendar::service_validities};
use super::time_expanded::{InsertedTrip, TripInserter, TripSpec, TripStopSpec, WiredTimelines};
use super::transfers::{TransferInputs, walking_transfers, wire_transfers};
use crate::model::transit::{
    EdgePayload, EdgeSink, FeedIdWithTimezone, PlatformDescriptor, PtEdgeAttributes,
    PtGraphBuilder, TripDescriptor,
};
use crate::model::{
    FeedInfo, FootWeighting, PlannedStop, PlatformNodes, Station, StreetGraph, TransitModel,
    TransitModelMeta, TripInfo,
};
use crate::{Error, PtNodeId};

/// Creates a multimodal model from a street graph and already-parsed
/// schedule feeds
///
/// # Errors
///
/// Returns an error if the configuration or a feed is unusable as a whole.
/// Inconsistent single entities are logged and skipped.
pub fn create_transit_model(
    mut street_graph: StreetGraph,
    feeds: &[Feed],
    config: &TransitModelConfig,
) -> Result<TransitModel, Error> {
    validate_config(config)?;
    validate_feeds(feeds)?;

    let mut builder = PtGraphBuilder::new();
    let mut state = BuildState::default();

    for feed in feeds {
        info!(
            "Processing feed {} with {} trips",
            feed.feed_id,
            feed.trips.len()
        );
        insert_feed(&mut builder, &mut state, feed);
    }

    connect_stations(&mut street_graph, &mut state, config);
    validate_graph_transit_overlap(&street_graph, &state.stations);

    let walking = walking_transfers(
        &street_graph,
        &state.stations,
        config.max_transfer_walk_time,
        config.walk_speed_kmh,
    );
    let rules: HashMap<String, Vec<_>> = feeds
        .iter()
        .map(|feed| (feed.feed_id.clone(), feed.transfers.clone()))
        .collect();
    let transfer_edges = wire_transfers(
        &mut builder,
        &TransferInputs {
            stations: &state.stations,
            station_index: &state.station_index,
            station_platforms: &state.station_platforms,
            rules: &rules,
            walking: &walking,
            implicit_same_stop_transfers: config.implicit_same_stop_transfers,
        },
        &state.wired,
    );
    info!(
        "Calculated {} walking transfers and {transfer_edges} transfer edges",
        walking.len()
    );

    let pt_graph = builder.finish();
    info!(
        "Transit model created successfully: {} transit nodes, {} transit edges, {} trips",
        pt_graph.node_count(),
        pt_graph.edge_count(),
        state.trips.len()
    );

    Ok(TransitModel {
        street_graph,
        pt_graph,
        stations: state.stations,
        station_index: state.station_index,
        platforms: state.platforms,
        route_types: state.route_types,
        pt_to_street: state.pt_to_street,
        street_to_pt: state.street_to_pt,
        trips: state.trips,
        feeds: state.feeds,
        meta: TransitModelMeta {
            max_transfer_walk_time: config.max_transfer_walk_time,
            walk_speed_kmh: config.walk_speed_kmh,
        },
    })
}

#[derive(Default)]
struct BuildState {
    stations: Vec<Station>,
    station_index: HashMap<(String, String), usize>,
    station_platforms: HashMap<usize, Vec<PlatformNodes>>,
    platforms: HashMap<PlatformDescriptor, PlatformNodes>,
    route_types: HashMap<(String, String), i32>,
    pt_to_street: HashMap<PtNodeId, petgraph::graph::NodeIndex>,
    street_to_pt: HashMap<petgraph::graph::NodeIndex, PtNodeId>,
    trips: HashMap<(String, String), TripInfo>,
    feeds: HashMap<String, FeedInfo>,
    wired: WiredTimelines,
}

fn insert_feed(builder: &mut PtGraphBuilder, state: &mut BuildState, feed: &Feed) {
    let feed_tz = Arc::new(FeedIdWithTimezone {
        feed_id: feed.feed_id.clone(),
        zone: feed.timezone,
    });
    state.feeds.insert(
        feed.feed_id.clone(),
        FeedInfo {
            feed: Arc::clone(&feed_tz),
            start_date: feed.start_date,
            end_date: feed.end_date,
        },
    );

    for stop in &feed.stops {
        let key = (feed.feed_id.clone(), stop.stop_id.clone());
        if state.station_index.contains_key(&key) {
            warn!("Duplicate stop {} in feed {}", stop.stop_id, feed.feed_id);
            continue;
        }
        let pt_node = builder.create_node();
        state.station_index.insert(key, state.stations.len());
        state.stations.push(Station {
            feed_id: feed.feed_id.clone(),
            stop_id: stop.stop_id.clone(),
            name: stop.stop_name.clone(),
            geometry: Point::new(stop.stop_lon, stop.stop_lat),
            pt_node,
            street_node: None,
        });
    }

    for route in &feed.routes {
        state.route_types.insert(
            (feed.feed_id.clone(), route.route_id.clone()),
            route.route_type,
        );
    }

    let validities = service_validities(feed);
    let mut trip_stop_times: HashMap<&str, Vec<&FeedStopTime>> = HashMap::new();
    for stop_time in &feed.stop_times {
        trip_stop_times
            .entry(stop_time.trip_id.as_str())
            .or_default()
            .push(stop_time);
    }

    // platforms first, so trip specs can borrow them
    let mut accepted = Vec::new();
    for trip in &feed.trips {
        let Some(&route_type) = state
            .route_types
            .get(&(feed.feed_id.clone(), trip.route_id.clone()))
        else {
            warn!("Trip {} references unknown route {}", trip.trip_id, trip.route_id);
            continue;
        };
        let Some(validity) = validities.get(&trip.service_id) else {
            warn!("Trip {} references unknown service {}", trip.trip_id, trip.service_id);
            continue;
        };
        let mut stop_times = trip_stop_times
            .remove(trip.trip_id.as_str())
            .unwrap_or_default();
        stop_times.sort_by_key(|st| st.stop_sequence);
        stop_times.retain(|st| {
            let known = state
                .station_index
                .contains_key(&(feed.feed_id.clone(), st.stop_id.clone()));
            if !known {
                warn!(
                    "Stop time of trip {} references unknown stop {}",
                    trip.trip_id, st.stop_id
                );
            }
            known
        });
        if stop_times.len() < 2 {
            warn!("Trip {} has fewer than two usable stop times", trip.trip_id);
            continue;
        }
        if stop_times
            .iter()
            .tuple_windows()
            .any(|(a, b)| b.arrival_time < a.departure_time || a.departure_time < a.arrival_time)
        {
            warn!("Trip {} has stop times running backwards", trip.trip_id);
            continue;
        }
        for st in &stop_times {
            ensure_platform(builder, state, feed, &st.stop_id, &trip.route_id, route_type);
        }
        accepted.push((trip, route_type, Arc::clone(validity), stop_times));
    }

    let mut inserter = TripInserter::new(builder);
    let mut inserted_trips: Vec<(Arc<TripDescriptor>, InsertedTrip)> = Vec::new();
    for (trip, route_type, validity, stop_times) in &accepted {
        let descriptor = Arc::new(TripDescriptor {
            feed_id: feed.feed_id.clone(),
            trip_id: trip.trip_id.clone(),
            route_id: trip.route_id.clone(),
        });
        let stops = stop_times
            .iter()
            .map(|st| TripStopSpec {
                platform: &state.platforms[&PlatformDescriptor {
                    feed_id: feed.feed_id.clone(),
                    stop_id: st.stop_id.clone(),
                    route_id: trip.route_id.clone(),
                }],
                stop_sequence: st.stop_sequence,
                arrival: st.arrival_time,
                departure: st.departure_time,
            })
            .collect();
        let spec = TripSpec {
            descriptor: Arc::clone(&descriptor),
            validity: Arc::clone(validity),
            stops,
        };
        let inserted = inserter.insert(&feed_tz, &spec);
        inserted_trips.push((Arc::clone(&descriptor), inserted));
        state.trips.insert(
            (feed.feed_id.clone(), trip.trip_id.clone()),
            TripInfo {
                descriptor,
                route_type: *route_type,
                stops: stop_times
                    .iter()
                    .map(|st| PlannedStop {
                        stop_id: st.stop_id.clone(),
                        stop_sequence: st.stop_sequence,
                        arrival: st.arrival_time,
                        departure: st.departure_time,
                    })
                    .collect(),
                first_board_edge: 0,
            },
        );
    }

    let block_transfers = insert_block_transfers(
        inserter.sink(),
        feed,
        &state.trips,
        &inserted_trips,
        &validities,
    );

    let wired = inserter.wire_timelines(true);
    for (descriptor, &board) in &wired.first_boards {
        if let Some(info) = state
            .trips
            .get_mut(&(descriptor.feed_id.clone(), descriptor.trip_id.clone()))
        {
            info.first_board_edge = board;
        }
    }
    state.wired.merge(wired);
    info!(
        "Inserted {} trips of feed {} with {block_transfers} block transfers",
        inserted_trips.len(),
        feed.feed_id
    );
}

fn ensure_platform(
    builder: &mut PtGraphBuilder,
    state: &mut BuildState,
    feed: &Feed,
    stop_id: &str,
    route_id: &str,
    route_type: i32,
) {
    let descriptor = PlatformDescriptor {
        feed_id: feed.feed_id.clone(),
        stop_id: stop_id.to_string(),
        route_id: route_id.to_string(),
    };
    if state.platforms.contains_key(&descriptor) {
        return;
    }
    let station_idx = state.station_index[&(feed.feed_id.clone(), stop_id.to_string())];
    let station = state.stations[station_idx].pt_node;
    let descriptor = Arc::new(descriptor);
    let platform = PlatformNodes {
        enter: builder.create_node(),
        exit: builder.create_node(),
        route_type,
        descriptor: Arc::clone(&descriptor),
    };
    builder.create_edge(
        station,
        platform.enter,
        PtEdgeAttributes::new(
            0,
            EdgePayload::EnterPt {
                route_type,
                platform: Arc::clone(&descriptor),
            },
        ),
    );
    builder.create_edge(
        platform.exit,
        station,
        PtEdgeAttributes::new(
            0,
            EdgePayload::ExitPt {
                route_type,
                platform: Arc::clone(&descriptor),
            },
        ),
    );
    state
        .station_platforms
        .entry(station_idx)
        .or_default()
        .push(platform.clone());
    state.platforms.insert((*descriptor).clone(), platform);
}

/// Links consecutive trips of one vehicle block whose last and first stops
/// coincide, so passengers can stay seated
fn insert_block_transfers<S: EdgeSink>(
    sink: &mut S,
    feed: &Feed,
    trips: &HashMap<(String, String), TripInfo>,
    inserted: &[(Arc<TripDescriptor>, InsertedTrip)],
    validities: &HashMap<String, Arc<crate::model::Validity>>,
) -> usize {
    let nodes: HashMap<&str, &InsertedTrip> = inserted
        .iter()
        .map(|(descriptor, trip)| (descriptor.trip_id.as_str(), trip))
        .collect();
    let blocks = feed
        .trips
        .iter()
        .filter(|trip| nodes.contains_key(trip.trip_id.as_str()))
        .filter_map(|trip| trip.block_id.as_deref().map(|block| (block, trip)))
        .into_group_map();

    let mut created = 0;
    for (_, block_trips) in blocks.into_iter().sorted_unstable_by_key(|(block, _)| *block) {
        let ordered = block_trips
            .into_iter()
            .filter_map(|trip| {
                trips
                    .get(&(feed.feed_id.clone(), trip.trip_id.clone()))
                    .map(|info| (trip, info))
            })
            .sorted_by_key(|(_, info)| info.stops[0].departure)
            .collect_vec();

        for ((prev, prev_info), (next, next_info)) in ordered.iter().tuple_windows() {
            let (Some(last), Some(first)) = (prev_info.stops.last(), next_info.stops.first())
            else {
                continue;
            };
            if last.stop_id != first.stop_id || first.departure < last.arrival {
                continue;
            }
            let from = nodes[prev.trip_id.as_str()].arrival_nodes.last().copied().flatten();
            let to = nodes[next.trip_id.as_str()].departure_nodes[0];
            let (Some(from), Some(to), Some(validity)) =
                (from, to, validities.get(&next.service_id))
            else {
                continue;
            };
            sink.create_edge(
                from,
                to,
                PtEdgeAttributes::new(
                    first.departure - last.arrival,
                    EdgePayload::Board {
                        stop_sequence: first.stop_sequence,
                        trip: Arc::clone(&next_info.descriptor),
                        validity: Arc::clone(validity),
                        transfers: 0,
                    },
                ),
            );
            created += 1;
        }
    }
    created
}

/// Joins every station to the street network with a connector node at the
/// stop coordinate
fn connect_stations(
    street_graph: &mut StreetGraph,
    state: &mut BuildState,
    config: &TransitModelConfig,
) {
    let mut unconnected = 0;
    for station in &mut state.stations {
        let Some((nearest, _)) = street_graph.nearest_accessible_node(
            &station.geometry,
            config.max_snap_distance,
            &FootWeighting,
        ) else {
            log::trace!(
                "Stop {} at {:?} has no walkable street within {} m",
                station.stop_id,
                station.geometry,
                config.max_snap_distance
            );
            unconnected += 1;
            continue;
        };
        let connector = street_graph.add_node(station.geometry);
        street_graph.add_street(connector, nearest, None, true);
        station.street_node = Some(connector);
        state.pt_to_street.insert(station.pt_node, connector);
        state.street_to_pt.insert(connector, station.pt_node);
    }

    if unconnected > 0 {
        #[allow(clippy::cast_precision_loss)]
        let percentage = unconnected as f64 / state.stations.len() as f64 * 100.0;
        warn!(
            "{unconnected} of {} stations ({percentage:.1}%) could not be connected to the \
            street network. They are reachable only through transfers.",
            state.stations.len()
        );
    }
}

fn validate_config(config: &TransitModelConfig) -> Result<(), Error> {
    if !(config.walk_speed_kmh > 0.0 && config.walk_speed_kmh.is_finite()) {
        return Err(Error::InvalidData(format!(
            "walk speed must be positive, got {}",
            config.walk_speed_kmh
        )));
    }
    if config.max_snap_distance.is_nan() || config.max_snap_distance < 0.0 {
        return Err(Error::InvalidData(format!(
            "max snap distance must not be negative, got {}",
            config.max_snap_distance
        )));
    }
    Ok(())
}

fn validate_feeds(feeds: &[Feed]) -> Result<(), Error> {
    if feeds.is_empty() {
        return Err(Error::InvalidData(
            "No schedule feeds provided".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for feed in feeds {
        if !seen.insert(feed.feed_id.as_str()) {
            return Err(Error::InvalidData(format!(
                "Duplicate feed id {}",
                feed.feed_id
            )));
        }
        if feed.end_date < feed.start_date {
            return Err(Error::InvalidData(format!(
                "Feed {} ends before it starts",
                feed.feed_id
            )));
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn validate_graph_transit_overlap(streets: &StreetGraph, stations: &[Station]) {
    if streets.node_count() == 0 || stations.is_empty() {
        return;
    }
    let graph_nodes: MultiPoint = streets
        .graph
        .node_weights()
        .map(|node| node.geometry)
        .collect();
    let graph_hull = graph_nodes.convex_hull();

    let stops_outside_hull = stations
        .iter()
        .filter(|station| !station.geometry.intersects(&graph_hull))
        .count();

    let total_stops = stations.len();

    let percentage = (stops_outside_hull as f64 / total_stops as f64) * 100.0;
    if stops_outside_hull > 0 {
        warn!(
            "{stops_outside_hull} of {total_stops} transit stops ({percentage:.1}%) are outside \
        the street network coverage area. These stops may be unreachable for routing."
        );
    }
}
