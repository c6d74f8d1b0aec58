//! Trip insertion into the time-expanded network.
//!
//! A trip becomes a chain of departure and arrival nodes linked by `HOP` and
//! `DWELL` edges. Its events are collected per platform and, once every trip
//! is known, wired into departure and arrival timelines: one slot node per
//! distinct second of day, entered from the platform and linked to the trip
//! nodes by `BOARD` and `ALIGHT` edges.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;

use crate::model::PlatformNodes;
use crate::model::transit::{
    EdgePayload, EdgeSink, FeedIdWithTimezone, PtEdgeAttributes, TripDescriptor, Validity,
};
use crate::{PtEdgeId, PtNodeId, SECONDS_PER_DAY, Time};

/// Call of a trip at one platform
#[derive(Debug, Clone)]
pub(crate) struct TripStopSpec<'p> {
    pub(crate) platform: &'p PlatformNodes,
    pub(crate) stop_sequence: u32,
    pub(crate) arrival: Time,
    pub(crate) departure: Time,
}

#[derive(Debug, Clone)]
pub(crate) struct TripSpec<'p> {
    pub(crate) descriptor: Arc<TripDescriptor>,
    pub(crate) validity: Arc<Validity>,
    pub(crate) stops: Vec<TripStopSpec<'p>>,
}

/// Trip chain nodes by stop index. The last stop has no departure node and
/// the first stop no arrival node.
#[derive(Debug, Clone, Default)]
pub(crate) struct InsertedTrip {
    pub(crate) departure_nodes: Vec<Option<PtNodeId>>,
    pub(crate) arrival_nodes: Vec<Option<PtNodeId>>,
}

#[derive(Debug)]
struct TimelineEvent {
    node: PtNodeId,
    attrs: PtEdgeAttributes,
    first_of_trip: Option<Arc<TripDescriptor>>,
}

#[derive(Debug)]
struct PlatformTimeline {
    feed: Arc<FeedIdWithTimezone>,
    events: BTreeMap<Time, Vec<TimelineEvent>>,
}

/// Slot nodes per platform, keyed by second of day
#[derive(Debug, Default)]
pub(crate) struct WiredTimelines {
    /// Keyed by platform enter node
    pub(crate) departure_slots: HashMap<PtNodeId, BTreeMap<Time, PtNodeId>>,
    /// Keyed by platform exit node
    pub(crate) arrival_slots: HashMap<PtNodeId, BTreeMap<Time, PtNodeId>>,
    /// `BOARD` edge at the first stop of every inserted trip
    pub(crate) first_boards: HashMap<Arc<TripDescriptor>, PtEdgeId>,
}

impl WiredTimelines {
    pub(crate) fn merge(&mut self, other: WiredTimelines) {
        self.departure_slots.extend(other.departure_slots);
        self.arrival_slots.extend(other.arrival_slots);
        self.first_boards.extend(other.first_boards);
    }
}

/// Inserts trips through an [`EdgeSink`]. Used for the static schedule and
/// for trips added by realtime updates.
pub(crate) struct TripInserter<'s, S: EdgeSink> {
    sink: &'s mut S,
    departures: HashMap<PtNodeId, PlatformTimeline>,
    arrivals: HashMap<PtNodeId, PlatformTimeline>,
}

impl<'s, S: EdgeSink> TripInserter<'s, S> {
    pub(crate) fn new(sink: &'s mut S) -> Self {
        Self {
            sink,
            departures: HashMap::new(),
            arrivals: HashMap::new(),
        }
    }

    pub(crate) fn sink(&mut self) -> &mut S {
        &mut *self.sink
    }

    pub(crate) fn insert(
        &mut self,
        feed: &Arc<FeedIdWithTimezone>,
        trip: &TripSpec<'_>,
    ) -> InsertedTrip {
        let count = trip.stops.len();
        let mut inserted = InsertedTrip {
            departure_nodes: vec![None; count],
            arrival_nodes: vec![None; count],
        };
        let mut previous_departure: Option<(PtNodeId, Time)> = None;

        for (i, stop) in trip.stops.iter().enumerate() {
            let arrival_node = previous_departure.map(|(departure_node, departure_time)| {
                let node = self.sink.create_node();
                self.sink.create_edge(
                    departure_node,
                    node,
                    PtEdgeAttributes::new(
                        stop.arrival.saturating_sub(departure_time),
                        EdgePayload::Hop {
                            stop_sequence: stop.stop_sequence,
                        },
                    ),
                );
                self.push_arrival(feed, trip, stop, node);
                node
            });
            inserted.arrival_nodes[i] = arrival_node;

            if i + 1 < count {
                let node = self.sink.create_node();
                if let Some(arrival_node) = arrival_node {
                    self.sink.create_edge(
                        arrival_node,
                        node,
                        PtEdgeAttributes::new(
                            stop.departure.saturating_sub(stop.arrival),
                            EdgePayload::Dwell,
                        ),
                    );
                }
                self.push_departure(feed, trip, stop, node, i == 0);
                inserted.departure_nodes[i] = Some(node);
                previous_departure = Some((node, stop.departure));
            }
        }
        inserted
    }

    fn push_departure(
        &mut self,
        feed: &Arc<FeedIdWithTimezone>,
        trip: &TripSpec<'_>,
        stop: &TripStopSpec<'_>,
        node: PtNodeId,
        first: bool,
    ) {
        let attrs = PtEdgeAttributes::new(
            0,
            EdgePayload::Board {
                stop_sequence: stop.stop_sequence,
                trip: Arc::clone(&trip.descriptor),
                validity: shifted(&trip.validity, stop.departure),
                transfers: 1,
            },
        );
        self.departures
            .entry(stop.platform.enter)
            .or_insert_with(|| PlatformTimeline {
                feed: Arc::clone(feed),
                events: BTreeMap::new(),
            })
            .events
            .entry(stop.departure % SECONDS_PER_DAY)
            .or_default()
            .push(TimelineEvent {
                node,
                attrs,
                first_of_trip: first.then(|| Arc::clone(&trip.descriptor)),
            });
    }

    fn push_arrival(
        &mut self,
        feed: &Arc<FeedIdWithTimezone>,
        trip: &TripSpec<'_>,
        stop: &TripStopSpec<'_>,
        node: PtNodeId,
    ) {
        let attrs = PtEdgeAttributes::new(
            0,
            EdgePayload::Alight {
                stop_sequence: stop.stop_sequence,
                trip: Arc::clone(&trip.descriptor),
                validity: shifted(&trip.validity, stop.arrival),
            },
        );
        self.arrivals
            .entry(stop.platform.exit)
            .or_insert_with(|| PlatformTimeline {
                feed: Arc::clone(feed),
                events: BTreeMap::new(),
            })
            .events
            .entry(stop.arrival % SECONDS_PER_DAY)
            .or_default()
            .push(TimelineEvent {
                node,
                attrs,
                first_of_trip: None,
            });
    }

    /// Creates slot nodes, boundary edges and `BOARD`/`ALIGHT` edges for all
    /// collected events. With `waits`, consecutive slots are linked by `WAIT`
    /// and `WAIT_ARRIVAL` edges and the last slot of the day by `OVERNIGHT`.
    pub(crate) fn wire_timelines(self, waits: bool) -> WiredTimelines {
        let TripInserter {
            sink,
            departures,
            arrivals,
        } = self;
        let mut wired = WiredTimelines::default();

        for (enter, timeline) in departures.into_iter().sorted_unstable_by_key(|(k, _)| *k) {
            let mut slots = BTreeMap::new();
            for (time, events) in timeline.events {
                let slot = sink.create_node();
                sink.create_edge(
                    enter,
                    slot,
                    PtEdgeAttributes::new(
                        time,
                        EdgePayload::EnterTimeExpandedNetwork {
                            feed: Arc::clone(&timeline.feed),
                        },
                    ),
                );
                for event in events {
                    let board = sink.create_edge(slot, event.node, event.attrs);
                    if let Some(trip) = event.first_of_trip {
                        wired.first_boards.insert(trip, board);
                    }
                }
                slots.insert(time, slot);
            }
            if waits {
                link_slots(sink, &slots, || EdgePayload::Wait);
            }
            wired.departure_slots.insert(enter, slots);
        }

        for (exit, timeline) in arrivals.into_iter().sorted_unstable_by_key(|(k, _)| *k) {
            let mut slots = BTreeMap::new();
            for (time, events) in timeline.events {
                let slot = sink.create_node();
                for event in events {
                    sink.create_edge(event.node, slot, event.attrs);
                }
                sink.create_edge(
                    slot,
                    exit,
                    PtEdgeAttributes::new(
                        time,
                        EdgePayload::LeaveTimeExpandedNetwork {
                            feed: Arc::clone(&timeline.feed),
                        },
                    ),
                );
                slots.insert(time, slot);
            }
            if waits {
                link_slots(sink, &slots, || EdgePayload::WaitArrival);
            }
            wired.arrival_slots.insert(exit, slots);
        }

        wired
    }
}

fn link_slots<S: EdgeSink>(
    sink: &mut S,
    slots: &BTreeMap<Time, PtNodeId>,
    payload: impl Fn() -> EdgePayload,
) {
    for ((&from_time, &from), (&to_time, &to)) in slots.iter().zip(slots.iter().skip(1)) {
        sink.create_edge(from, to, PtEdgeAttributes::new(to_time - from_time, payload()));
    }
    if slots.len() > 1 {
        if let (Some((&last_time, &last)), Some((&first_time, &first))) =
            (slots.last_key_value(), slots.first_key_value())
        {
            sink.create_edge(
                last,
                first,
                PtEdgeAttributes::new(
                    wrapped_duration(last_time, first_time),
                    EdgePayload::Overnight,
                ),
            );
        }
    }
}

/// Duration from `from` to the next occurrence of `to`, both seconds of day
pub(crate) fn wrapped_duration(from: Time, to: Time) -> Time {
    (to + SECONDS_PER_DAY - from) % SECONDS_PER_DAY
}

fn shifted(validity: &Arc<Validity>, time: Time) -> Arc<Validity> {
    match (time / SECONDS_PER_DAY) as usize {
        0 => Arc::clone(validity),
        days => Arc::new(validity.shifted(days)),
    }
}
