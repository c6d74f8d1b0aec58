//! Overlay construction from trip updates.
//!
//! Scheduled trips are located through their first `BOARD` edge and the
//! hop/dwell chain behind it. Delays are recorded per edge, skipped stops
//! block their board and alight edges, and a delayed departure gets a
//! synthetic timeline slot with its own `BOARD` edge. Added trips go through
//! the same trip insertion as the static schedule, into the overlay id range.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use itertools::Itertools;
use log::{debug, info, warn};

use super::feed::{
    RealtimeFeed, StopDelay, StopScheduleRelationship, StopTimeEvent, StopTimeUpdate,
    TripScheduleRelationship, TripUpdate,
};
use super::overlay::RealtimeOverlay;
use crate::loading::time_expanded::{TripInserter, TripSpec, TripStopSpec};
use crate::model::transit::{
    EdgePayload, EdgeSink, EdgeType, PlatformDescriptor, PtEdge, PtEdgeAttributes,
    TripDescriptor, Validity,
};
use crate::model::{FeedInfo, PlannedStop, PlatformNodes, PtGraph, TransitModel, TripInfo};
use crate::{Error, Millis, PtEdgeId, PtNodeId, SECONDS_PER_DAY, Time};

/// Nodes and edges of one stop of a static trip
#[derive(Debug)]
struct ChainStop {
    departure: Option<PtNodeId>,
    boards: Vec<PtEdge>,
    alight: Option<PtEdgeId>,
}

impl RealtimeOverlay {
    /// Builds the overlay for `feeds` on top of `model`. Updates that do not
    /// fit the static schedule are logged and skipped.
    pub fn build(model: &TransitModel, feeds: &[RealtimeFeed]) -> Self {
        let mut overlay = Self::empty(&model.pt_graph);
        for feed in feeds {
            let Some(info) = model.feed(&feed.feed_id) else {
                warn!("Realtime feed {} has no static schedule", feed.feed_id);
                continue;
            };
            for update in &feed.trip_updates {
                let applied = match update.schedule_relationship {
                    TripScheduleRelationship::Scheduled => {
                        overlay.apply_scheduled(model, info, update)
                    }
                    TripScheduleRelationship::Canceled => {
                        overlay.apply_canceled(model, info, update)
                    }
                    TripScheduleRelationship::Added => overlay.apply_added(model, info, update),
                };
                if let Err(err) = applied {
                    warn!(
                        "Skipping update of trip {} in feed {}: {err}",
                        update.trip_id, feed.feed_id
                    );
                }
            }
        }
        info!(
            "Realtime overlay built: {} blocked edges, {} delayed edges, {} synthetic edges, {} added trips",
            overlay.blocked.len(),
            overlay.board_delays.len() + overlay.alight_delays.len(),
            overlay.synthetic_edge_count(),
            overlay.added_trip_count()
        );
        overlay
    }

    fn apply_scheduled(
        &mut self,
        model: &TransitModel,
        info: &FeedInfo,
        update: &TripUpdate,
    ) -> Result<(), Error> {
        let Some(trip) = self.first_update_of(model, info, update)? else {
            return Ok(());
        };
        let chain = trip_chain(&model.pt_graph, trip)?;
        let delays = resolve_delays(info, trip, update);

        for (index, (stop, delay)) in chain.iter().zip(&delays).enumerate() {
            if delay.skipped {
                self.block_stop(stop);
                continue;
            }
            if let Some(alight) = stop.alight {
                if delay.arrival_delay != 0 {
                    self.alight_delays
                        .insert(alight, Millis::from(delay.arrival_delay) * 1000);
                }
            }
            if let (Some(node), true) = (stop.departure, delay.departure_delay > 0) {
                self.delay_departure(model, info, trip, index, node, &stop.boards, delay)?;
            }
        }
        self.trip_delays.insert(trip_key(info, update), delays);
        Ok(())
    }

    fn apply_canceled(
        &mut self,
        model: &TransitModel,
        info: &FeedInfo,
        update: &TripUpdate,
    ) -> Result<(), Error> {
        let Some(trip) = self.first_update_of(model, info, update)? else {
            return Ok(());
        };
        let chain = trip_chain(&model.pt_graph, trip)?;
        for stop in &chain {
            self.block_stop(stop);
        }
        let skipped = StopDelay {
            skipped: true,
            ..StopDelay::default()
        };
        self.trip_delays
            .insert(trip_key(info, update), vec![skipped; chain.len()]);
        Ok(())
    }

    /// Static trip of `update`, or `None` if the trip was already updated by
    /// this overlay
    fn first_update_of<'m>(
        &self,
        model: &'m TransitModel,
        info: &FeedInfo,
        update: &TripUpdate,
    ) -> Result<Option<&'m TripInfo>, Error> {
        let trip = model
            .trip(&info.feed.feed_id, &update.trip_id)
            .ok_or_else(|| {
                Error::MalformedInput(format!(
                    "trip {} is not part of the static schedule",
                    update.trip_id
                ))
            })?;
        if self.trip_delays.contains_key(&trip_key(info, update)) {
            debug!("Trip {} already updated, ignoring repeated update", update.trip_id);
            return Ok(None);
        }
        Ok(Some(trip))
    }

    fn block_stop(&mut self, stop: &ChainStop) {
        self.blocked.extend(stop.boards.iter().map(|edge| edge.id));
        self.blocked.extend(stop.alight);
    }

    /// Replaces the scheduled `BOARD` edge of a departure by a synthetic one
    /// leaving a new slot at the delayed time
    #[allow(clippy::too_many_arguments)]
    fn delay_departure(
        &mut self,
        model: &TransitModel,
        info: &FeedInfo,
        trip: &TripInfo,
        index: usize,
        departure_node: PtNodeId,
        boards: &[PtEdge],
        delay: &StopDelay,
    ) -> Result<(), Error> {
        let planned = &trip.stops[index];
        let scheduled = boards
            .iter()
            .find(|edge| edge.attrs.transfers() == 1)
            .ok_or_else(|| {
                Error::MalformedInput(format!(
                    "trip {} has no boarding edge at stop sequence {}",
                    trip.descriptor.trip_id, planned.stop_sequence
                ))
            })?;
        let validity = scheduled.attrs.validity().ok_or_else(|| {
            Error::MalformedInput(format!(
                "boarding edge {} carries no validity",
                scheduled.id
            ))
        })?;
        let platform = model
            .platform(&PlatformDescriptor {
                feed_id: info.feed.feed_id.clone(),
                stop_id: planned.stop_id.clone(),
                route_id: trip.descriptor.route_id.clone(),
            })
            .ok_or_else(|| {
                Error::MalformedInput(format!(
                    "no platform for stop {} of trip {}",
                    planned.stop_id, trip.descriptor.trip_id
                ))
            })?;

        #[allow(clippy::cast_sign_loss)]
        let delayed = planned.departure + delay.departure_delay as Time;
        let extra_days = (delayed / SECONDS_PER_DAY - planned.departure / SECONDS_PER_DAY) as usize;
        let slot = self.create_node();
        self.create_edge(
            platform.enter,
            slot,
            PtEdgeAttributes::new(
                delayed % SECONDS_PER_DAY,
                EdgePayload::EnterTimeExpandedNetwork {
                    feed: Arc::clone(&info.feed),
                },
            ),
        );
        let board = self.create_edge(
            slot,
            departure_node,
            PtEdgeAttributes::new(
                0,
                EdgePayload::Board {
                    stop_sequence: planned.stop_sequence,
                    trip: Arc::clone(&trip.descriptor),
                    validity: Arc::new(validity.shifted(extra_days)),
                    transfers: 1,
                },
            ),
        );
        self.board_delays
            .insert(board, Millis::from(delay.departure_delay) * 1000);
        self.blocked.insert(scheduled.id);
        Ok(())
    }

    fn apply_added(
        &mut self,
        model: &TransitModel,
        info: &FeedInfo,
        update: &TripUpdate,
    ) -> Result<(), Error> {
        let feed_id = info.feed.feed_id.as_str();
        let malformed = |what: &str| {
            Error::MalformedInput(format!("added trip {} {what}", update.trip_id))
        };
        if model.trip(feed_id, &update.trip_id).is_some() {
            return Err(malformed("collides with a static trip"));
        }
        let key = trip_key(info, update);
        if self.added_trips.contains_key(&key) {
            debug!("Trip {} already added, ignoring repeated update", update.trip_id);
            return Ok(());
        }
        let route_id = update
            .route_id
            .as_deref()
            .ok_or_else(|| malformed("has no route"))?;
        let route_type = model
            .route_type(feed_id, route_id)
            .ok_or_else(|| malformed("references an unknown route"))?;
        let date = update
            .start_date
            .ok_or_else(|| malformed("has no start date"))?;
        let midnight =
            service_midnight(date, info.zone()).ok_or_else(|| malformed("has no local midnight"))?;
        let validity = Validity::single_day(date, info.zone(), info.start_date)
            .ok_or_else(|| malformed("runs before the schedule starts"))?;

        let mut stops = Vec::new();
        for (position, stop_update) in update.stop_time_updates.iter().enumerate() {
            if stop_update.schedule_relationship == StopScheduleRelationship::Skipped {
                continue;
            }
            stops.push(added_stop(position, stop_update, midnight).ok_or_else(|| {
                malformed("has a stop without stop id or absolute time")
            })?);
        }
        if stops.len() < 2 {
            return Err(malformed("has fewer than two stops"));
        }
        if stops
            .iter()
            .tuple_windows()
            .any(|(a, b)| a.departure < a.arrival || b.arrival < a.departure)
        {
            return Err(malformed("has stop times running backwards"));
        }

        let platforms = stops
            .iter()
            .map(|stop| self.platform_for(model, feed_id, &stop.stop_id, route_id, route_type))
            .collect::<Result<Vec<_>, Error>>()?;
        let descriptor = Arc::new(TripDescriptor {
            feed_id: feed_id.to_string(),
            trip_id: update.trip_id.clone(),
            route_id: route_id.to_string(),
        });
        let spec = TripSpec {
            descriptor: Arc::clone(&descriptor),
            validity: Arc::new(validity),
            stops: stops
                .iter()
                .zip(&platforms)
                .map(|(stop, platform)| TripStopSpec {
                    platform,
                    stop_sequence: stop.stop_sequence,
                    arrival: stop.arrival,
                    departure: stop.departure,
                })
                .collect(),
        };

        let mut inserter = TripInserter::new(&mut *self);
        inserter.insert(&info.feed, &spec);
        let wired = inserter.wire_timelines(false);
        let first_board_edge = wired
            .first_boards
            .get(&descriptor)
            .copied()
            .ok_or_else(|| malformed("produced no boarding edge"))?;

        self.trip_delays
            .insert(key.clone(), vec![StopDelay::default(); stops.len()]);
        self.added_trips.insert(
            key,
            TripInfo {
                descriptor,
                route_type,
                stops,
                first_board_edge,
            },
        );
        Ok(())
    }

    /// Static platform of (stop, route), or one created in the overlay
    fn platform_for(
        &mut self,
        model: &TransitModel,
        feed_id: &str,
        stop_id: &str,
        route_id: &str,
        route_type: i32,
    ) -> Result<PlatformNodes, Error> {
        let descriptor = PlatformDescriptor {
            feed_id: feed_id.to_string(),
            stop_id: stop_id.to_string(),
            route_id: route_id.to_string(),
        };
        if let Some(platform) = model
            .platform(&descriptor)
            .or_else(|| self.platforms.get(&descriptor))
        {
            return Ok(platform.clone());
        }

        let station = model.station(feed_id, stop_id)?.pt_node;
        let descriptor = Arc::new(descriptor);
        let platform = PlatformNodes {
            enter: self.create_node(),
            exit: self.create_node(),
            route_type,
            descriptor: Arc::clone(&descriptor),
        };
        self.create_edge(
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
        self.create_edge(
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
        self.platforms
            .insert((*descriptor).clone(), platform.clone());
        Ok(platform)
    }
}

fn trip_key(info: &FeedInfo, update: &TripUpdate) -> (String, String) {
    (info.feed.feed_id.clone(), update.trip_id.clone())
}

/// Walks the hop/dwell chain of a static trip from its first boarding edge
fn trip_chain(graph: &PtGraph, trip: &TripInfo) -> Result<Vec<ChainStop>, Error> {
    let malformed = |what: &str| {
        Error::MalformedInput(format!("trip {} {what}", trip.descriptor.trip_id))
    };
    if trip.first_board_edge >= graph.edge_count() {
        return Err(malformed("has no boarding edge"));
    }
    let first = graph.edge(trip.first_board_edge);
    if first.edge_type() != EdgeType::Board || first.attrs.trip() != Some(&trip.descriptor) {
        return Err(malformed("does not start with its own boarding edge"));
    }

    let count = trip.stops.len();
    let mut chain = Vec::with_capacity(count);
    let mut departure = Some(first.dest);
    let mut arrival: Option<PtNodeId> = None;
    for index in 0..count {
        let boards = departure
            .map(|node| {
                graph
                    .back_edges_around(node)
                    .filter(|edge| edge.edge_type() == EdgeType::Board)
                    .collect()
            })
            .unwrap_or_default();
        let alight = arrival.and_then(|node| {
            graph
                .edges_around(node)
                .find(|edge| edge.edge_type() == EdgeType::Alight)
                .map(|edge| edge.id)
        });
        chain.push(ChainStop {
            departure,
            boards,
            alight,
        });
        if index + 1 == count {
            break;
        }

        let node = departure.ok_or_else(|| malformed("ends before its last stop"))?;
        let hop = graph
            .edges_around(node)
            .find(|edge| edge.edge_type() == EdgeType::Hop)
            .ok_or_else(|| malformed("has a departure without hop"))?;
        arrival = Some(hop.dest);
        departure = if index + 2 < count {
            let dwell = graph
                .edges_around(hop.dest)
                .find(|edge| edge.edge_type() == EdgeType::Dwell)
                .ok_or_else(|| malformed("has an intermediate stop without dwell"))?;
            Some(dwell.dest)
        } else {
            None
        };
    }
    Ok(chain)
}

/// Delay per stop of `trip`. Stops without their own update inherit the
/// departure delay of the previous stop.
fn resolve_delays(info: &FeedInfo, trip: &TripInfo, update: &TripUpdate) -> Vec<StopDelay> {
    let midnight = update
        .start_date
        .and_then(|date| service_midnight(date, info.zone()));
    let mut by_stop: Vec<Option<&StopTimeUpdate>> = vec![None; trip.stops.len()];
    for stop_update in &update.stop_time_updates {
        let index = match (stop_update.stop_sequence, stop_update.stop_id.as_deref()) {
            (Some(sequence), _) => trip.stop_by_sequence(sequence).map(|(index, _)| index),
            (None, Some(stop_id)) => trip.stops.iter().position(|stop| stop.stop_id == stop_id),
            (None, None) => None,
        };
        match index {
            Some(index) => by_stop[index] = Some(stop_update),
            None => warn!(
                "Stop time update {:?}/{:?} does not match a stop of trip {}",
                stop_update.stop_sequence, stop_update.stop_id, update.trip_id
            ),
        }
    }

    let mut current = 0;
    trip.stops
        .iter()
        .zip(by_stop)
        .map(|(stop, stop_update)| {
            let Some(stop_update) = stop_update else {
                return StopDelay {
                    arrival_delay: current,
                    departure_delay: current,
                    skipped: false,
                };
            };
            match stop_update.schedule_relationship {
                StopScheduleRelationship::NoData => {
                    current = 0;
                    StopDelay::default()
                }
                StopScheduleRelationship::Skipped => StopDelay {
                    arrival_delay: current,
                    departure_delay: current,
                    skipped: true,
                },
                StopScheduleRelationship::Scheduled => {
                    let arrival = stop_update
                        .arrival
                        .and_then(|event| event_delay(event, stop.arrival, midnight))
                        .unwrap_or(current);
                    let departure = stop_update
                        .departure
                        .and_then(|event| event_delay(event, stop.departure, midnight))
                        .unwrap_or(arrival);
                    current = departure;
                    StopDelay {
                        arrival_delay: arrival,
                        departure_delay: departure,
                        skipped: false,
                    }
                }
            }
        })
        .collect()
}

fn event_delay(event: StopTimeEvent, scheduled: Time, midnight: Option<i64>) -> Option<i32> {
    event.delay.or_else(|| {
        let (time, midnight) = (event.time?, midnight?);
        i32::try_from(time - midnight - i64::from(scheduled)).ok()
    })
}

fn added_stop(position: usize, update: &StopTimeUpdate, midnight: i64) -> Option<PlannedStop> {
    let seconds = |event: Option<StopTimeEvent>| {
        event
            .and_then(|event| event.time)
            .and_then(|time| Time::try_from(time - midnight).ok())
    };
    let arrival = seconds(update.arrival).or_else(|| seconds(update.departure))?;
    Some(PlannedStop {
        stop_id: update.stop_id.clone()?,
        stop_sequence: update
            .stop_sequence
            .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX)),
        arrival,
        departure: seconds(update.departure).unwrap_or(arrival),
    })
}

/// Epoch seconds of the service day start, noon minus twelve hours
pub(crate) fn service_midnight(date: NaiveDate, zone: Tz) -> Option<i64> {
    let noon = date.and_hms_opt(12, 0, 0)?;
    zone.from_local_datetime(&noon)
        .single()
        .map(|local| local.timestamp() - 12 * 3600)
}

#[cfg(test)]
mod tests {
    use chrono_tz::Europe::Berlin;

    use super::*;

    fn trip_info(stops: &[(&str, Time, Time)]) -> TripInfo {
        TripInfo {
            descriptor: Arc::new(TripDescriptor {
                feed_id: "gtfs_0".into(),
                trip_id: "A1".into(),
                route_id: "A".into(),
            }),
            route_type: 3,
            stops: stops
                .iter()
                .enumerate()
                .map(|(i, &(stop_id, arrival, departure))| PlannedStop {
                    stop_id: stop_id.into(),
                    stop_sequence: u32::try_from(i).unwrap() + 1,
                    arrival,
                    departure,
                })
                .collect(),
            first_board_edge: 0,
        }
    }

    fn feed_info() -> FeedInfo {
        FeedInfo {
            feed: Arc::new(crate::model::transit::FeedIdWithTimezone {
                feed_id: "gtfs_0".into(),
                zone: Berlin,
            }),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 17).unwrap(),
        }
    }

    fn stop_update(sequence: u32, arrival_delay: Option<i32>) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_sequence: Some(sequence),
            stop_id: None,
            arrival: arrival_delay.map(|delay| StopTimeEvent {
                delay: Some(delay),
                time: None,
            }),
            departure: None,
            schedule_relationship: StopScheduleRelationship::Scheduled,
        }
    }

    #[test]
    fn delays_propagate_downstream_only() {
        let trip = trip_info(&[
            ("S1", 28_800, 28_800),
            ("S2", 29_400, 29_460),
            ("S3", 30_000, 30_000),
        ]);
        let update = TripUpdate {
            trip_id: "A1".into(),
            route_id: None,
            start_date: None,
            schedule_relationship: TripScheduleRelationship::Scheduled,
            stop_time_updates: vec![stop_update(2, Some(300))],
        };
        let delays = resolve_delays(&feed_info(), &trip, &update);
        assert_eq!(delays[0], StopDelay::default());
        assert_eq!(delays[1].arrival_delay, 300);
        assert_eq!(delays[1].departure_delay, 300);
        assert_eq!(delays[2].arrival_delay, 300);
    }

    #[test]
    fn absolute_times_need_a_service_date() {
        let trip = trip_info(&[("S1", 28_800, 28_800), ("S2", 29_400, 29_400)]);
        let date = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        let midnight = service_midnight(date, Berlin).unwrap();
        let mut update = TripUpdate {
            trip_id: "A1".into(),
            route_id: None,
            start_date: Some(date),
            schedule_relationship: TripScheduleRelationship::Scheduled,
            stop_time_updates: vec![StopTimeUpdate {
                arrival: Some(StopTimeEvent {
                    delay: None,
                    time: Some(midnight + 29_400 + 120),
                }),
                ..stop_update(2, None)
            }],
        };
        let delays = resolve_delays(&feed_info(), &trip, &update);
        assert_eq!(delays[1].arrival_delay, 120);

        update.start_date = None;
        let delays = resolve_delays(&feed_info(), &trip, &update);
        assert_eq!(delays[1].arrival_delay, 0);
    }

    #[test]
    fn service_midnight_follows_local_time() {
        // 2024-03-12 00:00 CET is 23:00 UTC of the previous day
        let date = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        assert_eq!(service_midnight(date, Berlin), Some(1_710_198_000));
    }
}
