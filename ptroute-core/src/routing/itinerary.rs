//! Folding search paths into walk and transit legs

use std::sync::Arc;

use geo::{Bearing, Coord, Haversine, LineString, Point};

use crate::Millis;
use crate::model::transit::{EdgeType, PtEdge, TripDescriptor};
use crate::model::{TransitModel, TripInfo};
use crate::realtime::{RealtimeOverlay, StopDelay};

use super::explorer::{GraphEdge, StreetHop};
use super::label::Transition;

/// A point of a journey: the time reached after taking `edge`
#[derive(Debug, Clone)]
pub(crate) struct PathStep {
    pub(crate) time: Millis,
    pub(crate) edge: Option<GraphEdge>,
}

/// Path steps of `transitions`, moved in time by `offset`
pub(crate) fn path_steps(transitions: &[Transition], offset: Millis) -> Vec<PathStep> {
    transitions
        .iter()
        .map(|transition| PathStep {
            time: transition.label.time + offset,
            edge: transition.edge.clone(),
        })
        .collect()
}

/// A complete journey
#[derive(Debug, Clone)]
pub struct Itinerary {
    pub legs: Vec<Leg>,
    pub departure_time: Millis,
    pub arrival_time: Millis,
    pub duration: Millis,
    /// Vehicle changes; staying seated through a block transfer is free
    pub transfers: usize,
    pub walk_time: Millis,
    pub walk_distance: f64,
    /// `false` if the journey only works when known delays do not happen
    pub feasible: bool,
}

impl Itinerary {
    pub fn transit_legs(&self) -> impl Iterator<Item = &TransitLeg> {
        self.legs.iter().filter_map(|leg| match leg {
            Leg::Transit(transit) => Some(transit),
            Leg::Walk(_) => None,
        })
    }

    pub fn is_walk_only(&self) -> bool {
        self.transit_legs().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub enum Leg {
    Walk(WalkLeg),
    Transit(TransitLeg),
}

impl Leg {
    pub fn departure_time(&self) -> Millis {
        match self {
            Leg::Walk(walk) => walk.departure_time,
            Leg::Transit(transit) => transit.departure_time,
        }
    }

    pub fn arrival_time(&self) -> Millis {
        match self {
            Leg::Walk(walk) => walk.arrival_time,
            Leg::Transit(transit) => transit.arrival_time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalkLeg {
    pub departure_time: Millis,
    pub arrival_time: Millis,
    /// Metres
    pub distance: f64,
    pub geometry: LineString<f64>,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSign {
    Depart,
    Continue,
    SlightLeft,
    Left,
    SharpLeft,
    SlightRight,
    Right,
    SharpRight,
    Arrive,
}

impl TurnSign {
    /// Sign for a change of heading in degrees, clockwise positive
    pub fn from_heading_change(degrees: f64) -> Self {
        let delta = (degrees + 540.0).rem_euclid(360.0) - 180.0;
        match delta {
            d if d.abs() < 30.0 => TurnSign::Continue,
            d if d >= 135.0 => TurnSign::SharpRight,
            d if d >= 60.0 => TurnSign::Right,
            d if d > 0.0 => TurnSign::SlightRight,
            d if d <= -135.0 => TurnSign::SharpLeft,
            d if d <= -60.0 => TurnSign::Left,
            _ => TurnSign::SlightLeft,
        }
    }
}

/// One street along a walk leg
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub sign: TurnSign,
    pub street_name: Option<String>,
    pub distance: f64,
    pub time: Millis,
}

#[derive(Debug, Clone)]
pub struct TransitLeg {
    pub feed_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub route_type: Option<i32>,
    pub departure_time: Millis,
    pub arrival_time: Millis,
    pub stops: Vec<StopVisit>,
    /// Continues the previous leg through a block transfer
    pub in_same_vehicle_as_previous: bool,
    pub geometry: LineString<f64>,
}

/// A call of a transit leg at a stop. The boarding stop has no arrival and
/// the alighting stop no departure.
#[derive(Debug, Clone, PartialEq)]
pub struct StopVisit {
    pub stop_id: String,
    pub name: Option<String>,
    pub geometry: Option<Point<f64>>,
    pub stop_sequence: u32,
    pub planned_arrival: Option<Millis>,
    pub planned_departure: Option<Millis>,
    pub predicted_arrival: Option<Millis>,
    pub predicted_departure: Option<Millis>,
    pub skipped: bool,
}

struct WalkStep {
    hop: StreetHop,
    departure: Millis,
    arrival: Millis,
}

struct OpenRide {
    board: PtEdge,
    trip: Arc<TripDescriptor>,
    departure: Millis,
    arrival: Millis,
    board_sequence: u32,
    alight_sequence: u32,
    same_vehicle: bool,
}

/// Builds an itinerary from a path in temporal order
pub(crate) fn build_itinerary(
    model: &TransitModel,
    overlay: Option<&RealtimeOverlay>,
    path: &[PathStep],
    impossible: bool,
) -> Itinerary {
    let mut legs = Vec::new();
    let mut walk: Vec<WalkStep> = Vec::new();
    let mut ride: Option<OpenRide> = None;

    for pair in path.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let Some(edge) = &current.edge else {
            continue;
        };
        let pt = match edge {
            GraphEdge::Street(hop) => {
                walk.push(WalkStep {
                    hop: *hop,
                    departure: previous.time,
                    arrival: current.time,
                });
                continue;
            }
            GraphEdge::Transit(pt) => pt,
        };
        if !walk.is_empty() {
            legs.push(Leg::Walk(walk_leg(model, &walk)));
            walk.clear();
        }
        let sequence = pt.attrs.stop_sequence();
        match pt.edge_type() {
            EdgeType::Board => {
                let same_vehicle = match ride.take() {
                    Some(open) => {
                        legs.push(Leg::Transit(transit_leg(model, overlay, open)));
                        true
                    }
                    None => false,
                };
                if let (Some(trip), Some(sequence)) = (pt.attrs.trip(), sequence) {
                    ride = Some(OpenRide {
                        board: pt.clone(),
                        trip: Arc::clone(trip),
                        departure: current.time,
                        arrival: current.time,
                        board_sequence: sequence,
                        alight_sequence: sequence,
                        same_vehicle,
                    });
                }
            }
            EdgeType::Hop => {
                if let (Some(open), Some(sequence)) = (ride.as_mut(), sequence) {
                    open.alight_sequence = sequence;
                    open.arrival = current.time;
                }
            }
            EdgeType::Alight => {
                if let Some(mut open) = ride.take() {
                    if let Some(sequence) = sequence {
                        open.alight_sequence = sequence;
                    }
                    open.arrival = current.time;
                    legs.push(Leg::Transit(transit_leg(model, overlay, open)));
                }
            }
            _ => {}
        }
    }
    if !walk.is_empty() {
        legs.push(Leg::Walk(walk_leg(model, &walk)));
    }
    if let Some(open) = ride.take() {
        legs.push(Leg::Transit(transit_leg(model, overlay, open)));
    }

    let departure_time = path.first().map_or(0, |step| step.time);
    let arrival_time = path.last().map_or(departure_time, |step| step.time);
    let vehicles = legs
        .iter()
        .filter(|leg| matches!(leg, Leg::Transit(t) if !t.in_same_vehicle_as_previous))
        .count();
    let (walk_time, walk_distance) = legs
        .iter()
        .filter_map(|leg| match leg {
            Leg::Walk(walk) => Some((walk.arrival_time - walk.departure_time, walk.distance)),
            Leg::Transit(_) => None,
        })
        .fold((0, 0.0), |(time, distance), (t, d)| (time + t, distance + d));

    Itinerary {
        legs,
        departure_time,
        arrival_time,
        duration: arrival_time - departure_time,
        transfers: vehicles.saturating_sub(1),
        walk_time,
        walk_distance,
        feasible: !impossible,
    }
}

fn walk_leg(model: &TransitModel, steps: &[WalkStep]) -> WalkLeg {
    let mut coords: Vec<Coord<f64>> = Vec::new();
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut heading: Option<f64> = None;

    for step in steps {
        let street = model.street_graph.edge(step.hop.edge);
        let segment: Vec<Coord<f64>> = street.map_or_else(Vec::new, |s| s.geometry.0.clone());
        let name = street.and_then(|s| s.name.clone());
        let time = step.arrival - step.departure;

        let entry = segment
            .first()
            .zip(segment.get(1))
            .map(|(a, b)| Haversine.bearing(Point::from(*a), Point::from(*b)));
        let continues = instructions
            .last()
            .is_some_and(|last| last.street_name == name);
        match instructions.last_mut() {
            Some(last) if continues => {
                last.distance += step.hop.distance;
                last.time += time;
            }
            _ => {
                let sign = match (instructions.is_empty(), heading, entry) {
                    (true, _, _) => TurnSign::Depart,
                    (false, Some(from), Some(to)) => TurnSign::from_heading_change(to - from),
                    _ => TurnSign::Continue,
                };
                instructions.push(Instruction {
                    sign,
                    street_name: name,
                    distance: step.hop.distance,
                    time,
                });
            }
        }

        let len = segment.len();
        if len >= 2 {
            heading = Some(Haversine.bearing(
                Point::from(segment[len - 2]),
                Point::from(segment[len - 1]),
            ));
        }
        let skip = usize::from(coords.last().is_some_and(|last| segment.first() == Some(last)));
        coords.extend(segment.into_iter().skip(skip));
    }
    instructions.push(Instruction {
        sign: TurnSign::Arrive,
        street_name: None,
        distance: 0.0,
        time: 0,
    });

    WalkLeg {
        departure_time: steps.first().map_or(0, |s| s.departure),
        arrival_time: steps.last().map_or(0, |s| s.arrival),
        distance: steps.iter().map(|s| s.hop.distance).sum(),
        geometry: LineString::from(coords),
        instructions,
    }
}

fn trip_info<'m>(
    model: &'m TransitModel,
    overlay: Option<&'m RealtimeOverlay>,
    trip: &TripDescriptor,
) -> Option<&'m TripInfo> {
    model
        .trip(&trip.feed_id, &trip.trip_id)
        .or_else(|| overlay.and_then(|o| o.added_trip(&trip.feed_id, &trip.trip_id)))
}

fn transit_leg(
    model: &TransitModel,
    overlay: Option<&RealtimeOverlay>,
    ride: OpenRide,
) -> TransitLeg {
    let info = trip_info(model, overlay, &ride.trip);
    let delays: Option<&[StopDelay]> =
        overlay.and_then(|o| o.trip_delays(&ride.trip.feed_id, &ride.trip.trip_id));
    let board_delay = overlay.map_or(0, |o| o.board_delay(ride.board.id));

    let mut stops = Vec::new();
    if let Some(info) = info {
        let service_start = info
            .stop_by_sequence(ride.board_sequence)
            .map(|(_, stop)| ride.departure - board_delay - Millis::from(stop.departure) * 1000);
        for (idx, stop) in info.stops.iter().enumerate() {
            if stop.stop_sequence < ride.board_sequence || stop.stop_sequence > ride.alight_sequence
            {
                continue;
            }
            let is_first = stop.stop_sequence == ride.board_sequence;
            let is_last = stop.stop_sequence == ride.alight_sequence;
            let planned_arrival = service_start
                .filter(|_| !is_first)
                .map(|start| start + Millis::from(stop.arrival) * 1000);
            let planned_departure = service_start
                .filter(|_| !is_last)
                .map(|start| start + Millis::from(stop.departure) * 1000);
            let delay = delays.and_then(|d| d.get(idx)).copied();
            let predict = |planned: Option<Millis>, seconds: fn(&StopDelay) -> i32| {
                planned
                    .zip(delay)
                    .map(|(time, delay)| time + Millis::from(seconds(&delay)) * 1000)
            };
            let station = model.station(&ride.trip.feed_id, &stop.stop_id).ok();
            stops.push(StopVisit {
                stop_id: stop.stop_id.clone(),
                name: station.map(|s| s.name.clone()),
                geometry: station.map(|s| s.geometry),
                stop_sequence: stop.stop_sequence,
                planned_arrival,
                planned_departure,
                predicted_arrival: predict(planned_arrival, |d| d.arrival_delay),
                predicted_departure: predict(planned_departure, |d| d.departure_delay),
                skipped: delay.is_some_and(|d| d.skipped),
            });
        }
    }

    let geometry = stops
        .iter()
        .filter_map(|stop| stop.geometry.map(|p| p.0))
        .collect::<Vec<_>>();
    TransitLeg {
        feed_id: ride.trip.feed_id.clone(),
        trip_id: ride.trip.trip_id.clone(),
        route_id: ride.trip.route_id.clone(),
        route_type: info.map(|i| i.route_type),
        departure_time: ride.departure,
        arrival_time: ride.arrival,
        stops,
        in_same_vehicle_as_previous: ride.same_vehicle,
        geometry: LineString::from(geometry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_changes_map_to_signs() {
        assert_eq!(TurnSign::from_heading_change(10.0), TurnSign::Continue);
        assert_eq!(TurnSign::from_heading_change(-350.0), TurnSign::Continue);
        assert_eq!(TurnSign::from_heading_change(45.0), TurnSign::SlightRight);
        assert_eq!(TurnSign::from_heading_change(90.0), TurnSign::Right);
        assert_eq!(TurnSign::from_heading_change(270.0), TurnSign::Left);
        assert_eq!(TurnSign::from_heading_change(-170.0), TurnSign::SharpLeft);
        assert_eq!(TurnSign::from_heading_change(150.0), TurnSign::SharpRight);
    }
}
