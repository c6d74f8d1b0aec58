#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Europe::Berlin;
use geo::Point;
use ptroute_core::loading::schedule::{
    Feed, FeedCalendar, FeedRoute, FeedStop, FeedStopTime, FeedTransfer, FeedTrip, TransferType,
};
use ptroute_core::prelude::*;

pub const FEED: &str = "gtfs_0";

/// Longitudes of the stops S1, S2 and S3, all at latitude 52.5
const STOP_LON: [f64; 3] = [13.40, 13.42, 13.44];
const LAT: f64 = 52.5;

/// Epoch millis of a local Berlin time
pub fn local(date: (i32, u32, u32), hour: u32, minute: u32) -> Millis {
    let day = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
    Berlin
        .from_local_datetime(&day.and_hms_opt(hour, minute, 0).unwrap())
        .unwrap()
        .timestamp_millis()
}

/// Tuesday 2024-03-12, a regular weekday
pub fn tuesday(hour: u32, minute: u32) -> Millis {
    local((2024, 3, 12), hour, minute)
}

pub fn saturday(hour: u32, minute: u32) -> Millis {
    local((2024, 3, 16), hour, minute)
}

pub fn minutes(n: i64) -> Millis {
    n * 60 * 1000
}

/// Query point on the street island next to stop `idx`, about 100 m walk
/// from the stop
pub fn near_stop(idx: usize) -> Location {
    Location::Point(Point::new(STOP_LON[idx] + 0.0015, LAT))
}

/// Each stop gets its own small street island, so stops are only linked by
/// transit
pub fn street_graph() -> StreetGraph {
    let mut streets = StreetGraph::new();
    for (idx, lon) in STOP_LON.iter().enumerate() {
        let near = streets.add_node(Point::new(lon + 0.0005, LAT));
        let far = streets.add_node(Point::new(lon + 0.0015, LAT));
        let name = format!("Weg {}", idx + 1);
        streets.add_street(near, far, Some(name.as_str()), true);
    }
    streets
}

fn stop(idx: usize) -> FeedStop {
    FeedStop {
        stop_id: format!("S{}", idx + 1),
        stop_name: format!("Stop {}", idx + 1),
        stop_lat: LAT,
        stop_lon: STOP_LON[idx],
    }
}

fn trip(trip_id: &str, route_id: &str) -> FeedTrip {
    FeedTrip {
        trip_id: trip_id.into(),
        route_id: route_id.into(),
        service_id: "weekdays".into(),
        block_id: None,
    }
}

fn stop_time(trip_id: &str, stop_id: &str, stop_sequence: u32, hhmm: (u32, u32)) -> FeedStopTime {
    let seconds = hhmm.0 * 3600 + hhmm.1 * 60;
    FeedStopTime {
        trip_id: trip_id.into(),
        stop_id: stop_id.into(),
        stop_sequence,
        arrival_time: seconds,
        departure_time: seconds,
    }
}

/// Route A (bus) runs S1 -> S2 at 08:00, 08:30 and 09:00, route B (tram)
/// runs S2 -> S3 at 08:15, 08:45 and 09:15. Every ride takes ten minutes,
/// changing at S2 takes three.
pub fn feed() -> Feed {
    let departures_a = [(8, 0), (8, 30), (9, 0)];
    let departures_b = [(8, 15), (8, 45), (9, 15)];
    let mut trips = Vec::new();
    let mut stop_times = Vec::new();
    for (n, &(h, m)) in departures_a.iter().enumerate() {
        let id = format!("A{}", n + 1);
        trips.push(trip(&id, "A"));
        stop_times.push(stop_time(&id, "S1", 1, (h, m)));
        stop_times.push(stop_time(&id, "S2", 2, (h, m + 10)));
    }
    for (n, &(h, m)) in departures_b.iter().enumerate() {
        let id = format!("B{}", n + 1);
        trips.push(trip(&id, "B"));
        stop_times.push(stop_time(&id, "S2", 1, (h, m)));
        stop_times.push(stop_time(&id, "S3", 2, (h, m + 10)));
    }

    Feed {
        feed_id: FEED.into(),
        timezone: Berlin,
        start_date: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 3, 24).unwrap(),
        stops: (0..3).map(stop).collect(),
        routes: vec![
            FeedRoute {
                route_id: "A".into(),
                route_type: 3,
                route_short_name: "A".into(),
            },
            FeedRoute {
                route_id: "B".into(),
                route_type: 0,
                route_short_name: "B".into(),
            },
        ],
        trips,
        stop_times,
        calendars: vec![FeedCalendar {
            service_id: "weekdays".into(),
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            ..FeedCalendar::default()
        }],
        calendar_dates: Vec::new(),
        transfers: vec![FeedTransfer {
            from_stop_id: "S2".into(),
            to_stop_id: "S2".into(),
            from_route_id: None,
            to_route_id: None,
            transfer_type: TransferType::MinTime,
            min_transfer_time: Some(180),
        }],
    }
}

pub fn model() -> TransitModel {
    model_with(feed())
}

pub fn model_with(feed: Feed) -> TransitModel {
    create_transit_model(street_graph(), &[feed], &TransitModelConfig::default()).unwrap()
}

pub fn router(model: &TransitModel) -> PtRouter<'_> {
    PtRouter::new(model, RouterConfig::default())
}

/// Route ids of the transit legs of `itinerary`
pub fn routes(itinerary: &Itinerary) -> Vec<String> {
    itinerary
        .transit_legs()
        .map(|leg| leg.route_id.clone())
        .collect()
}

pub fn trips(itinerary: &Itinerary) -> Vec<String> {
    itinerary
        .transit_legs()
        .map(|leg| leg.trip_id.clone())
        .collect()
}
