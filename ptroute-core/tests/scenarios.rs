mod common;

use common::*;
use geo::Point;
use ptroute_core::prelude::*;
use ptroute_core::routing::Leg;

#[test]
fn connects_two_routes_at_shared_stop() {
    let model = model();
    let request = PtRequest::new(near_stop(0), near_stop(2), tuesday(7, 55));
    let response = router(&model).route(&request).unwrap();
    let best = response.best().unwrap();

    assert!(best.feasible);
    assert_eq!(routes(best), ["A", "B"]);
    assert_eq!(trips(best), ["A1", "B1"]);
    assert_eq!(best.transfers, 1);
    assert_eq!(best.departure_time, tuesday(7, 55));
    assert!(best.arrival_time > tuesday(8, 25));
    assert!(best.arrival_time < tuesday(8, 27));
    assert!(matches!(best.legs.first(), Some(Leg::Walk(_))));
    assert!(matches!(best.legs.last(), Some(Leg::Walk(_))));
    assert!(best.walk_distance > 150.0 && best.walk_distance < 250.0);

    let first = best.transit_legs().next().unwrap();
    assert_eq!(first.departure_time, tuesday(8, 0));
    assert_eq!(first.arrival_time, tuesday(8, 10));
    assert_eq!(first.stops.len(), 2);
    assert_eq!(first.stops[0].stop_id, "S1");
    assert_eq!(first.stops[0].planned_departure, Some(tuesday(8, 0)));
    assert_eq!(first.stops[0].planned_arrival, None);
    assert_eq!(first.stops[1].planned_arrival, Some(tuesday(8, 10)));
    assert!(!first.in_same_vehicle_as_previous);
}

#[test]
fn block_transfer_keeps_passenger_seated() {
    let mut feed = feed();
    for trip in feed.trips.iter_mut().filter(|t| t.trip_id == "A1" || t.trip_id == "B1") {
        trip.block_id = Some("block-1".into());
    }
    let model = model_with(feed);
    let request = PtRequest::new(near_stop(0), near_stop(2), tuesday(7, 55));
    let response = router(&model).route(&request).unwrap();
    let best = response.best().unwrap();

    assert_eq!(trips(best), ["A1", "B1"]);
    assert_eq!(best.transfers, 0);
    let same_vehicle: Vec<bool> = best
        .transit_legs()
        .map(|leg| leg.in_same_vehicle_as_previous)
        .collect();
    assert_eq!(same_vehicle, [false, true]);
    let first = best.transit_legs().next().unwrap();
    assert_eq!(first.arrival_time, tuesday(8, 10));
    assert_eq!(first.stops.last().map(|stop| stop.stop_id.as_str()), Some("S2"));
    assert!(best.arrival_time < tuesday(8, 27));
}

#[test]
fn station_to_station_has_no_walking() {
    let model = model();
    let request = PtRequest::new(
        Location::station(FEED, "S1"),
        Location::station(FEED, "S3"),
        tuesday(8, 0),
    );
    let response = router(&model).route(&request).unwrap();
    assert_eq!(response.itineraries.len(), 1);
    let best = response.best().unwrap();

    assert_eq!(trips(best), ["A1", "B1"]);
    assert_eq!(best.transfers, 1);
    assert_eq!(best.departure_time, tuesday(8, 0));
    assert_eq!(best.arrival_time, tuesday(8, 25));
    assert_eq!(best.walk_time, 0);
}

#[test]
fn short_walk_needs_no_transit() {
    let model = model();
    let next_to_stop = Location::Point(Point::new(13.4005, 52.5));
    let request = PtRequest::new(near_stop(0), next_to_stop, tuesday(7, 55));
    let response = router(&model).route(&request).unwrap();
    let best = response.best().unwrap();

    assert!(best.is_walk_only());
    assert_eq!(best.transfers, 0);
    assert!(best.walk_distance > 60.0 && best.walk_distance < 75.0);
    assert!(best.arrival_time - best.departure_time < minutes(1));
}

#[test]
fn arrive_by_departs_as_late_as_possible() {
    let model = model();
    let request = PtRequest::new(near_stop(0), near_stop(2), tuesday(9, 0)).arrive_by();
    let response = router(&model).route(&request).unwrap();
    let best = response.best().unwrap();

    assert_eq!(trips(best), ["A2", "B2"]);
    assert_eq!(best.arrival_time, tuesday(9, 0));
    assert!(best.departure_time > tuesday(8, 28));
    assert!(best.departure_time < tuesday(8, 30));
    let last = best.transit_legs().last().unwrap();
    assert_eq!(last.arrival_time, tuesday(8, 55));
}

#[test]
fn profile_lists_every_departure_in_window() {
    let model = model();
    // 07:55 to 08:35
    let request =
        PtRequest::new(near_stop(0), near_stop(2), tuesday(7, 55)).profile(minutes(40));
    let response = router(&model).route(&request).unwrap();

    let departures: Vec<Millis> = response
        .itineraries
        .iter()
        .map(|itinerary| itinerary.transit_legs().next().unwrap().departure_time)
        .collect();
    assert_eq!(departures, [tuesday(8, 0), tuesday(8, 30)]);
    assert!(response.itineraries.iter().all(|itinerary| itinerary.feasible));
}

#[test]
fn wider_profile_window_with_solution_limit() {
    let model = model();
    let mut request =
        PtRequest::new(near_stop(0), near_stop(2), tuesday(7, 55)).profile(minutes(60));
    request.limit_solutions = Some(3);
    let response = router(&model).route(&request).unwrap();

    let departures: Vec<Millis> = response
        .itineraries
        .iter()
        .map(|itinerary| itinerary.transit_legs().next().unwrap().departure_time)
        .collect();
    assert_eq!(departures, [tuesday(8, 0), tuesday(8, 30)]);
}

#[test]
fn weekend_service_is_not_used() {
    let model = model();
    let request = PtRequest::new(near_stop(0), near_stop(2), saturday(7, 55));
    let err = router(&model).route(&request).unwrap_err();
    assert!(matches!(err, Error::NoRouteFound));

    let mut request = request;
    request.ignore_validity = true;
    let response = router(&model).route(&request).unwrap();
    let best = response.best().unwrap();
    assert_eq!(trips(best), ["A1", "B1"]);
    assert!(best.arrival_time < saturday(8, 27));
}

#[test]
fn blocked_route_type_is_never_boarded() {
    let model = model();
    let request =
        PtRequest::new(near_stop(0), near_stop(2), tuesday(7, 55)).block_route_type(0);
    let err = router(&model).route(&request).unwrap_err();
    assert!(err.is_not_found());

    let request =
        PtRequest::new(near_stop(0), near_stop(1), tuesday(7, 55)).block_route_type(0);
    let response = router(&model).route(&request).unwrap();
    assert_eq!(routes(response.best().unwrap()), ["A"]);
}

#[test]
fn boarding_penalty_counts_as_weight_only() {
    let model = model();
    let mut config = RouterConfig::default();
    config.boarding_penalties_by_route_type.insert(3, minutes(10));
    let router = PtRouter::new(&model, config);
    let request = PtRequest::new(near_stop(0), near_stop(1), tuesday(7, 55));
    let best = router.route(&request).unwrap().best().cloned().unwrap();

    assert_eq!(trips(&best), ["A1"]);
    assert!(best.arrival_time < tuesday(8, 12));
}

#[test]
fn unknown_endpoints_are_reported() {
    let model = model();
    let router = router(&model);

    let request = PtRequest::new(
        Location::station(FEED, "S9"),
        near_stop(2),
        tuesday(7, 55),
    );
    assert!(matches!(
        router.route(&request),
        Err(Error::StationNotFound(_))
    ));

    let request = PtRequest::new(
        Location::Point(Point::new(0.0, 0.0)),
        near_stop(2),
        tuesday(7, 55),
    );
    assert!(matches!(router.route(&request), Err(Error::NoPointsFound)));
}

#[test]
fn small_budget_is_exceeded() {
    let model = model();
    let mut request = PtRequest::new(near_stop(0), near_stop(2), tuesday(7, 55));
    request.max_visited_nodes = Some(8);
    let err = router(&model).route(&request).unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { .. }));
}

#[test]
fn batch_routing_keeps_request_order() {
    let model = model();
    let requests = vec![
        PtRequest::new(near_stop(0), near_stop(2), tuesday(7, 55)),
        PtRequest::new(near_stop(0), near_stop(1), tuesday(8, 20)),
        PtRequest::new(near_stop(0), near_stop(2), saturday(7, 55)),
    ];
    let results = router(&model).route_many(&requests);

    assert_eq!(results.len(), 3);
    assert_eq!(trips(results[0].as_ref().unwrap().best().unwrap()), ["A1", "B1"]);
    assert_eq!(trips(results[1].as_ref().unwrap().best().unwrap()), ["A2"]);
    assert!(results[2].is_err());
}
