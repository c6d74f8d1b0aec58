use geo::Point;

use crate::Millis;

use super::itinerary::Itinerary;

/// Origin or destination of a request
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Coordinate snapped to the nearest walkable street node
    Point(Point<f64>),
    /// A stop of a feed, used directly
    Station { feed_id: String, stop_id: String },
}

impl Location {
    pub fn station(feed_id: impl Into<String>, stop_id: impl Into<String>) -> Self {
        Location::Station {
            feed_id: feed_id.into(),
            stop_id: stop_id.into(),
        }
    }
}

/// A routing request. Fields left as `None` use the router defaults.
#[derive(Debug, Clone)]
pub struct PtRequest {
    pub from: Location,
    pub to: Location,
    /// Departure time, or arrival deadline for arrive-by requests
    pub instant: Millis,
    pub arrive_by: bool,
    pub walk_speed_kmh: Option<f64>,
    /// Bit `n` set blocks route type `n`
    pub blocked_route_types: u32,
    pub max_visited_nodes: Option<usize>,
    pub limit_solutions: Option<usize>,
    /// Return all useful departures within a window instead of the best ones
    pub profile: bool,
    pub max_profile_duration: Option<Millis>,
    /// Optimize travel time only
    pub ignore_transfers: bool,
    /// Use trips regardless of their service days
    pub ignore_validity: bool,
}

impl PtRequest {
    pub fn new(from: Location, to: Location, instant: Millis) -> Self {
        Self {
            from,
            to,
            instant,
            arrive_by: false,
            walk_speed_kmh: None,
            blocked_route_types: 0,
            max_visited_nodes: None,
            limit_solutions: None,
            profile: false,
            max_profile_duration: None,
            ignore_transfers: false,
            ignore_validity: false,
        }
    }

    #[must_use]
    pub fn arrive_by(mut self) -> Self {
        self.arrive_by = true;
        self
    }

    #[must_use]
    pub fn profile(mut self, window: Millis) -> Self {
        self.profile = true;
        self.max_profile_duration = Some(window);
        self
    }

    #[must_use]
    pub fn block_route_type(mut self, route_type: u32) -> Self {
        if route_type < u32::BITS {
            self.blocked_route_types |= 1 << route_type;
        }
        self
    }
}

/// Itineraries of one request, best first
#[derive(Debug, Clone)]
pub struct PtResponse {
    pub itineraries: Vec<Itinerary>,
    pub visited_nodes: usize,
}

impl PtResponse {
    /// Best itinerary that does not depend on delays vanishing
    pub fn best(&self) -> Option<&Itinerary> {
        self.itineraries.iter().find(|itinerary| itinerary.feasible)
    }
}
