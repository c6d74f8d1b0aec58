//! Already-parsed realtime trip updates

use chrono::NaiveDate;
use serde::Deserialize;

use crate::Millis;

/// Trip updates of one realtime feed, matched against the static feed with
/// the same id
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeFeed {
    pub feed_id: String,
    /// Production time of the feed in milliseconds since the epoch
    #[serde(default)]
    pub timestamp: Option<Millis>,
    #[serde(default)]
    pub trip_updates: Vec<TripUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripScheduleRelationship {
    #[default]
    Scheduled,
    Added,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopScheduleRelationship {
    #[default]
    Scheduled,
    Skipped,
    NoData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripUpdate {
    pub trip_id: String,
    #[serde(default)]
    pub route_id: Option<String>,
    /// Service date the update refers to. Required for added trips and for
    /// absolute event times.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub schedule_relationship: TripScheduleRelationship,
    #[serde(default)]
    pub stop_time_updates: Vec<StopTimeUpdate>,
}

/// Arrival or departure prediction, as a delay or as an absolute time
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StopTimeEvent {
    /// Delay in seconds relative to the schedule
    #[serde(default)]
    pub delay: Option<i32>,
    /// Absolute time in seconds since the epoch
    #[serde(default)]
    pub time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopTimeUpdate {
    #[serde(default)]
    pub stop_sequence: Option<u32>,
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub arrival: Option<StopTimeEvent>,
    #[serde(default)]
    pub departure: Option<StopTimeEvent>,
    #[serde(default)]
    pub schedule_relationship: StopScheduleRelationship,
}

/// Realtime state of one stop of a trip, retained for itinerary output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopDelay {
    /// Arrival delay in seconds
    pub arrival_delay: i32,
    /// Departure delay in seconds
    pub departure_delay: i32,
    pub skipped: bool,
}
