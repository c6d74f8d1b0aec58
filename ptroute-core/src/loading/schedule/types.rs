use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;

use super::de::deserialize_time;
use crate::Time;

/// One already-parsed schedule feed
#[derive(Debug, Clone, Deserialize)]
pub struct Feed {
    pub feed_id: String,
    pub timezone: Tz,
    /// First service date covered by validity bitsets
    pub start_date: NaiveDate,
    /// Last service date covered by validity bitsets
    pub end_date: NaiveDate,
    #[serde(default)]
    pub stops: Vec<FeedStop>,
    #[serde(default)]
    pub routes: Vec<FeedRoute>,
    #[serde(default)]
    pub trips: Vec<FeedTrip>,
    #[serde(default)]
    pub stop_times: Vec<FeedStopTime>,
    #[serde(default)]
    pub calendars: Vec<FeedCalendar>,
    #[serde(default)]
    pub calendar_dates: Vec<FeedCalendarDate>,
    #[serde(default)]
    pub transfers: Vec<FeedTransfer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedStop {
    pub stop_id: String,
    #[serde(default)]
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedRoute {
    pub route_id: String,
    pub route_type: i32,
    #[serde(default)]
    pub route_short_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedTrip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    #[serde(default)]
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedStopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    #[serde(deserialize_with = "deserialize_time")]
    pub arrival_time: Time,
    #[serde(deserialize_with = "deserialize_time")]
    pub departure_time: Time,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedCalendar {
    pub service_id: String,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl FeedCalendar {
    pub(crate) fn runs_on(&self, weekday: chrono::Weekday) -> bool {
        use chrono::Weekday;
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionType {
    Added,
    Removed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedCalendarDate {
    pub service_id: String,
    pub date: NaiveDate,
    pub exception_type: ExceptionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    #[default]
    Recommended,
    Timed,
    MinTime,
    NotPossible,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedTransfer {
    pub from_stop_id: String,
    pub to_stop_id: String,
    #[serde(default)]
    pub from_route_id: Option<String>,
    #[serde(default)]
    pub to_route_id: Option<String>,
    #[serde(default)]
    pub transfer_type: TransferType,
    #[serde(default)]
    pub min_transfer_time: Option<Time>,
}
