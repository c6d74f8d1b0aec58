//! Edge types and attribute payloads of the time-expanded transit network

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Timelike};
use chrono_tz::Tz;
use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};

use crate::{Millis, PtEdgeId, PtNodeId, Time};

/// Kind of a transit graph edge. The discriminant is the tag stored in the
/// attribute region of the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EdgeType {
    Highway = 0,
    EnterTimeExpandedNetwork = 1,
    LeaveTimeExpandedNetwork = 2,
    EnterPt = 3,
    ExitPt = 4,
    Hop = 5,
    Dwell = 6,
    Board = 7,
    Alight = 8,
    Overnight = 9,
    Transfer = 10,
    Wait = 11,
    WaitArrival = 12,
}

impl EdgeType {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        let edge_type = match tag {
            0 => EdgeType::Highway,
            1 => EdgeType::EnterTimeExpandedNetwork,
            2 => EdgeType::LeaveTimeExpandedNetwork,
            3 => EdgeType::EnterPt,
            4 => EdgeType::ExitPt,
            5 => EdgeType::Hop,
            6 => EdgeType::Dwell,
            7 => EdgeType::Board,
            8 => EdgeType::Alight,
            9 => EdgeType::Overnight,
            10 => EdgeType::Transfer,
            11 => EdgeType::Wait,
            12 => EdgeType::WaitArrival,
            _ => return None,
        };
        Some(edge_type)
    }
}

/// Days on which a trip runs, as offsets from the schedule start date in the
/// timezone of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validity {
    #[serde(with = "day_set")]
    pub days: FixedBitSet,
    pub zone: Tz,
    pub start: NaiveDate,
}

impl Validity {
    pub fn new(days: FixedBitSet, zone: Tz, start: NaiveDate) -> Self {
        Self { days, zone, start }
    }

    /// Validity covering exactly one service date
    pub fn single_day(date: NaiveDate, zone: Tz, start: NaiveDate) -> Option<Self> {
        let offset = usize::try_from((date - start).num_days()).ok()?;
        let mut days = FixedBitSet::with_capacity(offset + 1);
        days.insert(offset);
        Some(Self::new(days, zone, start))
    }

    /// Day offset of `instant` relative to the schedule start, in local time
    pub fn traffic_day(&self, instant: Millis) -> Option<usize> {
        let local = DateTime::from_timestamp_millis(instant)?.with_timezone(&self.zone);
        usize::try_from((local.date_naive() - self.start).num_days()).ok()
    }

    pub fn is_valid_on(&self, instant: Millis) -> bool {
        self.traffic_day(instant)
            .is_some_and(|day| self.days.contains(day))
    }

    /// Validity of events that happen `days` after the service day, e.g. stop
    /// times past midnight.
    pub fn shifted(&self, days: usize) -> Self {
        if days == 0 {
            return self.clone();
        }
        let mut shifted = FixedBitSet::with_capacity(self.days.len() + days);
        for day in self.days.ones() {
            shifted.insert(day + days);
        }
        Self::new(shifted, self.zone, self.start)
    }
}

/// Day bitsets are stored as their length and the offsets of set days
mod day_set {
    use fixedbitset::FixedBitSet;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Days {
        len: usize,
        ones: Vec<usize>,
    }

    pub(super) fn serialize<S: Serializer>(
        days: &FixedBitSet,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        Days {
            len: days.len(),
            ones: days.ones().collect(),
        }
        .serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<FixedBitSet, D::Error> {
        let stored = Days::deserialize(deserializer)?;
        if let Some(day) = stored.ones.iter().find(|&&day| day >= stored.len) {
            return Err(serde::de::Error::custom(format!(
                "day {day} outside a set of {} days",
                stored.len
            )));
        }
        let mut days = FixedBitSet::with_capacity(stored.len);
        for day in stored.ones {
            days.insert(day);
        }
        Ok(days)
    }
}

/// Milliseconds elapsed since local midnight of `instant` in `zone`
pub fn millis_of_day(instant: Millis, zone: &Tz) -> Millis {
    DateTime::from_timestamp_millis(instant)
        .map(|utc| {
            let local = utc.with_timezone(zone);
            Millis::from(local.num_seconds_from_midnight()) * 1000
                + Millis::from(local.nanosecond() / 1_000_000)
        })
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedIdWithTimezone {
    pub feed_id: String,
    pub zone: Tz,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripDescriptor {
    pub feed_id: String,
    pub trip_id: String,
    pub route_id: String,
}

/// A (stop, route) pair: where passengers of one route wait at one stop
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    pub feed_id: String,
    pub stop_id: String,
    pub route_id: String,
}

/// Type-specific attribute payload, decoded from the fixed field schema
/// following the type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgePayload {
    Highway,
    Board {
        stop_sequence: u32,
        trip: Arc<TripDescriptor>,
        validity: Arc<Validity>,
        transfers: u32,
    },
    Alight {
        stop_sequence: u32,
        trip: Arc<TripDescriptor>,
        validity: Arc<Validity>,
    },
    EnterPt {
        route_type: i32,
        platform: Arc<PlatformDescriptor>,
    },
    ExitPt {
        route_type: i32,
        platform: Arc<PlatformDescriptor>,
    },
    Transfer {
        route_type: i32,
        platform: Arc<PlatformDescriptor>,
    },
    EnterTimeExpandedNetwork {
        feed: Arc<FeedIdWithTimezone>,
    },
    LeaveTimeExpandedNetwork {
        feed: Arc<FeedIdWithTimezone>,
    },
    Hop {
        stop_sequence: u32,
    },
    Dwell,
    Wait,
    WaitArrival,
    Overnight,
}

/// Attributes of a transit edge: a time field plus the typed payload.
///
/// `time` is seconds. For network boundary edges it is the second of day of
/// the departure or arrival slot, for every other type a fixed duration.
#[derive(Debug, Clone, PartialEq)]
pub struct PtEdgeAttributes {
    pub time: Time,
    pub payload: EdgePayload,
}

impl PtEdgeAttributes {
    pub fn new(time: Time, payload: EdgePayload) -> Self {
        Self { time, payload }
    }

    pub fn edge_type(&self) -> EdgeType {
        match self.payload {
            EdgePayload::Highway => EdgeType::Highway,
            EdgePayload::Board { .. } => EdgeType::Board,
            EdgePayload::Alight { .. } => EdgeType::Alight,
            EdgePayload::EnterPt { .. } => EdgeType::EnterPt,
            EdgePayload::ExitPt { .. } => EdgeType::ExitPt,
            EdgePayload::Transfer { .. } => EdgeType::Transfer,
            EdgePayload::EnterTimeExpandedNetwork { .. } => EdgeType::EnterTimeExpandedNetwork,
            EdgePayload::LeaveTimeExpandedNetwork { .. } => EdgeType::LeaveTimeExpandedNetwork,
            EdgePayload::Hop { .. } => EdgeType::Hop,
            EdgePayload::Dwell => EdgeType::Dwell,
            EdgePayload::Wait => EdgeType::Wait,
            EdgePayload::WaitArrival => EdgeType::WaitArrival,
            EdgePayload::Overnight => EdgeType::Overnight,
        }
    }

    /// Transfer count increment of traversing this edge
    pub fn transfers(&self) -> u32 {
        match self.payload {
            EdgePayload::Board { transfers, .. } => transfers,
            _ => 0,
        }
    }

    pub fn route_type(&self) -> Option<i32> {
        match self.payload {
            EdgePayload::EnterPt { route_type, .. }
            | EdgePayload::ExitPt { route_type, .. }
            | EdgePayload::Transfer { route_type, .. } => Some(route_type),
            _ => None,
        }
    }

    pub fn stop_sequence(&self) -> Option<u32> {
        match self.payload {
            EdgePayload::Board { stop_sequence, .. }
            | EdgePayload::Alight { stop_sequence, .. }
            | EdgePayload::Hop { stop_sequence } => Some(stop_sequence),
            _ => None,
        }
    }

    pub fn validity(&self) -> Option<&Validity> {
        match &self.payload {
            EdgePayload::Board { validity, .. } | EdgePayload::Alight { validity, .. } => {
                Some(validity)
            }
            _ => None,
        }
    }

    pub fn trip(&self) -> Option<&Arc<TripDescriptor>> {
        match &self.payload {
            EdgePayload::Board { trip, .. } | EdgePayload::Alight { trip, .. } => Some(trip),
            _ => None,
        }
    }

    pub fn platform(&self) -> Option<&Arc<PlatformDescriptor>> {
        match &self.payload {
            EdgePayload::EnterPt { platform, .. }
            | EdgePayload::ExitPt { platform, .. }
            | EdgePayload::Transfer { platform, .. } => Some(platform),
            _ => None,
        }
    }

    pub fn feed(&self) -> Option<&Arc<FeedIdWithTimezone>> {
        match &self.payload {
            EdgePayload::EnterTimeExpandedNetwork { feed }
            | EdgePayload::LeaveTimeExpandedNetwork { feed } => Some(feed),
            _ => None,
        }
    }
}

/// A decoded transit edge in its stored orientation
#[derive(Debug, Clone, PartialEq)]
pub struct PtEdge {
    pub id: PtEdgeId,
    pub src: PtNodeId,
    pub dest: PtNodeId,
    pub attrs: PtEdgeAttributes,
}

impl PtEdge {
    pub fn edge_type(&self) -> EdgeType {
        self.attrs.edge_type()
    }
}
