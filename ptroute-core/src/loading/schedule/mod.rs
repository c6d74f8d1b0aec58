//! Already-parsed schedule facts consumed by the network builder

pub(crate) mod calendar;
mod de;
mod types;

pub use types::{
    ExceptionType, Feed, FeedCalendar, FeedCalendarDate, FeedRoute, FeedStop, FeedStopTime,
    FeedTransfer, FeedTrip, TransferType,
};
