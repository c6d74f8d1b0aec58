//! Day-validity bitsets from service calendars

use std::sync::Arc;

use chrono::Datelike;
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;

use super::types::{ExceptionType, Feed};
use crate::model::Validity;

/// Validity of every service of `feed`, indexed by day offset from the feed
/// start date. Services referenced only by calendar dates are included.
pub(crate) fn service_validities(feed: &Feed) -> HashMap<String, Arc<Validity>> {
    let days = usize::try_from((feed.end_date - feed.start_date).num_days() + 1).unwrap_or(0);
    let mut bitsets: HashMap<String, FixedBitSet> = HashMap::new();

    for calendar in &feed.calendars {
        let bits = bitsets
            .entry(calendar.service_id.clone())
            .or_insert_with(|| FixedBitSet::with_capacity(days));
        let first = calendar.start_date.unwrap_or(feed.start_date).max(feed.start_date);
        let last = calendar.end_date.unwrap_or(feed.end_date).min(feed.end_date);
        for date in first.iter_days().take_while(|date| *date <= last) {
            if calendar.runs_on(date.weekday()) {
                bits.insert((date - feed.start_date).num_days() as usize);
            }
        }
    }

    for exception in &feed.calendar_dates {
        let Ok(offset) = usize::try_from((exception.date - feed.start_date).num_days()) else {
            continue;
        };
        if offset >= days {
            continue;
        }
        let bits = bitsets
            .entry(exception.service_id.clone())
            .or_insert_with(|| FixedBitSet::with_capacity(days));
        bits.set(offset, exception.exception_type == ExceptionType::Added);
    }

    bitsets
        .into_iter()
        .map(|(service_id, bits)| {
            let validity = Validity::new(bits, feed.timezone, feed.start_date);
            (service_id, Arc::new(validity))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::loading::schedule::{FeedCalendar, FeedCalendarDate};

    fn feed() -> Feed {
        serde_json::from_value(serde_json::json!({
            "feed_id": "gtfs_0",
            "timezone": "Europe/Berlin",
            "start_date": "2024-03-11",
            "end_date": "2024-03-24",
        }))
        .unwrap()
    }

    #[test]
    fn weekdays_and_exceptions() {
        let mut feed = feed();
        feed.calendars.push(FeedCalendar {
            service_id: "weekdays".into(),
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            ..Default::default()
        });
        feed.calendar_dates.push(FeedCalendarDate {
            service_id: "weekdays".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
            exception_type: ExceptionType::Removed,
        });
        feed.calendar_dates.push(FeedCalendarDate {
            service_id: "special".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 16).unwrap(),
            exception_type: ExceptionType::Added,
        });

        let validities = service_validities(&feed);
        let weekdays = &validities["weekdays"];
        let running: Vec<_> = weekdays.days.ones().collect();
        assert_eq!(running, vec![0, 1, 3, 4, 7, 8, 9, 10, 11]);
        let special: Vec<_> = validities["special"].days.ones().collect();
        assert_eq!(special, vec![5]);
    }
}
