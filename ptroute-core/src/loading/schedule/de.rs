use serde::Deserialize;

use crate::Time;

/// Parse time string in HH:MM:SS format to seconds since midnight.
/// Hours may exceed 23 for trips running past midnight.
pub(crate) fn parse_time(time_str: &str) -> Option<Time> {
    let bytes = time_str.as_bytes();

    // Fast path for HH:MM:SS format
    if bytes.len() == 8
        && bytes[2] == b':'
        && bytes[5] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || i == 5 || b.is_ascii_digit())
    {
        let hours = u32::from(bytes[0] - b'0') * 10 + u32::from(bytes[1] - b'0');
        let minutes = u32::from(bytes[3] - b'0') * 10 + u32::from(bytes[4] - b'0');
        let seconds = u32::from(bytes[6] - b'0') * 10 + u32::from(bytes[7] - b'0');
        if minutes > 59 || seconds > 59 {
            return None;
        }
        return Some(hours * 3600 + minutes * 60 + seconds);
    }

    parse_time_fallback(time_str)
}

fn parse_time_fallback(time_str: &str) -> Option<Time> {
    let mut parts = time_str.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let seconds: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Seconds(Time),
    Text(String),
}

/// Accepts seconds since service-day midnight or an `HH:MM:SS` string
pub(crate) fn deserialize_time<'de, D>(deserializer: D) -> Result<Time, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RawTime::deserialize(deserializer)? {
        RawTime::Seconds(seconds) => Ok(seconds),
        RawTime::Text(text) => parse_time(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_times_past_midnight() {
        assert_eq!(parse_time("08:15:00"), Some(29_700));
        assert_eq!(parse_time("25:01:30"), Some(90_090));
        assert_eq!(parse_time("7:05:00"), Some(25_500));
        assert_eq!(parse_time("7:05"), Some(25_500));
        assert_eq!(parse_time("08:75:00"), None);
        assert_eq!(parse_time("08:15:60"), None);
        assert_eq!(parse_time("8:75:00"), None);
        assert_eq!(parse_time("soon"), None);
    }

    #[test]
    fn deserializes_both_representations() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(deserialize_with = "deserialize_time")]
            t: Time,
        }
        let text: Row = serde_json::from_str(r#"{"t":"08:00:00"}"#).unwrap();
        let secs: Row = serde_json::from_str(r#"{"t":28800}"#).unwrap();
        assert_eq!(text.t, secs.t);
        assert!(serde_json::from_str::<Row>(r#"{"t":"later"}"#).is_err());
    }
}
