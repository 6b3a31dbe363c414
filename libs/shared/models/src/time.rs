//! Clock-time helpers for the `"HH:MM"` strings stored alongside schedule
//! rows. Minutes-since-midnight arithmetic deliberately has no day rollover;
//! callers reject anything that would run past the end of the day.

use chrono::NaiveTime;

pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// Parse an `"HH:MM"` string (also accepts `"HH:MM:SS"` as stored by Postgrest).
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn minutes_since_midnight(time: NaiveTime) -> i32 {
    use chrono::Timelike;
    (time.hour() * 60 + time.minute()) as i32
}

/// Build a time from minutes since midnight; `None` once past 23:59.
pub fn time_from_minutes(minutes: i32) -> Option<NaiveTime> {
    if !(0..MINUTES_PER_DAY).contains(&minutes) {
        return None;
    }
    NaiveTime::from_hms_opt(minutes as u32 / 60, minutes as u32 % 60, 0)
}

/// Serde adapter for optional `"HH:MM"` fields.
pub mod serde_hhmm_opt {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&format_hhmm(*time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            // Partial slot data maps to None rather than an error.
            Some(s) => Ok(parse_hhmm(&s)),
            None => Ok(None),
        }
    }
}

/// Serde adapter for required `"HH:MM"` fields.
pub mod serde_hhmm {
    use super::*;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_hhmm(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_hhmm(&raw).ok_or_else(|| D::Error::custom(format!("invalid clock time: {}", raw)))
    }
}
