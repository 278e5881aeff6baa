//! Rider payload ingestion
//!
//! Turns the JSON document produced by the data-acquisition layer into typed
//! models. Upstream records are loosely shaped: numbers arrive as strings or
//! single-element lists, dates as ISO strings or unix timestamps, and the
//! same value can live under several keys. All of that is resolved here so
//! the analysis modules only ever see typed values.
//!
//! Individual bad records (an event with an unparseable date, a profile point
//! without power) are dropped with a warning. A section with the wrong JSON
//! type is a contract violation and fails the whole payload.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::PayloadError;
use crate::models::{
    Event, EventType, PeakRecord, PowerIntervalSnapshot, PowerSample, SnapshotMap,
};

/// Typed rider payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderPayload {
    pub rider_id: String,
    pub name: Option<String>,
    /// FTP reported by the platform, watts
    pub ftp: Option<f64>,
    pub weight_kg: Option<f64>,
    /// One sample per duration, ascending
    pub profile: Vec<PowerSample>,
    pub snapshots: SnapshotMap,
    /// Ordered by event date, ties in payload order
    pub events: Vec<Event>,
    /// Events dropped for an unparseable date or shape
    pub dropped_events: usize,
}

impl RiderPayload {
    /// Parse a payload from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Read and parse a payload file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PayloadError> {
        let content = fs::read_to_string(&path)
            .map_err(|e| PayloadError::from_io(path.as_ref(), e))?;
        Self::from_json_str(&content)
    }

    /// Parse a payload from an already decoded JSON document
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let root = value
            .as_object()
            .ok_or_else(|| PayloadError::shape("payload", "an object"))?;

        let rider_id = first_of(root, &["rider_id", "riderId", "zwid", "id"])
            .and_then(as_text)
            .unwrap_or_else(|| "unknown".to_string());

        let profile = match root.get("profile") {
            Some(section) => parse_profile(section)?,
            None => Vec::new(),
        };

        let snapshots = match first_of(root, &["snapshots", "power"]) {
            Some(section) => parse_snapshots(section)?,
            None => SnapshotMap::new(),
        };

        let (events, dropped_events) = parse_event_sections(root)?;

        debug!(
            rider_id = %rider_id,
            samples = profile.len(),
            snapshots = snapshots.len(),
            events = events.len(),
            dropped = dropped_events,
            "Parsed rider payload"
        );

        Ok(RiderPayload {
            rider_id,
            name: first_of(root, &["name", "rider_name"]).and_then(as_text),
            ftp: root.get("ftp").and_then(as_number).filter(|f| *f > 0.0),
            weight_kg: first_of(root, &["weight", "weight_kg"])
                .and_then(as_number)
                .filter(|w| *w > 0.0),
            profile,
            snapshots,
            events,
            dropped_events,
        })
    }

    /// Events of one type, or all events when no type is given
    pub fn events_of_type(&self, event_type: Option<EventType>) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .enumerate()
            .map(|(index, mut event)| {
                event.index = index;
                event
            })
            .collect()
    }

    pub fn latest_event_date(&self) -> Option<NaiveDate> {
        self.events.iter().map(|e| e.event_date).max()
    }

    /// No event within the last `days` days of `as_of`
    pub fn is_inactive(&self, as_of: NaiveDate, days: u32) -> bool {
        match self.latest_event_date() {
            Some(latest) => (as_of - latest).num_days() > i64::from(days),
            None => true,
        }
    }
}

/// Duration in seconds from a key such as `time_300`, `300s` or `300`
pub fn parse_duration_key(key: &str) -> Option<u32> {
    let trimmed = key.trim();
    let stripped = trimmed.strip_prefix("time_").unwrap_or(trimmed);
    let stripped = stripped.strip_suffix('s').unwrap_or(stripped);

    if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    stripped.parse::<u32>().ok().filter(|d| *d > 0)
}

/// Calendar date from an ISO date, ISO date-time or unix timestamp
///
/// The time of day is discarded; for offset date-times the date as written is kept.
pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n.as_i64().and_then(date_from_timestamp),
        Value::String(s) => parse_date_str(s),
        Value::Array(items) => items.first().and_then(parse_date_value),
        _ => None,
    }
}

fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        // Compact calendar dates share the all-digit shape with timestamps
        if s.len() == 8 {
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y%m%d") {
                return Some(date);
            }
        }
        return s.parse::<i64>().ok().and_then(date_from_timestamp);
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }

    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

fn date_from_timestamp(ts: i64) -> Option<NaiveDate> {
    if ts <= 0 {
        return None;
    }
    // Millisecond timestamps are common in chart payloads
    let secs = if ts > 100_000_000_000 { ts / 1000 } else { ts };
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

fn parse_profile(section: &Value) -> Result<Vec<PowerSample>, PayloadError> {
    let entries = section
        .as_array()
        .ok_or_else(|| PayloadError::shape("profile", "an array"))?;

    let mut by_duration: BTreeMap<u32, PowerSample> = BTreeMap::new();
    let mut skipped = 0usize;

    for entry in entries {
        let Some(sample) = entry.as_object().and_then(parse_sample) else {
            skipped += 1;
            continue;
        };

        let existing = by_duration.get(&sample.duration).map(|s| s.power);
        if let Some(power) = existing {
            warn!(duration = sample.duration, "Duplicate profile duration, keeping higher power");
            if power >= sample.power {
                continue;
            }
        }
        by_duration.insert(sample.duration, sample);
    }

    if skipped > 0 {
        warn!(skipped, "Skipped malformed profile samples");
    }

    Ok(by_duration.into_values().collect())
}

fn parse_sample(entry: &Map<String, Value>) -> Option<PowerSample> {
    let duration = first_of(entry, &["duration", "secs", "x"])
        .and_then(as_number)
        .filter(|d| *d >= 1.0)
        .map(|d| d.round() as u32)?;
    let power = first_of(entry, &["power", "watts", "y"])
        .and_then(as_number)
        .filter(|p| *p >= 0.0)?;

    Some(PowerSample {
        duration,
        power,
        recent_power: first_of(entry, &["recent", "recent_power"]).and_then(as_number),
        season_power: first_of(entry, &["season", "season_power"]).and_then(as_number),
        achieved_date: first_of(entry, &["date", "achieved_date"]).and_then(parse_date_value),
    })
}

fn parse_snapshots(section: &Value) -> Result<SnapshotMap, PayloadError> {
    let entries = section
        .as_object()
        .ok_or_else(|| PayloadError::shape("power", "an object keyed by duration"))?;

    let mut snapshots = SnapshotMap::new();

    for (key, value) in entries {
        let Some(duration) = parse_duration_key(key) else {
            debug!(key = %key, "Ignoring non-duration power key");
            continue;
        };
        let Some(fields) = value.as_object() else {
            warn!(key = %key, "Power snapshot is not an object");
            continue;
        };

        let record = |period: &str| {
            fields
                .get(&format!("peak_{}", period))
                .and_then(as_number)
                .filter(|p| *p > 0.0)
                .map(|power| PeakRecord {
                    power,
                    achieved: fields
                        .get(&format!("date_{}", period))
                        .and_then(parse_date_value),
                })
        };

        snapshots.insert(
            duration,
            PowerIntervalSnapshot {
                season: record("season"),
                recent: record("recent"),
                last_event: record("last_event"),
            },
        );
    }

    Ok(snapshots)
}

/// Events from a combined `events` list and the per-type lists the upstream
/// tooling writes (`races`, `group_rides`, `workouts`)
fn parse_event_sections(root: &Map<String, Value>) -> Result<(Vec<Event>, usize), PayloadError> {
    let sections: [(&str, Option<EventType>); 4] = [
        ("events", None),
        ("races", Some(EventType::Race)),
        ("group_rides", Some(EventType::GroupRide)),
        ("workouts", Some(EventType::Workout)),
    ];

    let mut events = Vec::new();
    let mut dropped = 0usize;

    for (field, implied) in sections {
        let Some(section) = root.get(field) else {
            continue;
        };
        let entries = section
            .as_array()
            .ok_or_else(|| PayloadError::shape(field, "an array"))?;

        for entry in entries {
            let position = events.len() + dropped;
            match entry.as_object().and_then(|e| parse_event(e, implied, position)) {
                Some(event) => events.push(event),
                None => dropped += 1,
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, "Dropped events with missing or unparseable dates");
    }

    // Stable: same-day events keep payload order
    events.sort_by_key(|e| e.event_date);
    for (index, event) in events.iter_mut().enumerate() {
        event.index = index;
    }

    Ok((events, dropped))
}

fn parse_event(
    entry: &Map<String, Value>,
    implied: Option<EventType>,
    position_in_payload: usize,
) -> Option<Event> {
    let event_date = first_of(entry, &["event_date", "date"]).and_then(parse_date_value)?;

    let category = entry
        .get("category")
        .and_then(as_text)
        .filter(|c| !c.is_empty());
    let position = first_of(entry, &["position", "pos"])
        .and_then(as_number)
        .filter(|p| *p >= 1.0)
        .map(|p| p as u32);
    let raw_type = first_of(entry, &["event_type", "f_t"]).and_then(as_text);

    let embedded_power = entry
        .iter()
        .filter_map(|(key, value)| {
            let duration = parse_duration_key(key)?;
            as_number(value)
                .filter(|p| *p > 0.0)
                .map(|power| (duration, power))
        })
        .collect();

    Some(Event {
        id: first_of(entry, &["id", "event_id", "zid"])
            .and_then(as_text)
            .unwrap_or_else(|| format!("event-{}", position_in_payload)),
        index: 0,
        event_date,
        event_type: classify_event(raw_type.as_deref(), category.as_deref(), position, implied),
        title: first_of(entry, &["event_title", "title", "name"])
            .and_then(as_text)
            .filter(|t| !t.is_empty()),
        avg_power: entry
            .get("avg_power")
            .and_then(as_number)
            .filter(|p| *p > 0.0),
        duration_seconds: first_of(entry, &["duration_seconds", "duration", "time_in_secs"])
            .and_then(as_number)
            .filter(|d| *d > 0.0),
        position,
        category,
        embedded_power,
    })
}

/// Event type from the upstream type tag, falling back to the section the
/// event came from, then to category and finishing position
pub fn classify_event(
    raw_type: Option<&str>,
    category: Option<&str>,
    position: Option<u32>,
    implied: Option<EventType>,
) -> EventType {
    if let Some(raw) = raw_type {
        let upper = raw.trim().to_uppercase();
        if upper.contains("TYPE_RACE") || upper == "RACE" {
            return EventType::Race;
        }
        if upper.contains("TYPE_RIDE") || upper == "GROUP_RIDE" || upper == "RIDE" {
            return EventType::GroupRide;
        }
        if upper.contains("TYPE_WORKOUT") || upper == "WORKOUT" {
            return EventType::Workout;
        }
    }

    if let Some(event_type) = implied {
        return event_type;
    }

    let racing_category = category
        .map(|c| matches!(c.trim().to_uppercase().as_str(), "A" | "B" | "C" | "D"))
        .unwrap_or(false);

    if racing_category && position.unwrap_or(0) > 0 {
        EventType::Race
    } else {
        EventType::GroupRide
    }
}

fn first_of<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find(|v| !v.is_null())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Array(items) => items.first().and_then(as_number),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.first().and_then(as_text),
        _ => None,
    }
}
