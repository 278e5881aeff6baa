use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durations (seconds) for which peak power is tracked on events and snapshots
pub const CANONICAL_DURATIONS: [u32; 6] = [5, 15, 60, 300, 1200, 3600];

/// One point of a rider's power-duration profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    /// Effort length in seconds
    pub duration: u32,

    /// Best power for this duration in watts
    pub power: f64,

    /// Best power within the recent period, if known
    pub recent_power: Option<f64>,

    /// Best power within the season, if known
    pub season_power: Option<f64>,

    /// Date the best power was achieved
    pub achieved_date: Option<NaiveDate>,
}

impl PowerSample {
    pub fn new(duration: u32, power: f64) -> Self {
        Self {
            duration,
            power,
            recent_power: None,
            season_power: None,
            achieved_date: None,
        }
    }
}

/// A single best-effort record and the calendar day it was achieved on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    /// Peak power in watts
    pub power: f64,

    /// Day the peak was achieved (time of day is discarded on ingestion)
    pub achieved: Option<NaiveDate>,
}

/// Season, recent and last-event bests for one duration
///
/// The three records are independent candidate maxima: a recent best may
/// exceed the season best when it is the new best.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerIntervalSnapshot {
    pub season: Option<PeakRecord>,
    pub recent: Option<PeakRecord>,
    pub last_event: Option<PeakRecord>,
}

impl PowerIntervalSnapshot {
    /// Recent peak power regardless of when it was achieved
    pub fn peak_recent(&self) -> Option<f64> {
        self.recent.map(|r| r.power)
    }
}

/// Snapshots keyed by duration in seconds
pub type SnapshotMap = BTreeMap<u32, PowerIntervalSnapshot>;

/// Event categories as separated by the upstream platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Race,
    GroupRide,
    Workout,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Race => write!(f, "race"),
            EventType::GroupRide => write!(f, "group_ride"),
            EventType::Workout => write!(f, "workout"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "race" | "races" => Ok(EventType::Race),
            "group_ride" | "group_rides" | "ride" => Ok(EventType::GroupRide),
            "workout" | "workouts" => Ok(EventType::Workout),
            _ => Err(format!("Invalid event type: {}", s)),
        }
    }
}

/// A discrete ride the rider took part in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Upstream identifier, or a generated one when the payload has none
    pub id: String,

    /// Position in the date-ordered event list
    pub index: usize,

    /// Calendar day of the event
    pub event_date: NaiveDate,

    pub event_type: EventType,

    pub title: Option<String>,

    /// Average power over the whole event in watts
    pub avg_power: Option<f64>,

    pub duration_seconds: Option<f64>,

    /// Finishing position
    pub position: Option<u32>,

    /// Race category (A-E)
    pub category: Option<String>,

    /// Peak powers recorded by the event itself, keyed by duration
    pub embedded_power: BTreeMap<u32, f64>,
}

/// How a reconciled power value was obtained
///
/// Variants are listed from most to least trusted. Only the achieved
/// variants may ever carry a personal-best or medal label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    /// Peak recorded on the event itself
    EventRecord,
    /// Last-event best achieved on the event day
    ExactLastEvent,
    /// Recent best achieved on the event day
    ExactRecent,
    /// Season best achieved on the event day
    ExactSeason,
    /// Scaled from average power and the recent best
    Estimated,
    /// No value could be assigned
    None,
}

impl PowerSource {
    /// Whether the value was actually achieved on the event day
    pub fn is_achieved(&self) -> bool {
        matches!(
            self,
            PowerSource::EventRecord
                | PowerSource::ExactLastEvent
                | PowerSource::ExactRecent
                | PowerSource::ExactSeason
        )
    }
}

impl std::fmt::Display for PowerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerSource::EventRecord => write!(f, "event"),
            PowerSource::ExactLastEvent => write!(f, "last event"),
            PowerSource::ExactRecent => write!(f, "recent"),
            PowerSource::ExactSeason => write!(f, "season"),
            PowerSource::Estimated => write!(f, "estimated"),
            PowerSource::None => write!(f, "-"),
        }
    }
}

/// Power assigned to one event for one duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledEventPower {
    pub event_id: String,
    pub event_index: usize,
    pub event_date: NaiveDate,
    pub duration: u32,
    pub power: Option<f64>,
    pub source: PowerSource,
}

/// Top-3 placement of an event for one duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    pub duration: u32,
    pub event_id: String,
    pub event_index: usize,
    /// 1, 2 or 3
    pub rank: u8,
}

/// duration -> event index -> rank
pub type RankingMap = BTreeMap<u32, BTreeMap<usize, u8>>;

/// Lookback window applied before ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFilter {
    All,
    DaysAgo(u32),
}

impl WindowFilter {
    /// Whether an event on `event_date` falls inside the window as seen from `as_of`
    ///
    /// Future-dated events count as zero days ago. `DaysAgo(0)` is unbounded.
    pub fn contains(&self, event_date: NaiveDate, as_of: NaiveDate) -> bool {
        match self {
            WindowFilter::All | WindowFilter::DaysAgo(0) => true,
            WindowFilter::DaysAgo(days) => {
                let days_ago = (as_of - event_date).num_days().max(0);
                days_ago <= i64::from(*days)
            }
        }
    }
}

impl Default for WindowFilter {
    fn default() -> Self {
        WindowFilter::All
    }
}

impl std::fmt::Display for WindowFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowFilter::All | WindowFilter::DaysAgo(0) => write!(f, "all time"),
            WindowFilter::DaysAgo(days) => write!(f, "last {} days", days),
        }
    }
}

impl std::str::FromStr for WindowFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "0" => Ok(WindowFilter::All),
            other => other
                .trim_end_matches('d')
                .parse::<u32>()
                .map(WindowFilter::DaysAgo)
                .map_err(|_| format!("Invalid window: {}", s)),
        }
    }
}
