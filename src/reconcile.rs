//! Event-power reconciliation
//!
//! Assigns each event a power value and provenance for every tracked
//! duration. The snapshot records are only ever matched by calendar day: a
//! season best from another day is never attributed to an event.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::EstimationSettings;
use crate::models::{Event, PowerIntervalSnapshot, PowerSource, ReconciledEventPower, SnapshotMap};

/// Reconcile every event against the snapshot map
///
/// Durations covered are the snapshot keys plus any duration embedded in an
/// event. Output is grouped by event (in event order), durations ascending.
pub fn reconcile(
    events: &[Event],
    snapshots: &SnapshotMap,
    settings: &EstimationSettings,
) -> Vec<ReconciledEventPower> {
    let durations: BTreeSet<u32> = snapshots
        .keys()
        .copied()
        .chain(events.iter().flat_map(|e| e.embedded_power.keys().copied()))
        .collect();

    let mut reconciled = Vec::with_capacity(events.len() * durations.len());
    for event in events {
        for &duration in &durations {
            let (power, source) =
                reconcile_event(event, duration, snapshots.get(&duration), settings);
            reconciled.push(ReconciledEventPower {
                event_id: event.id.clone(),
                event_index: event.index,
                event_date: event.event_date,
                duration,
                power,
                source,
            });
        }
    }

    let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
    for entry in &reconciled {
        *by_source.entry(entry.source.to_string()).or_default() += 1;
    }
    debug!(
        events = events.len(),
        durations = durations.len(),
        sources = ?by_source,
        "Reconciled event powers"
    );

    reconciled
}

/// Power and provenance for one event at one duration
pub fn reconcile_event(
    event: &Event,
    duration: u32,
    snapshot: Option<&PowerIntervalSnapshot>,
    settings: &EstimationSettings,
) -> (Option<f64>, PowerSource) {
    if let Some(&power) = event.embedded_power.get(&duration).filter(|p| **p > 0.0) {
        return (Some(power), PowerSource::EventRecord);
    }

    let Some(snapshot) = snapshot else {
        return (None, PowerSource::None);
    };

    // Same-day collisions resolve last event, then recent, then season
    let exact = [
        (snapshot.last_event, PowerSource::ExactLastEvent),
        (snapshot.recent, PowerSource::ExactRecent),
        (snapshot.season, PowerSource::ExactSeason),
    ]
    .into_iter()
    .find_map(|(record, source)| {
        record
            .filter(|r| r.achieved == Some(event.event_date) && r.power > 0.0)
            .map(|r| (Some(r.power), source))
    });
    if let Some(matched) = exact {
        return matched;
    }

    match (event.avg_power, snapshot.peak_recent()) {
        (Some(avg_power), Some(peak_recent)) => {
            match estimate_event_power(peak_recent, avg_power, duration, settings) {
                Some(estimate) => (Some(estimate), PowerSource::Estimated),
                None => (None, PowerSource::None),
            }
        }
        _ => (None, PowerSource::None),
    }
}

/// Scale the recent best by the event's relative intensity
///
/// The raw estimate is bounded below by a multiple of the event average and
/// above by a multiple of the recent best, then rounded to the nearest watt.
/// When the bounds cross, the upper bound wins.
pub fn estimate_event_power(
    peak_recent: f64,
    avg_power: f64,
    duration: u32,
    settings: &EstimationSettings,
) -> Option<f64> {
    if peak_recent <= 0.0 || avg_power <= 0.0 || settings.reference_avg_power <= 0.0 {
        return None;
    }

    let raw = peak_recent * (avg_power / settings.reference_avg_power)
        * settings.factor_for(duration);
    let lower = settings.min_avg_power_multiple * avg_power;
    let upper = settings.max_recent_peak_multiple * peak_recent;

    let estimate = raw.max(lower).min(upper).round();
    (estimate.is_finite() && estimate > 0.0).then_some(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, PeakRecord};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(index: usize, on: NaiveDate, avg_power: Option<f64>) -> Event {
        Event {
            id: format!("evt-{}", index),
            index,
            event_date: on,
            event_type: EventType::Race,
            title: None,
            avg_power,
            duration_seconds: None,
            position: None,
            category: None,
            embedded_power: BTreeMap::new(),
        }
    }

    fn five_minute_snapshot() -> SnapshotMap {
        let mut snapshots = SnapshotMap::new();
        snapshots.insert(
            300,
            PowerIntervalSnapshot {
                season: Some(PeakRecord {
                    power: 320.0,
                    achieved: Some(date(2024, 6, 1)),
                }),
                recent: Some(PeakRecord {
                    power: 310.0,
                    achieved: Some(date(2024, 9, 10)),
                }),
                last_event: None,
            },
        );
        snapshots
    }

    #[test]
    fn test_exact_recent_match() {
        let events = vec![event(0, date(2024, 9, 10), None)];
        let result = reconcile(&events, &five_minute_snapshot(), &EstimationSettings::default());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].power, Some(310.0));
        assert_eq!(result[0].source, PowerSource::ExactRecent);
    }

    #[test]
    fn test_estimate_from_average_power() {
        let events = vec![event(0, date(2024, 10, 1), Some(280.0))];
        let result = reconcile(&events, &five_minute_snapshot(), &EstimationSettings::default());

        assert_eq!(result[0].power, Some(284.0));
        assert_eq!(result[0].source, PowerSource::Estimated);
    }

    #[test]
    fn test_no_fabrication_without_average_power() {
        let events = vec![event(0, date(2024, 10, 1), None)];
        let result = reconcile(&events, &five_minute_snapshot(), &EstimationSettings::default());

        assert_eq!(result[0].power, None);
        assert_eq!(result[0].source, PowerSource::None);
    }

    #[test]
    fn test_same_day_priority() {
        let day = date(2024, 9, 10);
        let mut snapshots = SnapshotMap::new();
        snapshots.insert(
            60,
            PowerIntervalSnapshot {
                season: Some(PeakRecord { power: 520.0, achieved: Some(day) }),
                recent: Some(PeakRecord { power: 500.0, achieved: Some(day) }),
                last_event: Some(PeakRecord { power: 480.0, achieved: Some(day) }),
            },
        );

        let result = reconcile(&[event(0, day, None)], &snapshots, &EstimationSettings::default());
        assert_eq!(result[0].source, PowerSource::ExactLastEvent);
        assert_eq!(result[0].power, Some(480.0));
    }

    #[test]
    fn test_embedded_power_wins() {
        let mut with_record = event(0, date(2024, 9, 10), Some(280.0));
        with_record.embedded_power.insert(300, 333.0);
        with_record.embedded_power.insert(5, 900.0);

        let result = reconcile(&[with_record], &five_minute_snapshot(), &EstimationSettings::default());

        // 5s comes only from the event itself
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].duration, 5);
        assert_eq!(result[0].source, PowerSource::EventRecord);
        assert_eq!(result[1].power, Some(333.0));
        assert_eq!(result[1].source, PowerSource::EventRecord);
    }

    #[test]
    fn test_estimate_clamping() {
        let settings = EstimationSettings::default();

        // Very low average: raised to 0.8 x avg
        assert_eq!(estimate_event_power(200.0, 250.0, 300, &settings), Some(200.0));
        // Very high average: capped at 1.1 x recent peak
        assert_eq!(estimate_event_power(300.0, 400.0, 1200, &settings), Some(330.0));
        // Bounds cross: upper wins
        assert_eq!(estimate_event_power(100.0, 200.0, 1200, &settings), Some(110.0));
        assert_eq!(estimate_event_power(0.0, 200.0, 1200, &settings), None);
    }
}
