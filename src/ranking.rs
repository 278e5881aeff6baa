//! Top-3 medal ranking per duration

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{Ranking, RankingMap, ReconciledEventPower, WindowFilter};

/// Number of medal positions per duration
pub const MEDAL_POSITIONS: usize = 3;

/// Rank achieved event powers within a lookback window
///
/// Only achieved provenances compete. Equal powers go to the earlier event,
/// then to the earlier position in the event list. Output is ordered by
/// duration, then rank.
pub fn rank(
    reconciled: &[ReconciledEventPower],
    window: WindowFilter,
    as_of: NaiveDate,
) -> Vec<Ranking> {
    let mut by_duration: BTreeMap<u32, Vec<(&ReconciledEventPower, f64)>> = BTreeMap::new();

    for entry in reconciled {
        if !entry.source.is_achieved() || !window.contains(entry.event_date, as_of) {
            continue;
        }
        if let Some(power) = entry.power {
            by_duration.entry(entry.duration).or_default().push((entry, power));
        }
    }

    let mut rankings = Vec::new();
    for (duration, mut candidates) in by_duration {
        candidates.sort_by(|(a, pa), (b, pb)| {
            pb.total_cmp(pa)
                .then_with(|| a.event_date.cmp(&b.event_date))
                .then_with(|| a.event_index.cmp(&b.event_index))
        });

        rankings.extend(
            candidates
                .into_iter()
                .take(MEDAL_POSITIONS)
                .enumerate()
                .map(|(position, (entry, _))| Ranking {
                    duration,
                    event_id: entry.event_id.clone(),
                    event_index: entry.event_index,
                    rank: (position + 1) as u8,
                }),
        );
    }

    debug!(window = %window, medals = rankings.len(), "Ranked event powers");
    rankings
}

/// Index rankings as duration -> event index -> rank
pub fn ranking_map(rankings: &[Ranking]) -> RankingMap {
    let mut map = RankingMap::new();
    for ranking in rankings {
        map.entry(ranking.duration)
            .or_default()
            .insert(ranking.event_index, ranking.rank);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PowerSource;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(
        index: usize,
        on: NaiveDate,
        duration: u32,
        power: Option<f64>,
        source: PowerSource,
    ) -> ReconciledEventPower {
        ReconciledEventPower {
            event_id: format!("evt-{}", index),
            event_index: index,
            event_date: on,
            duration,
            power,
            source,
        }
    }

    #[test]
    fn test_estimated_never_ranked() {
        let as_of = date(2024, 10, 1);
        let reconciled = vec![
            entry(0, date(2024, 9, 1), 300, Some(400.0), PowerSource::Estimated),
            entry(1, date(2024, 9, 2), 300, Some(300.0), PowerSource::ExactRecent),
            entry(2, date(2024, 9, 3), 300, None, PowerSource::None),
        ];

        let rankings = rank(&reconciled, WindowFilter::All, as_of);
        assert_eq!(rankings.len(), 1);
        assert_eq!(rankings[0].event_index, 1);
        assert_eq!(rankings[0].rank, 1);
    }

    #[test]
    fn test_tie_goes_to_earlier_event() {
        let as_of = date(2024, 10, 1);
        let reconciled = vec![
            entry(1, date(2024, 9, 5), 60, Some(500.0), PowerSource::EventRecord),
            entry(0, date(2024, 9, 1), 60, Some(500.0), PowerSource::ExactSeason),
            entry(2, date(2024, 9, 5), 60, Some(500.0), PowerSource::EventRecord),
        ];

        let rankings = rank(&reconciled, WindowFilter::All, as_of);
        let order: Vec<usize> = rankings.iter().map(|r| r.event_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_top_three_only() {
        let as_of = date(2024, 10, 1);
        let reconciled: Vec<_> = (0..5)
            .map(|i| {
                entry(i, date(2024, 9, 1 + i as u32), 5, Some(800.0 + i as f64), PowerSource::EventRecord)
            })
            .collect();

        let rankings = rank(&reconciled, WindowFilter::All, as_of);
        assert_eq!(rankings.len(), 3);
        assert_eq!(rankings[0].event_index, 4);
        assert_eq!(rankings[2].rank, 3);
    }

    #[test]
    fn test_window_filter() {
        let as_of = date(2024, 10, 1);
        let reconciled = vec![
            entry(0, date(2024, 5, 1), 300, Some(400.0), PowerSource::ExactRecent),
            entry(1, date(2024, 9, 20), 300, Some(300.0), PowerSource::ExactRecent),
            // Future events count as zero days ago
            entry(2, date(2024, 10, 5), 300, Some(310.0), PowerSource::EventRecord),
        ];

        let rankings = rank(&reconciled, WindowFilter::DaysAgo(30), as_of);
        let map = ranking_map(&rankings);

        assert_eq!(map[&300].get(&2), Some(&1));
        assert_eq!(map[&300].get(&1), Some(&2));
        assert!(map[&300].get(&0).is_none());

        let unbounded = rank(&reconciled, WindowFilter::DaysAgo(0), as_of);
        assert_eq!(unbounded[0].event_index, 0);
    }
}
