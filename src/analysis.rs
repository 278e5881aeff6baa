//! Rider analysis pipeline
//!
//! Runs the curve statistics, event reconciliation, ranking and focus stages
//! over one payload and collects the results into a serialisable
//! [`RiderAnalysis`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span};

use crate::cache::{AnalysisCache, CacheKey};
use crate::config::EngineConfig;
use crate::curve::{
    calculate_critical_power, calculate_power_decay_rates, calculate_power_ratios_with_min,
    estimate_ftp, find_power_at_duration, peak_power, power_to_weight, CriticalPowerModel,
    DecayRates, FtpEstimate, PeakPower, PowerRatios,
};
use crate::focus::{
    generate_objective_training_focus, generate_power_insights, profile_strengths, FocusArea,
    PowerInsight,
};
use crate::models::{
    Event, EventType, PeakRecord, PowerSource, Ranking, RankingMap, ReconciledEventPower,
    WindowFilter,
};
use crate::payload::RiderPayload;
use crate::ranking::{rank, ranking_map};
use crate::reconcile::reconcile;
use crate::zones::{calculate_training_zones, TrainingZone};

/// What to analyse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Restrict events to one type; all events when `None`
    pub event_type: Option<EventType>,
    pub window: WindowFilter,
    /// Reference day for the window and inactivity checks
    pub as_of: NaiveDate,
}

impl AnalysisRequest {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            event_type: None,
            window: WindowFilter::All,
            as_of,
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_window(mut self, window: WindowFilter) -> Self {
        self.window = window;
        self
    }
}

/// Where the FTP used for zones came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtpSource {
    Payload,
    Estimated,
}

/// Snapshot records and profile power for one tracked duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    pub duration: u32,
    pub season_best: Option<PeakRecord>,
    pub recent_best: Option<PeakRecord>,
    pub last_event_best: Option<PeakRecord>,
    /// Power read off the profile curve
    pub profile_power: Option<f64>,
    pub watts_per_kg: Option<Decimal>,
}

/// Reconciled power for one duration of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPower {
    pub power: Option<f64>,
    pub source: PowerSource,
    /// Matches or beats the season best; only ever set for achieved values
    pub is_personal_best: bool,
    /// Medal position within the requested window
    pub rank: Option<u8>,
}

/// An event joined with its reconciled powers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub powers: BTreeMap<u32, EventPower>,
}

/// Complete analysis of one rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderAnalysis {
    pub rider_id: String,
    pub name: Option<String>,
    pub as_of: NaiveDate,
    pub event_type: Option<EventType>,
    pub window: WindowFilter,
    /// No event within the configured inactivity period
    pub inactive: bool,
    pub weight_kg: Option<f64>,
    /// FTP used for training zones
    pub ftp: Option<f64>,
    pub ftp_source: Option<FtpSource>,
    pub ftp_estimate: Option<FtpEstimate>,
    pub peak_power: Option<PeakPower>,
    pub power_ratios: Option<PowerRatios>,
    pub critical_power: Option<CriticalPowerModel>,
    pub decay_rates: DecayRates,
    pub training_zones: Option<Vec<TrainingZone>>,
    pub focus_areas: Vec<FocusArea>,
    pub insights: Vec<PowerInsight>,
    pub profile_strengths: Vec<String>,
    pub durations: Vec<DurationSummary>,
    pub events: Vec<AugmentedEvent>,
    pub rankings: Vec<Ranking>,
    pub ranking_map: RankingMap,
}

/// Analysis entry point
///
/// Holds the engine configuration and, optionally, a shared cache.
#[derive(Debug, Clone, Default)]
pub struct PowerProfileAnalyzer {
    config: EngineConfig,
    cache: Option<Arc<AnalysisCache>>,
}

impl PowerProfileAnalyzer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    /// Build an analyzer from configuration, attaching a fresh cache when
    /// `cache.enabled` is set
    pub fn from_config(config: EngineConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(AnalysisCache::from_settings(&config.cache)));
        Self { config, cache }
    }

    pub fn with_cache(mut self, cache: Arc<AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<AnalysisCache>> {
        self.cache.as_ref()
    }

    /// Analyse a payload, serving from the cache when one is attached
    pub fn analyze(&self, payload: &RiderPayload, request: &AnalysisRequest) -> Arc<RiderAnalysis> {
        let Some(cache) = &self.cache else {
            return Arc::new(self.compute(payload, request));
        };

        let key = CacheKey {
            rider_id: payload.rider_id.clone(),
            event_type: request.event_type,
            window: request.window,
            as_of: request.as_of,
        };

        if let Some(cached) = cache.get(&key) {
            return cached;
        }
        cache.insert(key, self.compute(payload, request))
    }

    /// Analyse a payload without touching the cache
    pub fn compute(&self, payload: &RiderPayload, request: &AnalysisRequest) -> RiderAnalysis {
        let span = info_span!("analyze", rider_id = %payload.rider_id);
        let _guard = span.enter();

        let profile = &payload.profile;

        let power_ratios =
            calculate_power_ratios_with_min(profile, self.config.analysis.min_profile_samples);
        let critical_power = calculate_critical_power(profile);
        let decay_rates = calculate_power_decay_rates(profile);
        let ftp_estimate = estimate_ftp(profile);

        let (ftp, ftp_source) = match (payload.ftp, &ftp_estimate) {
            (Some(ftp), _) => (Some(ftp), Some(FtpSource::Payload)),
            (None, Some(estimate)) => (Some(f64::from(estimate.ftp)), Some(FtpSource::Estimated)),
            (None, None) => (None, None),
        };
        let training_zones = ftp.and_then(calculate_training_zones);

        let focus_areas = generate_objective_training_focus(
            profile,
            &decay_rates,
            critical_power.as_ref(),
            &self.config.focus,
        );
        let insights = generate_power_insights(
            power_ratios.as_ref(),
            &decay_rates,
            critical_power.as_ref(),
            &self.config.insights,
        );
        let strengths = payload
            .weight_kg
            .map(|kg| profile_strengths(profile, kg))
            .unwrap_or_default();

        let events = payload.events_of_type(request.event_type);
        let reconciled = reconcile(&events, &payload.snapshots, &self.config.estimation);
        let rankings = rank(&reconciled, request.window, request.as_of);
        let medals = ranking_map(&rankings);

        let durations = self.summarize_durations(payload);
        let augmented = augment_events(events, &reconciled, &medals, payload);

        debug!(
            ratios = power_ratios.is_some(),
            cp = critical_power.is_some(),
            focus_areas = focus_areas.len(),
            insights = insights.len(),
            "Profile statistics computed"
        );
        info!(
            events = augmented.len(),
            medals = rankings.len(),
            "Rider analysis complete"
        );

        RiderAnalysis {
            rider_id: payload.rider_id.clone(),
            name: payload.name.clone(),
            as_of: request.as_of,
            event_type: request.event_type,
            window: request.window,
            inactive: payload.is_inactive(request.as_of, self.config.analysis.inactivity_days),
            weight_kg: payload.weight_kg,
            ftp,
            ftp_source,
            ftp_estimate,
            peak_power: peak_power(profile),
            power_ratios,
            critical_power,
            decay_rates,
            training_zones,
            focus_areas,
            insights,
            profile_strengths: strengths,
            durations,
            events: augmented,
            rankings,
            ranking_map: medals,
        }
    }

    fn summarize_durations(&self, payload: &RiderPayload) -> Vec<DurationSummary> {
        payload
            .snapshots
            .iter()
            .map(|(&duration, snapshot)| {
                let profile_power = find_power_at_duration(&payload.profile, duration);
                DurationSummary {
                    duration,
                    season_best: snapshot.season,
                    recent_best: snapshot.recent,
                    last_event_best: snapshot.last_event,
                    profile_power,
                    watts_per_kg: profile_power
                        .zip(payload.weight_kg)
                        .and_then(|(watts, kg)| power_to_weight(watts, kg)),
                }
            })
            .collect()
    }
}

fn augment_events(
    events: Vec<Event>,
    reconciled: &[ReconciledEventPower],
    medals: &RankingMap,
    payload: &RiderPayload,
) -> Vec<AugmentedEvent> {
    let mut by_event: BTreeMap<usize, BTreeMap<u32, EventPower>> = BTreeMap::new();

    for entry in reconciled {
        let season_best = payload
            .snapshots
            .get(&entry.duration)
            .and_then(|s| s.season)
            .map(|r| r.power);

        let is_personal_best = entry.source.is_achieved()
            && matches!((entry.power, season_best), (Some(p), Some(best)) if p >= best);

        by_event.entry(entry.event_index).or_default().insert(
            entry.duration,
            EventPower {
                power: entry.power,
                source: entry.source,
                is_personal_best,
                rank: medals
                    .get(&entry.duration)
                    .and_then(|m| m.get(&entry.event_index))
                    .copied(),
            },
        );
    }

    events
        .into_iter()
        .map(|event| {
            let powers = by_event.remove(&event.index).unwrap_or_default();
            AugmentedEvent { event, powers }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payload() -> RiderPayload {
        RiderPayload::from_value(&json!({
            "rider_id": "1001",
            "name": "Test Rider",
            "weight": 70,
            "profile": [
                {"duration": 15, "power": 750},
                {"duration": 60, "power": 500},
                {"duration": 300, "power": 350},
                {"duration": 1200, "power": 300}
            ],
            "power": {
                "time_300": {
                    "peak_season": 320, "date_season": "2024-06-01",
                    "peak_recent": 330, "date_recent": "2024-09-10"
                }
            },
            "events": [
                {"id": "r1", "event_date": "2024-09-10", "event_type": "TYPE_RACE"},
                {"id": "w1", "event_date": "2024-10-01", "avg_power": 280, "event_type": "TYPE_WORKOUT"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_pipeline_joins_events_and_medals() {
        let analysis =
            PowerProfileAnalyzer::default().compute(&payload(), &AnalysisRequest::new(date(2024, 10, 2)));

        assert_eq!(analysis.events.len(), 2);
        let race = &analysis.events[0].powers[&300];
        assert_eq!(race.source, PowerSource::ExactRecent);
        assert!(race.is_personal_best);
        assert_eq!(race.rank, Some(1));

        let workout = &analysis.events[1].powers[&300];
        assert_eq!(workout.source, PowerSource::Estimated);
        assert!(!workout.is_personal_best);
        assert_eq!(workout.rank, None);

        assert_eq!(analysis.ranking_map[&300].get(&0), Some(&1));
        // 4 samples is far below the ratio threshold
        assert!(analysis.power_ratios.is_none());
        assert_eq!(analysis.ftp_source, Some(FtpSource::Estimated));
        assert_eq!(analysis.ftp, Some(285.0));
        assert_eq!(analysis.training_zones.as_ref().map(|z| z.len()), Some(7));
        assert!(!analysis.inactive);
    }

    #[test]
    fn test_event_type_filter_reindexes() {
        let request = AnalysisRequest::new(date(2024, 10, 2)).with_event_type(EventType::Workout);
        let analysis = PowerProfileAnalyzer::default().compute(&payload(), &request);

        assert_eq!(analysis.events.len(), 1);
        assert_eq!(analysis.events[0].event.id, "w1");
        assert_eq!(analysis.events[0].event.index, 0);
        assert!(analysis.rankings.is_empty());
    }

    #[test]
    fn test_cached_analysis_is_shared() {
        let cache = Arc::new(AnalysisCache::new(std::time::Duration::from_secs(60), 8));
        let analyzer = PowerProfileAnalyzer::default().with_cache(Arc::clone(&cache));
        let request = AnalysisRequest::new(date(2024, 10, 2));

        let first = analyzer.analyze(&payload(), &request);
        let second = analyzer.analyze(&payload(), &request);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.metrics().cache_hits, 1);
    }

    #[test]
    fn test_from_config_honours_cache_switch() {
        let request = AnalysisRequest::new(date(2024, 10, 2));

        let mut config = EngineConfig::default();
        config.cache.capacity = 32;
        let cached = PowerProfileAnalyzer::from_config(config.clone());
        let cache = cached.cache().unwrap();
        assert_eq!(cache.capacity(), 32);

        cached.analyze(&payload(), &request);
        cached.analyze(&payload(), &request);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.metrics().cache_hits, 1);

        config.cache.enabled = false;
        let uncached = PowerProfileAnalyzer::from_config(config);
        assert!(uncached.cache().is_none());
        let first = uncached.analyze(&payload(), &request);
        let second = uncached.analyze(&payload(), &request);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_analysis_serializes() {
        let analysis =
            PowerProfileAnalyzer::default().compute(&payload(), &AnalysisRequest::new(date(2024, 10, 2)));
        let value = serde_json::to_value(&analysis).unwrap();

        assert_eq!(value["rider_id"], "1001");
        assert_eq!(value["events"][0]["id"], "r1");
        assert_eq!(value["ranking_map"]["300"]["0"], 1);
    }
}
