//! Power-duration curve analysis
//!
//! Derives profile-level statistics from a rider's power profile: power
//! ratios between canonical durations, a two-parameter Critical Power model,
//! energy-system decay rates and a few summary values (estimated FTP, peak
//! power, power-to-weight).
//!
//! Every function degrades to `None` on sparse data. A rider with a short or
//! patchy profile simply has no ratios; that is not an error.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::PowerSample;

/// Profiles shorter than this are too sparse for meaningful ratios
pub const MIN_PROFILE_SAMPLES: usize = 50;

/// Durations sampled for the Critical Power fit
pub const CP_SAMPLE_DURATIONS: [u32; 8] = [180, 300, 600, 900, 1200, 1800, 2400, 3600];

/// Minimum usable points for the Critical Power fit
pub const MIN_CP_POINTS: usize = 4;

/// PCr depletion half-life in seconds
pub const NEUROMUSCULAR_HALF_LIFE_SECS: u32 = 10;

/// Glycolytic depletion half-life in seconds
pub const ANAEROBIC_HALF_LIFE_SECS: u32 = 45;

/// Ratio between the power at two durations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerRatio {
    /// Ratio rounded to two decimals
    pub value: Decimal,
    pub numerator_secs: u32,
    pub denominator_secs: u32,
}

/// How well power holds between neighbouring durations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sustainability {
    /// 1min : 5min
    pub short_to_medium: Decimal,
    /// 5min : 20min
    pub medium_to_long: Decimal,
}

/// Power ratios against 20-minute power
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerRatios {
    /// 15s : 20min
    pub sprint_ratio: PowerRatio,
    /// 1min : 20min
    pub anaerobic_ratio: PowerRatio,
    /// 5min : 20min
    pub vo2max_ratio: PowerRatio,
    pub sustainability: Sustainability,
    /// 60min : 20min, only when the profile reaches an hour
    pub endurance_ratio: Option<PowerRatio>,
}

/// Fitted two-parameter Critical Power model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPowerModel {
    /// Critical Power in watts
    pub critical_power: u32,
    /// W' in joules
    pub w_prime: u32,
    /// Goodness of fit, clamped to [0, 1]
    pub r_squared: Decimal,
    /// Durations that contributed to the fit
    pub durations_used: Vec<u32>,
}

/// A single energy-system metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayMetric {
    /// Percentage, one decimal
    pub value: Decimal,
    /// Informational depletion half-life
    pub half_life_secs: Option<u32>,
}

/// Energy-system decay rates; a metric is absent when its inputs are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayRates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neuromuscular: Option<DecayMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anaerobic: Option<DecayMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aerobic_sustainability: Option<DecayMetric>,
}

impl DecayRates {
    pub fn is_empty(&self) -> bool {
        self.neuromuscular.is_none()
            && self.anaerobic.is_none()
            && self.aerobic_sustainability.is_none()
    }
}

/// Source duration used for an FTP estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FtpMethod {
    TwentyMinute,
    SixtyMinute,
}

/// FTP estimated from the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtpEstimate {
    pub ftp: u32,
    pub method: FtpMethod,
}

/// Highest power anywhere on the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakPower {
    pub power: f64,
    pub duration: u32,
}

/// Power at a duration: the exact sample if present, otherwise a linear
/// interpolation between the nearest samples below and above.
///
/// Returns `None` when the target lies outside the observed range.
pub fn find_power_at_duration(profile: &[PowerSample], target: u32) -> Option<f64> {
    let mut sorted: Vec<&PowerSample> = profile.iter().collect();
    sorted.sort_by_key(|s| s.duration);

    if let Some(exact) = sorted.iter().find(|s| s.duration == target) {
        return Some(exact.power);
    }

    let lower = sorted.iter().rev().find(|s| s.duration < target)?;
    let upper = sorted.iter().find(|s| s.duration > target)?;

    let span = f64::from(upper.duration - lower.duration);
    let offset = f64::from(target - lower.duration);
    Some(lower.power + (upper.power - lower.power) * offset / span)
}

/// Power ratios against 20-minute power
pub fn calculate_power_ratios(profile: &[PowerSample]) -> Option<PowerRatios> {
    calculate_power_ratios_with_min(profile, MIN_PROFILE_SAMPLES)
}

/// Power ratios with an explicit sparsity threshold
pub fn calculate_power_ratios_with_min(
    profile: &[PowerSample],
    min_samples: usize,
) -> Option<PowerRatios> {
    if profile.len() < min_samples {
        debug!(
            samples = profile.len(),
            required = min_samples,
            "Profile too sparse for power ratios"
        );
        return None;
    }

    let p15 = find_power_at_duration(profile, 15)?;
    let p60 = find_power_at_duration(profile, 60)?;
    let p300 = find_power_at_duration(profile, 300)?;
    let p1200 = find_power_at_duration(profile, 1200)?;
    let p3600 = find_power_at_duration(profile, 3600);

    let ratio = |numerator: f64, num_secs: u32, denominator: f64, den_secs: u32| {
        ratio_value(numerator, denominator).map(|value| PowerRatio {
            value,
            numerator_secs: num_secs,
            denominator_secs: den_secs,
        })
    };

    Some(PowerRatios {
        sprint_ratio: ratio(p15, 15, p1200, 1200)?,
        anaerobic_ratio: ratio(p60, 60, p1200, 1200)?,
        vo2max_ratio: ratio(p300, 300, p1200, 1200)?,
        sustainability: Sustainability {
            short_to_medium: ratio_value(p60, p300)?,
            medium_to_long: ratio_value(p300, p1200)?,
        },
        endurance_ratio: p3600.and_then(|p| ratio(p, 3600, p1200, 1200)),
    })
}

/// Fit the Monod-Scherrer model `P(t) = CP + W'/t`
///
/// Ordinary least squares of power against `1/t` over the candidate
/// durations that resolve to a positive power: the slope is W', the
/// intercept is CP.
pub fn calculate_critical_power(profile: &[PowerSample]) -> Option<CriticalPowerModel> {
    let points: Vec<(u32, f64)> = CP_SAMPLE_DURATIONS
        .iter()
        .filter_map(|&t| {
            find_power_at_duration(profile, t)
                .filter(|p| *p > 0.0)
                .map(|p| (t, p))
        })
        .collect();

    if points.len() < MIN_CP_POINTS {
        debug!(points = points.len(), "Not enough durations for CP fit");
        return None;
    }

    let n = points.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;

    for &(t, p) in &points {
        let x = 1.0 / f64::from(t);
        sum_x += x;
        sum_y += p;
        sum_xx += x * x;
        sum_xy += x * p;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return None;
    }

    let w_prime = (n * sum_xy - sum_x * sum_y) / denominator;
    let cp = (sum_y - w_prime * sum_x) / n;

    let mean_y = sum_y / n;
    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;

    for &(t, p) in &points {
        let predicted = cp + w_prime / f64::from(t);
        ss_tot += (p - mean_y).powi(2);
        ss_res += (p - predicted).powi(2);
    }

    let r_squared = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).max(0.0)
    } else if ss_res < 1e-9 {
        1.0
    } else {
        0.0
    };

    if cp <= 0.0 || w_prime < 0.0 {
        debug!(cp, w_prime, "CP fit outside physiological range");
        return None;
    }

    Some(CriticalPowerModel {
        critical_power: cp.round() as u32,
        w_prime: w_prime.round() as u32,
        r_squared: round_to(r_squared, 3)?,
        durations_used: points.iter().map(|&(t, _)| t).collect(),
    })
}

/// Neuromuscular, anaerobic and aerobic decay metrics
pub fn calculate_power_decay_rates(profile: &[PowerSample]) -> DecayRates {
    let p1 = find_power_at_duration(profile, 1);
    let p15 = find_power_at_duration(profile, 15);
    let p120 = find_power_at_duration(profile, 120);
    let p300 = find_power_at_duration(profile, 300);
    let p1200 = find_power_at_duration(profile, 1200);

    let decay = |short: Option<f64>, long: Option<f64>| match (short, long) {
        (Some(s), Some(l)) if s > 0.0 => round_to((s - l) / s * 100.0, 1),
        _ => None,
    };

    DecayRates {
        neuromuscular: decay(p1, p15).map(|value| DecayMetric {
            value,
            half_life_secs: Some(NEUROMUSCULAR_HALF_LIFE_SECS),
        }),
        anaerobic: decay(p15, p120).map(|value| DecayMetric {
            value,
            half_life_secs: Some(ANAEROBIC_HALF_LIFE_SECS),
        }),
        aerobic_sustainability: match (p300, p1200) {
            (Some(p5), Some(p20)) if p5 > 0.0 => {
                round_to(p20 / p5 * 100.0, 1).map(|value| DecayMetric {
                    value,
                    half_life_secs: None,
                })
            }
            _ => None,
        },
    }
}

/// FTP as 95% of 20-minute power, falling back to 105% of 60-minute power
pub fn estimate_ftp(profile: &[PowerSample]) -> Option<FtpEstimate> {
    if let Some(p20) = find_power_at_duration(profile, 1200).filter(|p| *p > 0.0) {
        return Some(FtpEstimate {
            ftp: (p20 * 0.95).round() as u32,
            method: FtpMethod::TwentyMinute,
        });
    }

    find_power_at_duration(profile, 3600)
        .filter(|p| *p > 0.0)
        .map(|p60| FtpEstimate {
            ftp: (p60 * 1.05).round() as u32,
            method: FtpMethod::SixtyMinute,
        })
}

/// Highest sample on the profile; the shortest duration wins a tie
pub fn peak_power(profile: &[PowerSample]) -> Option<PeakPower> {
    profile
        .iter()
        .filter(|s| s.power.is_finite())
        .fold(None::<&PowerSample>, |best, s| match best {
            Some(b) if b.power > s.power || (b.power == s.power && b.duration <= s.duration) => {
                Some(b)
            }
            _ => Some(s),
        })
        .map(|s| PeakPower {
            power: s.power,
            duration: s.duration,
        })
}

/// Watts per kilogram rounded to two decimals
pub fn power_to_weight(watts: f64, weight_kg: f64) -> Option<Decimal> {
    if weight_kg <= 0.0 || watts < 0.0 {
        return None;
    }
    round_to(watts / weight_kg, 2)
}

fn ratio_value(numerator: f64, denominator: f64) -> Option<Decimal> {
    if denominator <= 0.0 {
        return None;
    }
    round_to(numerator / denominator, 2)
}

/// Round half away from zero to `dp` decimals
pub(crate) fn round_to(value: f64, dp: u32) -> Option<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
}
