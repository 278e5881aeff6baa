//! Training focus, insights and profile strengths
//!
//! Turns curve statistics into recommendations. Focus areas are driven by
//! physiological markers (decay, CP gap, VO2max reserve); insights classify the
//! power ratios against fixed cut points.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{FocusSettings, InsightSettings};
use crate::curve::{find_power_at_duration, round_to, CriticalPowerModel, DecayRates, PowerRatios};
use crate::models::PowerSample;

/// Energy system a focus area targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusCategory {
    Neuromuscular,
    Anaerobic,
    Vo2max,
    Threshold,
}

impl fmt::Display for FocusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusCategory::Neuromuscular => write!(f, "Neuromuscular"),
            FocusCategory::Anaerobic => write!(f, "Anaerobic"),
            FocusCategory::Vo2max => write!(f, "VO2max"),
            FocusCategory::Threshold => write!(f, "Threshold"),
        }
    }
}

/// A recommended training focus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusArea {
    pub category: FocusCategory,
    pub title: String,
    /// Observed marker that triggered the recommendation
    pub rationale: String,
    pub protocol: String,
    /// Expected improvement in percent, one decimal
    pub improvement_potential: Decimal,
}

/// A categorical observation about the power profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerInsight {
    pub icon: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    /// Derived from a physiological model rather than a ratio heuristic
    pub scientific: bool,
}

impl PowerInsight {
    fn new(icon: &str, title: &str, description: String, recommendation: &str, scientific: bool) -> Self {
        PowerInsight {
            icon: icon.to_string(),
            title: title.to_string(),
            description,
            recommendation: recommendation.to_string(),
            scientific,
        }
    }
}

/// Focus areas ordered by improvement potential, capped at `settings.max_areas`
pub fn generate_objective_training_focus(
    profile: &[PowerSample],
    decay: &DecayRates,
    cp: Option<&CriticalPowerModel>,
    settings: &FocusSettings,
) -> Vec<FocusArea> {
    let mut areas: Vec<(f64, FocusArea)> = Vec::new();

    if let Some(value) = decay.neuromuscular.as_ref().and_then(|m| m.value.to_f64()) {
        let rule = settings.neuromuscular;
        if value > rule.threshold {
            let potential = rule.potential(value - rule.threshold);
            areas.push((
                potential,
                focus_area(
                    FocusCategory::Neuromuscular,
                    "Phosphocreatine power",
                    format!("Power drops {:.1}% from 1s to 15s", value),
                    "6-10 x 8-12s maximal sprints, full recovery",
                    potential,
                ),
            ));
        }
    }

    if let Some(value) = decay.anaerobic.as_ref().and_then(|m| m.value.to_f64()) {
        let rule = settings.anaerobic;
        if value > rule.threshold {
            let potential = rule.potential(value - rule.threshold);
            areas.push((
                potential,
                focus_area(
                    FocusCategory::Anaerobic,
                    "Glycolytic capacity",
                    format!("Power drops {:.1}% from 15s to 2min", value),
                    "4-6 x 30-60s all-out efforts, 4min recovery",
                    potential,
                ),
            ));
        }
    }

    let p300 = find_power_at_duration(profile, 300);
    let p1200 = find_power_at_duration(profile, 1200).filter(|p| *p > 0.0);

    if let (Some(p300), Some(p1200)) = (p300, p1200) {
        let ratio = p300 / p1200;
        let rule = settings.vo2max;
        if ratio < rule.threshold {
            let potential = rule.potential(rule.threshold - ratio);
            areas.push((
                potential,
                focus_area(
                    FocusCategory::Vo2max,
                    "Aerobic ceiling",
                    format!("5min power is only {:.2}x 20min power", ratio),
                    "5 x 4min at 110-120% FTP, equal recovery",
                    potential,
                ),
            ));
        }
    }

    if let (Some(cp), Some(p1200)) = (cp, p1200) {
        let gap = (p1200 - f64::from(cp.critical_power)) * 100.0 / p1200;
        let rule = settings.threshold;
        if gap > rule.threshold {
            let potential = rule.potential(gap - rule.threshold);
            areas.push((
                potential,
                focus_area(
                    FocusCategory::Threshold,
                    "Sustainable threshold",
                    format!("Critical Power sits {:.1}% below 20min power", gap),
                    "2-3 x 20min at 95-100% FTP",
                    potential,
                ),
            ));
        }
    }

    areas.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    areas
        .into_iter()
        .take(settings.max_areas)
        .map(|(_, area)| area)
        .collect()
}

fn focus_area(
    category: FocusCategory,
    title: &str,
    rationale: String,
    protocol: &str,
    potential: f64,
) -> FocusArea {
    FocusArea {
        category,
        title: title.to_string(),
        rationale,
        protocol: protocol.to_string(),
        improvement_potential: round_to(potential, 1).unwrap_or_default(),
    }
}

/// Insights from power ratios and model outputs
pub fn generate_power_insights(
    ratios: Option<&PowerRatios>,
    decay: &DecayRates,
    cp: Option<&CriticalPowerModel>,
    settings: &InsightSettings,
) -> Vec<PowerInsight> {
    let mut insights = Vec::new();

    if let Some(ratios) = ratios {
        let sprint = ratios.sprint_ratio.value.to_f64().unwrap_or_default();
        if sprint >= settings.sprint_high {
            insights.push(PowerInsight::new(
                "⚡",
                "Explosive sprint",
                format!("15s power is {:.2}x your 20min power", sprint),
                "Position for bunch finishes and protect the sprint",
                false,
            ));
        } else if sprint < settings.sprint_low {
            insights.push(PowerInsight::new(
                "🐢",
                "Limited sprint",
                format!("15s power is only {:.2}x your 20min power", sprint),
                "Add short maximal sprints and favour breakaways over bunch finishes",
                false,
            ));
        }

        let anaerobic = ratios.anaerobic_ratio.value.to_f64().unwrap_or_default();
        if anaerobic >= settings.anaerobic_high {
            insights.push(PowerInsight::new(
                "🔥",
                "Strong anaerobic capacity",
                format!("1min power is {:.2}x your 20min power", anaerobic),
                "Attack on short climbs and punchy sections",
                false,
            ));
        } else if anaerobic < settings.anaerobic_low {
            insights.push(PowerInsight::new(
                "🧱",
                "Anaerobic limiter",
                format!("1min power is only {:.2}x your 20min power", anaerobic),
                "Include 30-60s repeats to handle surges",
                false,
            ));
        }

        let vo2max = ratios.vo2max_ratio.value.to_f64().unwrap_or_default();
        if vo2max >= settings.vo2max_high {
            insights.push(PowerInsight::new(
                "🫁",
                "High VO2max reserve",
                format!("5min power is {:.2}x your 20min power", vo2max),
                "Threshold work will lift the whole curve",
                false,
            ));
        } else if vo2max < settings.vo2max_low {
            insights.push(PowerInsight::new(
                "🚂",
                "Threshold-dominant engine",
                format!("5min power is only {:.2}x your 20min power", vo2max),
                "Raise the aerobic ceiling with 3-5min intervals",
                false,
            ));
        }

        if let Some(endurance) = ratios
            .endurance_ratio
            .as_ref()
            .and_then(|r| r.value.to_f64())
        {
            if endurance >= settings.endurance_high {
                insights.push(PowerInsight::new(
                    "🏔",
                    "Excellent durability",
                    format!("60min power holds {:.0}% of 20min power", endurance * 100.0),
                    "Long races and solo efforts suit you",
                    false,
                ));
            } else if endurance < settings.endurance_low {
                insights.push(PowerInsight::new(
                    "📉",
                    "Endurance fade",
                    format!("60min power falls to {:.0}% of 20min power", endurance * 100.0),
                    "Build longer sweet-spot blocks to extend durability",
                    false,
                ));
            }
        }
    }

    if let Some(sustainability) = decay
        .aerobic_sustainability
        .as_ref()
        .and_then(|m| m.value.to_f64())
    {
        if sustainability >= settings.aerobic_sustainability_high {
            insights.push(PowerInsight::new(
                "🧬",
                "Strong aerobic sustainability",
                format!("20min power holds {:.1}% of 5min power", sustainability),
                "Your aerobic system is well developed; sharpen top-end efforts",
                true,
            ));
        }
    }

    if let Some(cp) = cp {
        let r_squared = cp.r_squared.to_f64().unwrap_or_default();
        if r_squared < settings.min_cp_r_squared {
            insights.push(PowerInsight::new(
                "📐",
                "Inconsistent curve",
                format!("Critical Power fit explains {:.0}% of variance", r_squared * 100.0),
                "Do maximal test efforts at 3, 5, 12 and 20 minutes to firm up the curve",
                true,
            ));
        }
    }

    insights
}

/// Strength labels from mean W/kg over short and long durations
pub fn profile_strengths(profile: &[PowerSample], weight_kg: f64) -> Vec<String> {
    let mut strengths = Vec::new();
    if weight_kg <= 0.0 || !weight_kg.is_finite() {
        return strengths;
    }

    let mean_wkg = |keep: &dyn Fn(u32) -> bool| -> Option<f64> {
        let values: Vec<f64> = profile
            .iter()
            .filter(|s| keep(s.duration))
            .map(|s| s.power / weight_kg)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    };

    if let Some(short) = mean_wkg(&|d| d <= 30) {
        if short > 12.0 {
            strengths.push("Exceptional Sprinter".to_string());
        } else if short > 10.0 {
            strengths.push("Strong Sprinter".to_string());
        }
    }

    if let Some(long) = mean_wkg(&|d| d >= 1200) {
        if long > 4.5 {
            strengths.push("Strong Endurance".to_string());
        } else if long > 3.5 {
            strengths.push("Good Endurance".to_string());
        }
    }

    strengths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{DecayMetric, PowerRatio, Sustainability};
    use rust_decimal_macros::dec;

    fn ratio(value: Decimal) -> PowerRatio {
        PowerRatio {
            value,
            numerator_secs: 0,
            denominator_secs: 1200,
        }
    }

    fn ratios(sprint: Decimal, anaerobic: Decimal, vo2max: Decimal) -> PowerRatios {
        PowerRatios {
            sprint_ratio: ratio(sprint),
            anaerobic_ratio: ratio(anaerobic),
            vo2max_ratio: ratio(vo2max),
            sustainability: Sustainability {
                short_to_medium: dec!(1.4),
                medium_to_long: vo2max,
            },
            endurance_ratio: None,
        }
    }

    fn metric(value: Decimal) -> Option<DecayMetric> {
        Some(DecayMetric {
            value,
            half_life_secs: None,
        })
    }

    #[test]
    fn test_focus_sorted_and_capped() {
        let profile = vec![PowerSample::new(300, 330.0), PowerSample::new(1200, 300.0)];
        let decay = DecayRates {
            neuromuscular: metric(dec!(45.0)),
            anaerobic: metric(dec!(50.0)),
            aerobic_sustainability: None,
        };
        let cp = CriticalPowerModel {
            critical_power: 270,
            w_prime: 15000,
            r_squared: dec!(0.98),
            durations_used: vec![180, 300, 600, 1200],
        };

        let areas = generate_objective_training_focus(
            &profile,
            &decay,
            Some(&cp),
            &FocusSettings::default(),
        );

        // neuromuscular 5 + 0.5*10 = 10, anaerobic 4 + 0.4*5 = 6,
        // vo2max 3 + 50*0.08 = 7, threshold 2 + 0.5*6 = 5
        assert_eq!(areas.len(), 3);
        assert_eq!(areas[0].category, FocusCategory::Neuromuscular);
        assert_eq!(areas[0].improvement_potential, dec!(10.0));
        assert_eq!(areas[1].category, FocusCategory::Vo2max);
        assert_eq!(areas[2].category, FocusCategory::Anaerobic);
    }

    fn cp_model(critical_power: u32) -> CriticalPowerModel {
        CriticalPowerModel {
            critical_power,
            w_prime: 15000,
            r_squared: dec!(0.98),
            durations_used: vec![180, 300, 600, 1200],
        }
    }

    #[test]
    fn test_threshold_focus_from_cp_gap() {
        let profile = vec![PowerSample::new(1200, 300.0)];
        let areas = generate_objective_training_focus(
            &profile,
            &DecayRates::default(),
            Some(&cp_model(270)),
            &FocusSettings::default(),
        );

        // 10% gap: 2 + 0.5 * (10 - 4) = 5
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].category, FocusCategory::Threshold);
        assert_eq!(areas[0].improvement_potential, dec!(5.0));
    }

    #[test]
    fn test_focus_thresholds_are_strict() {
        // Every marker sits exactly on its threshold
        let profile = vec![PowerSample::new(300, 354.0), PowerSample::new(1200, 300.0)];
        let decay = DecayRates {
            neuromuscular: metric(dec!(35.0)),
            anaerobic: metric(dec!(45.0)),
            aerobic_sustainability: None,
        };
        let settings = FocusSettings::default();

        let at_threshold =
            generate_objective_training_focus(&profile, &decay, Some(&cp_model(288)), &settings);
        assert!(at_threshold.is_empty());

        // One watt more of CP gap crosses the 4% line
        let past_threshold =
            generate_objective_training_focus(&profile, &decay, Some(&cp_model(287)), &settings);
        assert_eq!(past_threshold.len(), 1);
        assert_eq!(past_threshold[0].category, FocusCategory::Threshold);
    }

    #[test]
    fn test_focus_empty_for_balanced_profile() {
        let profile = vec![PowerSample::new(300, 380.0), PowerSample::new(1200, 300.0)];
        let areas = generate_objective_training_focus(
            &profile,
            &DecayRates::default(),
            None,
            &FocusSettings::default(),
        );
        assert!(areas.is_empty());
    }

    #[test]
    fn test_ratio_insights() {
        let insights = generate_power_insights(
            Some(&ratios(dec!(2.5), dec!(1.2), dec!(1.17))),
            &DecayRates::default(),
            None,
            &InsightSettings::default(),
        );

        let titles: Vec<&str> = insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Explosive sprint", "Anaerobic limiter"]);
        assert!(insights.iter().all(|i| !i.scientific));
    }

    #[test]
    fn test_model_insights_are_scientific() {
        let decay = DecayRates {
            neuromuscular: None,
            anaerobic: None,
            aerobic_sustainability: metric(dec!(92.5)),
        };
        let cp = CriticalPowerModel {
            critical_power: 280,
            w_prime: 20000,
            r_squared: dec!(0.82),
            durations_used: vec![180, 300, 600, 1200],
        };

        let insights =
            generate_power_insights(None, &decay, Some(&cp), &InsightSettings::default());

        assert_eq!(insights.len(), 2);
        assert!(insights.iter().all(|i| i.scientific));
        assert_eq!(insights[1].title, "Inconsistent curve");
    }

    #[test]
    fn test_profile_strengths() {
        let profile = vec![
            PowerSample::new(5, 975.0),
            PowerSample::new(15, 825.0),
            PowerSample::new(1200, 320.0),
            PowerSample::new(3600, 280.0),
        ];

        // 75kg: short 12.0 W/kg (not > 12), long 4.0 W/kg
        let strengths = profile_strengths(&profile, 75.0);
        assert_eq!(strengths, vec!["Strong Sprinter", "Good Endurance"]);

        assert!(profile_strengths(&profile, 0.0).is_empty());
    }
}
