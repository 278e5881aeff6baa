use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Upper bound reported for the open-ended sprint zone
pub const OPEN_ZONE_SENTINEL: u32 = 9999;

/// One Coggan power zone with absolute bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingZone {
    /// Zone number (1-7)
    pub zone: u8,
    pub name: String,
    /// Lactate response at this intensity
    pub description: String,
    /// Display colour
    pub color: String,
    /// Lower bound in watts (inclusive)
    pub min_watts: u32,
    /// Upper bound in watts (inclusive), sentinel for zone 7
    pub max_watts: u32,
    /// Lower bound as a percentage of FTP
    pub min_percent: u32,
    /// Upper bound as a percentage of FTP, None when open-ended
    pub max_percent: Option<u32>,
}

struct ZoneDefinition {
    name: &'static str,
    description: &'static str,
    color: &'static str,
    min_percent: u32,
    max_percent: Option<u32>,
}

const COGGAN_ZONES: [ZoneDefinition; 7] = [
    ZoneDefinition {
        name: "Active Recovery",
        description: "Well below lactate threshold, lactate is cleared faster than produced",
        color: "#9e9e9e",
        min_percent: 0,
        max_percent: Some(55),
    },
    ZoneDefinition {
        name: "Endurance",
        description: "Lactate stays near baseline, fat oxidation dominates",
        color: "#2196f3",
        min_percent: 56,
        max_percent: Some(75),
    },
    ZoneDefinition {
        name: "Tempo",
        description: "Lactate rises slightly but remains at a steady state",
        color: "#4caf50",
        min_percent: 76,
        max_percent: Some(90),
    },
    ZoneDefinition {
        name: "Lactate Threshold",
        description: "Production and clearance balance at maximal lactate steady state",
        color: "#ffeb3b",
        min_percent: 91,
        max_percent: Some(105),
    },
    ZoneDefinition {
        name: "VO2max",
        description: "Lactate accumulates steadily, efforts last minutes",
        color: "#ff9800",
        min_percent: 106,
        max_percent: Some(120),
    },
    ZoneDefinition {
        name: "Anaerobic Capacity",
        description: "Rapid lactate accumulation, glycolytic efforts under two minutes",
        color: "#f44336",
        min_percent: 121,
        max_percent: Some(150),
    },
    ZoneDefinition {
        name: "Neuromuscular Power",
        description: "Maximal sprints fuelled by phosphocreatine, lactate lags the effort",
        color: "#9c27b0",
        min_percent: 151,
        max_percent: None,
    },
];

/// Coggan 7-zone model for an FTP
///
/// Bounds are the FTP percentages rounded half away from zero. Returns `None`
/// when FTP is not positive.
pub fn calculate_training_zones(ftp: f64) -> Option<Vec<TrainingZone>> {
    if ftp.is_nan() || ftp <= 0.0 {
        return None;
    }
    let ftp = Decimal::from_f64(ftp)?;

    Some(
        COGGAN_ZONES
            .iter()
            .enumerate()
            .map(|(i, def)| TrainingZone {
                zone: (i + 1) as u8,
                name: def.name.to_string(),
                description: def.description.to_string(),
                color: def.color.to_string(),
                min_watts: watts_at_percent(ftp, def.min_percent),
                max_watts: def
                    .max_percent
                    .map(|p| watts_at_percent(ftp, p))
                    .unwrap_or(OPEN_ZONE_SENTINEL),
                min_percent: def.min_percent,
                max_percent: def.max_percent,
            })
            .collect(),
    )
}

/// Zone number a power value falls into
///
/// Values in the rounding gap between two zones belong to the lower one.
pub fn zone_for_power(zones: &[TrainingZone], watts: f64) -> Option<u8> {
    if zones.is_empty() || watts < 0.0 {
        return None;
    }

    zones
        .iter()
        .find(|z| watts <= f64::from(z.max_watts))
        .or_else(|| zones.last())
        .map(|z| z.zone)
}

fn watts_at_percent(ftp: Decimal, percent: u32) -> u32 {
    (ftp * Decimal::from(percent) / dec!(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(0)
}
