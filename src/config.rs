use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ZPowerError;
use crate::logging::LogConfig;

/// Engine configuration
///
/// Holds the heuristic constants of the analysis (estimation factors, focus
/// thresholds, insight cut points) next to the ambient settings so they can be
/// revised without touching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Profile-level analysis settings
    pub analysis: AnalysisSettings,

    /// Event power estimation constants
    pub estimation: EstimationSettings,

    /// Objective training focus thresholds
    pub focus: FocusSettings,

    /// Insight cut points
    pub insights: InsightSettings,

    /// Analysis cache settings
    pub cache: CacheSettings,

    /// Upstream polling settings
    pub retry: RetrySettings,

    /// Logging settings
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Profile-level analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Minimum profile samples before power ratios are reported
    pub min_profile_samples: usize,

    /// Days without events after which a rider counts as inactive
    pub inactivity_days: u32,
}

/// Scaling factor applied to estimated event power for one duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationFactor {
    pub duration: u32,
    pub factor: f64,
}

/// Event power estimation constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationSettings {
    /// Average power the recent peak is scaled against
    pub reference_avg_power: f64,

    /// Per-duration scaling factors, ascending by duration
    pub duration_factors: Vec<DurationFactor>,

    /// Lower clamp as a multiple of event average power
    pub min_avg_power_multiple: f64,

    /// Upper clamp as a multiple of the recent peak
    pub max_recent_peak_multiple: f64,
}

/// Trigger threshold and improvement-potential line for one focus area
///
/// Potential is `min(cap, base + slope * deviation)` where deviation is how
/// far the metric is past the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusRule {
    pub threshold: f64,
    pub base: f64,
    pub slope: f64,
    pub cap: f64,
}

impl FocusRule {
    pub fn potential(&self, deviation: f64) -> f64 {
        (self.base + self.slope * deviation).min(self.cap)
    }
}

/// Objective training focus thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusSettings {
    /// Neuromuscular decay percentage above which PCr work is flagged
    pub neuromuscular: FocusRule,

    /// Anaerobic decay percentage above which glycolytic work is flagged
    pub anaerobic: FocusRule,

    /// 5min:20min ratio below which VO2max work is flagged
    pub vo2max: FocusRule,

    /// Percentage gap of CP below 20-minute power above which threshold work is flagged
    pub threshold: FocusRule,

    /// Maximum number of areas reported
    pub max_areas: usize,
}

/// Insight cut points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightSettings {
    pub sprint_high: f64,
    pub sprint_low: f64,
    pub anaerobic_high: f64,
    pub anaerobic_low: f64,
    pub vo2max_high: f64,
    pub vo2max_low: f64,
    pub endurance_high: f64,
    pub endurance_low: f64,
    pub aerobic_sustainability_high: f64,
    pub min_cp_r_squared: f64,
}

/// Analysis cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_seconds: u64,
    /// Maximum number of cached analyses
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    256
}

/// Upstream polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let now = Utc::now();

        EngineConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            analysis: AnalysisSettings::default(),
            estimation: EstimationSettings::default(),
            focus: FocusSettings::default(),
            insights: InsightSettings::default(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            min_profile_samples: 50,
            inactivity_days: 90,
        }
    }
}

impl Default for EstimationSettings {
    fn default() -> Self {
        let factors = [
            (5, 0.90),
            (15, 0.92),
            (60, 0.95),
            (300, 0.98),
            (1200, 1.0),
            (3600, 1.0),
        ];

        EstimationSettings {
            reference_avg_power: 300.0,
            duration_factors: factors
                .iter()
                .map(|&(duration, factor)| DurationFactor { duration, factor })
                .collect(),
            min_avg_power_multiple: 0.8,
            max_recent_peak_multiple: 1.1,
        }
    }
}

impl EstimationSettings {
    /// Scaling factor for a duration
    ///
    /// Durations between configured points take the factor of the nearest
    /// configured duration below them; durations shorter than every configured
    /// point take the smallest duration's factor.
    pub fn factor_for(&self, duration: u32) -> f64 {
        let mut sorted = self.duration_factors.clone();
        sorted.sort_by_key(|f| f.duration);

        sorted
            .iter()
            .rev()
            .find(|f| f.duration <= duration)
            .or_else(|| sorted.first())
            .map(|f| f.factor)
            .unwrap_or(1.0)
    }
}

impl Default for FocusSettings {
    fn default() -> Self {
        FocusSettings {
            neuromuscular: FocusRule {
                threshold: 35.0,
                base: 5.0,
                slope: 0.5,
                cap: 15.0,
            },
            anaerobic: FocusRule {
                threshold: 45.0,
                base: 4.0,
                slope: 0.4,
                cap: 12.0,
            },
            vo2max: FocusRule {
                threshold: 1.18,
                base: 3.0,
                slope: 50.0,
                cap: 10.0,
            },
            threshold: FocusRule {
                threshold: 4.0,
                base: 2.0,
                slope: 0.5,
                cap: 8.0,
            },
            max_areas: 3,
        }
    }
}

impl Default for InsightSettings {
    fn default() -> Self {
        InsightSettings {
            sprint_high: 2.5,
            sprint_low: 1.8,
            anaerobic_high: 1.6,
            anaerobic_low: 1.3,
            vo2max_high: 1.25,
            vo2max_low: 1.1,
            endurance_high: 0.95,
            endurance_low: 0.85,
            aerobic_sustainability_high: 90.0,
            min_cp_r_squared: 0.9,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            ttl_seconds: 3600,
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 3,
            interval_ms: 1000,
        }
    }
}

/// Configuration management implementation
impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zpower")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::debug!(
                    path = %config_path.display(),
                    error = %err,
                    "Config file not usable, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> std::result::Result<(), ZPowerError> {
        if self.estimation.reference_avg_power <= 0.0 {
            return Err(ZPowerError::Configuration(
                "estimation.reference_avg_power must be positive".to_string(),
            ));
        }
        if self.estimation.duration_factors.iter().any(|f| f.factor <= 0.0) {
            return Err(ZPowerError::Configuration(
                "estimation.duration_factors must all be positive".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(ZPowerError::Configuration(
                "cache.capacity must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ZPowerError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: EngineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.metadata.version, deserialized.metadata.version);
        assert_eq!(
            config.estimation.duration_factors,
            deserialized.estimation.duration_factors
        );
        assert_eq!(deserialized.focus.max_areas, 3);
    }

    #[test]
    fn test_factor_lookup() {
        let estimation = EstimationSettings::default();

        assert_eq!(estimation.factor_for(5), 0.90);
        assert_eq!(estimation.factor_for(300), 0.98);
        assert_eq!(estimation.factor_for(1200), 1.0);
        // Between configured points: nearest below
        assert_eq!(estimation.factor_for(30), 0.92);
        // Shorter than every configured point
        assert_eq!(estimation.factor_for(1), 0.90);
        assert_eq!(estimation.factor_for(7200), 1.0);
    }

    #[test]
    fn test_focus_rule_is_capped() {
        let rule = FocusSettings::default().neuromuscular;
        assert_eq!(rule.potential(2.0), 6.0);
        assert_eq!(rule.potential(100.0), 15.0);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_capacity_defaults_when_absent() {
        let settings: CacheSettings = toml::from_str("enabled = true\nttl_seconds = 60").unwrap();
        assert_eq!(settings.capacity, 256);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = EngineConfig::default();
        original.cache.ttl_seconds = 120;
        original.estimation.duration_factors[0].factor = 0.85;

        original.save_to_file(&config_path).unwrap();
        let loaded = EngineConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.cache.ttl_seconds, 120);
        assert_eq!(loaded.estimation.factor_for(5), 0.85);
    }
}
