// Library interface for zpower modules
// The CLI and integration tests both go through these exports

pub mod analysis;
pub mod cache;
pub mod config;
pub mod curve;
pub mod error;
pub mod focus;
pub mod logging;
pub mod models;
pub mod payload;
pub mod ranking;
pub mod reconcile;
pub mod retry;
pub mod zones;

// Re-export commonly used types for convenience
pub use analysis::{AnalysisRequest, AugmentedEvent, EventPower, PowerProfileAnalyzer, RiderAnalysis};
pub use cache::{AnalysisCache, CacheKey, CacheMetrics};
pub use config::EngineConfig;
pub use curve::{
    calculate_critical_power, calculate_power_decay_rates, calculate_power_ratios,
    find_power_at_duration, CriticalPowerModel, DecayRates, PowerRatios,
};
pub use error::{PayloadError, Result, ZPowerError};
pub use focus::{FocusArea, PowerInsight};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::*;
pub use payload::RiderPayload;
pub use retry::{RetryError, RetryPolicy};
pub use zones::{calculate_training_zones, TrainingZone};
