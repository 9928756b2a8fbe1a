use crate::{tier::TierSchedule, types::Seconds};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AD_INTERVAL_SECONDS: Seconds = 300;
pub const DEFAULT_ABUSE_WINDOW_SECONDS: Seconds = 30;
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;

/// Session tracker tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Spacing of bootstrapped ad placements along the timeline.
    pub ad_interval_seconds:  Seconds,
    /// A play from an ip that already has an event for the same video
    /// inside this window is flagged as abuse.
    pub abuse_window_seconds: Seconds,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ad_interval_seconds:  DEFAULT_AD_INTERVAL_SECONDS,
            abuse_window_seconds: DEFAULT_ABUSE_WINDOW_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "TierSchedule::views")]
    pub view_schedule: TierSchedule,
    #[serde(default = "TierSchedule::ads")]
    pub ad_schedule:   TierSchedule,
    /// `ad_interval_seconds` and `abuse_window_seconds` sit at the top
    /// level of the file.
    #[serde(flatten)]
    pub tracker:       TrackerConfig,
    /// Rows per reader/processor/writer chunk in the batch stages.
    #[serde(default = "default_chunk_size")]
    pub chunk_size:    usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            view_schedule: TierSchedule::views(),
            ad_schedule:   TierSchedule::ads(),
            tracker:       TrackerConfig::default(),
            chunk_size:    DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing fields fall back to the reference
    /// constants; tier schedules are validated while parsing.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.tracker.ad_interval_seconds > 0,
            "ad_interval_seconds must be positive"
        );
        anyhow::ensure!(
            self.tracker.abuse_window_seconds >= 0,
            "abuse_window_seconds must not be negative"
        );
        Ok(())
    }

    /// Small chunks so tests cross chunk boundaries with a handful of rows.
    pub fn default_test() -> Self {
        Self { chunk_size: 2, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_reference_constants() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.tracker.ad_interval_seconds, 300);
        assert_eq!(config.tracker.abuse_window_seconds, 30);
        assert_eq!(config.chunk_size, 1_000);
    }

    #[test]
    fn overrides_schedule_and_chunk_size() {
        let json = r#"{
            "view_schedule": [{"lower": 0, "rate_milli": 2000}],
            "chunk_size": 50
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.view_schedule.calculate(0, 10), 20);
        assert_eq!(config.ad_schedule, TierSchedule::ads());
        assert_eq!(config.chunk_size, 50);
    }

    #[test]
    fn tracker_fields_are_read_from_the_top_level() {
        let json = r#"{"ad_interval_seconds": 120, "abuse_window_seconds": 5}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tracker.ad_interval_seconds, 120);
        assert_eq!(config.tracker.abuse_window_seconds, 5);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["ad_interval_seconds"], 120);
        assert!(back.get("tracker").is_none());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config = PipelineConfig { chunk_size: 0, ..PipelineConfig::default() };
        assert!(config.validate().is_err());
    }
}
