use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

const ENV_BASE_URL: &str = "REALEYEZ_BASE_URL";
const ENV_SAMPLE_INTERVAL_MS: &str = "REALEYEZ_SAMPLE_INTERVAL_MS";
const ENV_MAX_IN_FLIGHT: &str = "REALEYEZ_MAX_IN_FLIGHT";

/// Tunables for the realtime analysis pipeline.
///
/// Every field has a default, so a partial JSON file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Inference service root, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Path of the per-frame endpoint relative to `base_url`.
    pub frame_path: String,
    /// Minimum wall-clock gap between two accepted samples.
    pub sample_interval_ms: u64,
    /// Scheduling tick of the capture loop (render rate).
    pub tick_interval_ms: u64,
    /// Upper bound on concurrently outstanding inference calls.
    pub max_in_flight: usize,
    /// JPEG quality (1-100) for transmitted frames.
    pub jpeg_quality: u8,
    /// Linear downscale factor applied to each sampled frame.
    pub downscale_divisor: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            frame_path: "frame-inference/".to_string(),
            sample_interval_ms: 100,
            tick_interval_ms: 16,
            max_in_flight: 4,
            jpeg_quality: 80,
            downscale_divisor: 2,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file, returning defaults when the file
    /// is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Apply `REALEYEZ_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_SAMPLE_INTERVAL_MS) {
            self.sample_interval_ms = parse_env(ENV_SAMPLE_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_IN_FLIGHT) {
            self.max_in_flight = parse_env(ENV_MAX_IN_FLIGHT, &raw)?;
        }
        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(AnalysisError::Config("baseUrl must not be empty".into()));
        }
        if self.sample_interval_ms == 0 {
            return Err(AnalysisError::Config(
                "sampleIntervalMs must be greater than zero".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(AnalysisError::Config(
                "tickIntervalMs must be greater than zero".into(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(AnalysisError::Config(
                "maxInFlight must be greater than zero".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AnalysisError::Config(format!(
                "jpegQuality {} is outside 1-100",
                self.jpeg_quality
            )));
        }
        if self.downscale_divisor == 0 {
            return Err(AnalysisError::Config(
                "downscaleDivisor must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// URL of the per-frame inference endpoint.
    pub fn frame_endpoint(&self) -> String {
        join_url(&self.base_url, &self.frame_path)
    }

    /// URL of the full-video inference endpoint.
    pub fn video_endpoint(&self) -> String {
        join_url(&self.base_url, "video-inference/")
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AnalysisError::Config(format!("{key}={raw:?} is not a valid number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_sample_at_ten_hertz() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_interval(), Duration::from_millis(100));
        assert_eq!(config.downscale_divisor, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_returns_default_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.json");
        assert_eq!(PipelineConfig::load(&path).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn load_merges_partial_file_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("realeyez.json");
        std::fs::write(&path, r#"{"baseUrl":"http://gpu-box:9000","maxInFlight":8}"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "http://gpu-box:9000");
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.sample_interval_ms, 100);
    }

    #[test]
    fn load_returns_error_for_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("realeyez.json");
        std::fs::write(&path, "not valid json!!!").unwrap();

        let result = PipelineConfig::load(&path);
        assert!(matches!(result, Err(AnalysisError::ConfigParse(_))));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let config = PipelineConfig::default()
            .apply_overrides(lookup_from(&[
                (ENV_BASE_URL, "http://10.0.0.5:8000/"),
                (ENV_SAMPLE_INTERVAL_MS, "250"),
                (ENV_MAX_IN_FLIGHT, " 2 "),
            ]))
            .unwrap();
        assert_eq!(config.base_url, "http://10.0.0.5:8000/");
        assert_eq!(config.sample_interval_ms, 250);
        assert_eq!(config.max_in_flight, 2);
    }

    #[test]
    fn env_override_with_bad_number_fails() {
        let result = PipelineConfig::default()
            .apply_overrides(lookup_from(&[(ENV_SAMPLE_INTERVAL_MS, "fast")]));
        assert!(matches!(result, Err(AnalysisError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let defaults = PipelineConfig::default();
        let no_in_flight = PipelineConfig {
            max_in_flight: 0,
            ..defaults.clone()
        };
        assert!(no_in_flight.validate().is_err());

        let no_interval = PipelineConfig {
            sample_interval_ms: 0,
            ..defaults.clone()
        };
        assert!(no_interval.validate().is_err());

        let no_divisor = PipelineConfig {
            downscale_divisor: 0,
            ..defaults
        };
        assert!(no_divisor.validate().is_err());
    }

    #[test]
    fn validate_rejects_quality_out_of_range() {
        for quality in [0, 101] {
            let config = PipelineConfig {
                jpeg_quality: quality,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "quality {quality} accepted");
        }
    }

    #[test]
    fn endpoints_join_without_double_slashes() {
        let config = PipelineConfig {
            base_url: "http://localhost:8000/".to_string(),
            frame_path: "/frame-inference/".to_string(),
            ..PipelineConfig::default()
        };
        assert_eq!(config.frame_endpoint(), "http://localhost:8000/frame-inference/");
        assert_eq!(config.video_endpoint(), "http://localhost:8000/video-inference/");
    }
}
