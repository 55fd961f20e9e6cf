use crate::models::pipeline::OrderingPolicy;
use crate::models::pose::PoseConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Corpus location; image URLs are `{base_url}{index}.jpg{url_suffix}`
    pub base_url: String,
    /// Literal suffix appended after the file name (cache buster)
    pub url_suffix: String,
    /// First index polled
    pub start_index: u32,
    /// Last index polled; the scheduler stops past it
    pub max_index: u32,
    /// Seconds between scheduler ticks
    pub poll_interval_secs: f64,
    /// Ticks processed concurrently
    pub max_in_flight: usize,
    /// Ticks waiting for a worker before the scheduler blocks
    pub queue_depth: usize,
    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: f64,
    /// Handling of results that complete out of order
    pub ordering: OrderingPolicy,
    /// Joints below this confidence are dropped (0.0-1.0)
    pub min_joint_confidence: f32,
    /// ONNX keypoint model used by the `ml-onnx` backend
    pub model_path: Option<PathBuf>,
    /// Where downloaded models are cached
    pub model_cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://raw.githubusercontent.com/sebasdeldi/dog_image_dataset/main/".to_string(),
            url_suffix: "?raw=true".to_string(),
            start_index: 1,
            max_index: 11936,
            poll_interval_secs: 1.0,
            max_in_flight: 4,
            queue_depth: 8,
            http_timeout_secs: 10.0,
            ordering: OrderingPolicy::SequenceGuard,
            min_joint_confidence: 0.0,
            model_path: None,
            model_cache_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it with defaults if missing
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, creating it with defaults if missing
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.base_url.trim().is_empty() {
            return Err("Base URL cannot be empty".into());
        }

        let parsed = reqwest::Url::parse(&self.base_url)
            .map_err(|e| format!("Invalid base URL: {}. {}", self.base_url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "Invalid base URL scheme: {}. Must be http or https",
                parsed.scheme()
            )
            .into());
        }

        if self.start_index == 0 {
            return Err("Invalid start index: 0. Corpus indices start at 1".into());
        }

        if self.start_index > self.max_index {
            return Err(format!(
                "Invalid index range: start {} is past max {}",
                self.start_index, self.max_index
            )
            .into());
        }

        if !self.poll_interval_secs.is_finite()
            || self.poll_interval_secs <= 0.0
            || self.poll_interval_secs > 3600.0
        {
            return Err(format!(
                "Invalid poll interval: {}. Must be between 0 and 3600 seconds",
                self.poll_interval_secs
            )
            .into());
        }

        if self.max_in_flight == 0 || self.max_in_flight > 64 {
            return Err(format!(
                "Invalid max in flight: {}. Must be between 1 and 64",
                self.max_in_flight
            )
            .into());
        }

        if self.queue_depth == 0 || self.queue_depth > 1024 {
            return Err(format!(
                "Invalid queue depth: {}. Must be between 1 and 1024",
                self.queue_depth
            )
            .into());
        }

        if !self.http_timeout_secs.is_finite() || self.http_timeout_secs <= 0.0 {
            return Err(format!(
                "Invalid HTTP timeout: {}. Must be a positive number of seconds",
                self.http_timeout_secs
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.min_joint_confidence) {
            return Err(format!(
                "Invalid joint confidence threshold: {}. Must be between 0.0 and 1.0",
                self.min_joint_confidence
            )
            .into());
        }

        Ok(())
    }

    /// Reset to default configuration
    pub fn reset() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Self::default();
        config.save()?;
        Ok(config)
    }

    /// Zero when `poll_interval_secs` is negative, NaN, or out of range
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs).unwrap_or(Duration::ZERO)
    }

    /// `None` unless `http_timeout_secs` is a positive, representable duration
    pub fn http_timeout(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.http_timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
    }

    /// Settings handed to the pose model backend
    pub fn pose_config(&self) -> PoseConfig {
        PoseConfig {
            model_path: self.model_path.clone(),
            min_joint_confidence: self.min_joint_confidence,
            ..PoseConfig::default()
        }
    }

    /// Get the configuration file path
    pub fn get_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let mut path = Self::data_dir()?;
        path.push("config");
        path.push("settings.json");
        Ok(path)
    }

    /// Root of everything pawpose keeps on disk
    pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| "Could not determine home directory")?;

        let mut path = PathBuf::from(home);
        path.push(".pawpose");
        Ok(path)
    }
}
