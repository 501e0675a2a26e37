use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RECORDING_SECS: u64 = 60;
pub const DEFAULT_START_TIMEOUT_MS: u64 = 5_000;

const MAX_RECORDING_ENV: &str = "ARSTAGE_MAX_RECORDING_SECS";
const START_TIMEOUT_ENV: &str = "ARSTAGE_START_TIMEOUT_MS";
const DEBUG_ENV: &str = "ARSTAGE_DEBUG";

/// Recording policy. The maximum duration differs between deployments
/// (60 s and 600 s are both in use), so it is configuration, not a constant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CapturePolicy {
    pub max_duration_seconds: u64,
    /// Most capable first: combined video+audio codecs, then progressively
    /// plainer containers.
    pub encoding_preferences: Vec<String>,
    pub tick_interval_ms: u64,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            max_duration_seconds: DEFAULT_MAX_RECORDING_SECS,
            encoding_preferences: vec![
                "video/mp4;codecs=avc1.42E01E,mp4a.40.2".into(),
                "video/webm;codecs=vp9,opus".into(),
                "video/webm;codecs=vp8,opus".into(),
                "video/webm".into(),
            ],
            tick_interval_ms: 1_000,
        }
    }
}

impl CapturePolicy {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPolicy {
    /// How long the start control stays busy without any lifecycle event.
    pub start_timeout_ms: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
        }
    }
}

impl SessionPolicy {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub capture: CapturePolicy,
    pub session: SessionPolicy,
    /// Artifacts kept in the gallery before the oldest is dropped.
    pub gallery_limit: usize,
    pub event_capacity: usize,
    /// Verbose tick logging.
    pub debug: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            capture: CapturePolicy::default(),
            session: SessionPolicy::default(),
            gallery_limit: 50,
            event_capacity: 256,
            debug: false,
        }
    }
}

impl RuntimeConfig {
    /// Reads the config file if it exists, otherwise starts from defaults.
    /// Environment overrides are applied on top either way.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config in {}", path.display()))?
        } else {
            Self::default()
        };
        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ARSTAGE_*` overrides looked up through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(MAX_RECORDING_ENV) {
            self.capture.max_duration_seconds = value
                .trim()
                .parse()
                .with_context(|| format!("{MAX_RECORDING_ENV} must be a whole number of seconds"))?;
        }
        if let Some(value) = lookup(START_TIMEOUT_ENV) {
            self.session.start_timeout_ms = value
                .trim()
                .parse()
                .with_context(|| format!("{START_TIMEOUT_ENV} must be milliseconds"))?;
        }
        if let Some(value) = lookup(DEBUG_ENV) {
            self.debug = value == "1" || value.eq_ignore_ascii_case("true");
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.max_duration_seconds == 0 {
            bail!("capture.maxDurationSeconds must be greater than zero");
        }
        if self.capture.tick_interval_ms == 0 {
            bail!("capture.tickIntervalMs must be greater than zero");
        }
        if self.capture.encoding_preferences.is_empty() {
            log::warn!("no encoding preferences configured; recordings will be simulated");
        }
        Ok(())
    }
}
