use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Engine tuning, loaded once at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial master bus gain (0.0-1.0)
    pub master_volume: f32,

    /// Initial BGM bus gain, also the fade-in target when the bus is at 0
    pub bgm_volume: f32,

    /// Initial SFX bus gain (0.0-1.0)
    pub sfx_volume: f32,

    /// Extra delay after a fade-out before the voice is hard-stopped
    pub stop_grace_ms: u64,

    /// How often the driver thread advances fades and timers
    pub tick_interval_ms: u64,

    /// Timeout for HTTP resource retrieval
    pub fetch_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            bgm_volume: 0.35,
            sfx_volume: 0.9,
            stop_grace_ms: 30,
            tick_interval_ms: 10,
            fetch_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        let config = Self::from_json(&content).map_err(|e| match e {
            ConfigError::LoadFailed { source, .. } => ConfigError::LoadFailed {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;

        tracing::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::LoadFailed {
                path: "<inline>".to_string(),
                source: Box::new(e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject gains outside `[0, 1]` and a zero tick interval
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gains = [
            ("master_volume", self.master_volume),
            ("bgm_volume", self.bgm_volume),
            ("sfx_volume", self.sfx_volume),
        ];
        for (field, value) in gains {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be within 0.0-1.0, got {value}"
                )));
            }
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Name to URL descriptors for both resource kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManifest {
    pub bgm: BTreeMap<String, String>,
    pub sfx: BTreeMap<String, String>,
}

impl ResourceManifest {
    /// Load a manifest from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        let manifest: ResourceManifest =
            serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })?;

        tracing::info!(
            "Loaded manifest from {}: {} BGM, {} SFX",
            path.display(),
            manifest.bgm.len(),
            manifest.sfx.len()
        );
        Ok(manifest)
    }

    pub fn with_bgm(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.bgm.insert(name.into(), url.into());
        self
    }

    pub fn with_sfx(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.sfx.insert(name.into(), url.into());
        self
    }
}

/// Names to warm up ahead of playback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadRequest {
    pub bgm: Vec<String>,
    pub sfx: Vec<String>,
}

impl PreloadRequest {
    pub fn bgm<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bgm.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn sfx<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sfx.extend(names.into_iter().map(Into::into));
        self
    }
}
