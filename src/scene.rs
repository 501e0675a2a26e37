//! The parts of a scene's configuration this engine reads. The scene object
//! itself is opaque; anything not listed here is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::audio::AudioConfig;
use crate::config::CapturePolicy;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneAudio {
    pub url: Option<String>,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub volume: Option<f32>,
    pub delay_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneCapture {
    pub max_duration_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub audio: Option<SceneAudio>,
    pub capture: Option<SceneCapture>,
}

impl SceneSettings {
    /// Never fails: a section with the wrong shape is treated as absent.
    pub fn from_value(scene: &Value) -> Self {
        let audio = scene
            .get("audio")
            .and_then(|v| section::<SceneAudio>(v, "audio"));
        let capture = scene
            .get("capture")
            .and_then(|v| section::<SceneCapture>(v, "capture"));
        Self { audio, capture }
    }

    /// Audio config for this scene, or `None` when it has no track. Relative
    /// URLs are resolved against `scene_base`.
    pub fn audio_config(&self, scene_base: &str, muted: bool) -> Option<AudioConfig> {
        let audio = self.audio.as_ref()?;
        let url = audio.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(AudioConfig::new(
            resolve_url(scene_base, url),
            audio.looping,
            audio.volume,
            audio.delay_seconds,
            muted,
        ))
    }

    pub fn max_duration_seconds(&self) -> Option<u64> {
        self.capture
            .as_ref()
            .and_then(|c| c.max_duration_seconds)
            .filter(|secs| *secs > 0)
    }

    /// The configured policy with this scene's limit applied on top.
    pub fn capture_policy(&self, base: &CapturePolicy) -> CapturePolicy {
        let mut policy = base.clone();
        if let Some(secs) = self.max_duration_seconds() {
            policy.max_duration_seconds = secs;
        }
        policy
    }
}

fn section<T: for<'de> Deserialize<'de>>(value: &Value, name: &str) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(section) => Some(section),
        Err(err) => {
            log::warn!("ignoring malformed scene {} section: {}", name, err);
            None
        }
    }
}

fn resolve_url(base: &str, url: &str) -> String {
    if url.contains("://") || url.starts_with('/') || base.is_empty() {
        return url.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), url)
}
