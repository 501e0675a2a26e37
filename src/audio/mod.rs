#[cfg(feature = "native-audio")]
pub mod native;
pub mod player;
pub mod sync;

use serde::{Deserialize, Serialize};

pub use player::AudioPlayer;
pub use sync::{AudioSnapshot, AudioSyncController, PlaybackState};

#[cfg(feature = "native-audio")]
pub use native::RodioPlayer;

pub const DEFAULT_VOLUME: f32 = 0.8;

/// Ambient audio for one scene. Everything except `muted` comes from the
/// scene; `muted` is the user's persisted preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub source_ref: String,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub volume: f32,
    pub delay_seconds: f64,
    pub muted: bool,
}

impl AudioConfig {
    /// Builds a config with volume clamped to `[0, 1]` and a non-negative delay.
    pub fn new(
        source_ref: impl Into<String>,
        looping: bool,
        volume: Option<f32>,
        delay_seconds: Option<f64>,
        muted: bool,
    ) -> Self {
        let volume = volume
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_VOLUME)
            .clamp(0.0, 1.0);
        let delay_seconds = delay_seconds
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);
        Self {
            source_ref: source_ref.into(),
            looping,
            volume,
            delay_seconds,
            muted,
        }
    }
}
