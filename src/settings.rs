use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Storage key of the mute flag. Stable across releases; existing settings
/// files depend on it.
pub const AUDIO_MUTED_KEY: &str = "arAudioMuted";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct UserSettings {
    #[serde(rename = "arAudioMuted", default)]
    audio_muted: bool,
}

/// Durable user preferences that outlive a single AR session.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring unreadable settings in {}: {}",
                    path.display(),
                    err
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn audio_muted(&self) -> bool {
        self.data
            .read()
            .map(|guard| guard.audio_muted)
            .unwrap_or_else(|poisoned| poisoned.into_inner().audio_muted)
    }

    /// Writes the new value to disk first and only then updates memory, so
    /// the two never disagree after a successful call.
    pub fn set_audio_muted(&self, muted: bool) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        let mut updated = guard.clone();
        updated.audio_muted = muted;
        self.persist(&updated)?;
        *guard = updated;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
