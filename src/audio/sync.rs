use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::AudioError,
    event_bus::{AppEvent, EventBus},
    resource::{spawn_timer, ResourceLedger, TimerGuard},
    session::SessionStatus,
    settings::SettingsStore,
};

use super::{AudioConfig, AudioPlayer};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// A start is pending (delay timer armed or play call in flight).
    Scheduled,
    Playing,
    /// Paused because the page went to the background.
    Suspended,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSnapshot {
    pub available: bool,
    pub muted: bool,
    pub playback: PlaybackState,
}

struct AudioState {
    config: Option<AudioConfig>,
    playback: PlaybackState,
    pending: Option<TimerGuard>,
    /// Bumped on every session start and end; in-flight work from an older
    /// generation must not touch the player.
    generation: u64,
    page_visible: bool,
}

impl AudioState {
    fn release_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(mut guard) => guard.release(),
            None => false,
        }
    }

    fn muted(&self) -> bool {
        self.config.as_ref().map(|c| c.muted).unwrap_or(true)
    }
}

/// Keeps the ambient track in step with the session and the mute preference.
#[derive(Clone)]
pub struct AudioSyncController {
    state: Arc<Mutex<AudioState>>,
    player: Option<Arc<dyn AudioPlayer>>,
    settings: Arc<SettingsStore>,
    bus: Arc<EventBus>,
    session_status: watch::Receiver<SessionStatus>,
    ledger: ResourceLedger,
    shutdown: CancellationToken,
}

impl AudioSyncController {
    /// Audio is only available when the scene supplied a config and there is
    /// a player to run it; otherwise every operation is a no-op.
    pub fn new(
        config: Option<AudioConfig>,
        player: Option<Arc<dyn AudioPlayer>>,
        settings: Arc<SettingsStore>,
        bus: Arc<EventBus>,
        session_status: watch::Receiver<SessionStatus>,
        ledger: ResourceLedger,
    ) -> Self {
        let config = match (config, player.as_ref()) {
            (Some(config), Some(player)) => {
                player.set_muted(config.muted);
                Some(config)
            }
            (Some(config), None) => {
                warn!(
                    "audio configured ({}) but no player available; audio disabled",
                    config.source_ref
                );
                None
            }
            (None, _) => None,
        };

        Self {
            state: Arc::new(Mutex::new(AudioState {
                config,
                playback: PlaybackState::Stopped,
                pending: None,
                generation: 0,
                page_visible: true,
            })),
            player,
            settings,
            bus,
            session_status,
            ledger,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn snapshot(&self) -> AudioSnapshot {
        let state = self.state.lock().await;
        AudioSnapshot {
            available: state.config.is_some(),
            muted: state.muted(),
            playback: state.playback,
        }
    }

    pub async fn on_session_started(&self) {
        let Some(player) = self.player.clone() else {
            return;
        };

        let mut state = self.state.lock().await;
        let Some(config) = state.config.clone() else {
            return;
        };
        state.generation = state.generation.wrapping_add(1);
        state.release_pending();
        let generation = state.generation;

        // The start event may be handled after the session already ended.
        if *self.session_status.borrow() != SessionStatus::Active {
            log_debug!("session no longer active; audio start skipped");
            state.playback = PlaybackState::Stopped;
            return;
        }
        if config.muted {
            log_info!("audio muted; session start does not begin playback");
            state.playback = PlaybackState::Stopped;
            return;
        }

        state.playback = PlaybackState::Scheduled;
        if config.delay_seconds <= 0.0 {
            drop(state);
            self.start_playback(player, generation).await;
            return;
        }

        let delay = Duration::from_secs_f64(config.delay_seconds);
        log_debug!("audio scheduled in {:?}", delay);
        let controller = self.clone();
        state.pending = Some(spawn_timer(&self.ledger, move |token| async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    controller.fire_scheduled(generation, &token).await;
                }
            }
        }));
    }

    pub async fn on_session_ended(&self) {
        let was_audible = {
            let mut state = self.state.lock().await;
            state.generation = state.generation.wrapping_add(1);
            state.release_pending();
            let was_audible = matches!(
                state.playback,
                PlaybackState::Playing | PlaybackState::Suspended
            );
            state.playback = PlaybackState::Stopped;
            if state.config.is_none() {
                return;
            }
            was_audible
        };

        if let Some(player) = &self.player {
            player.pause();
            player.rewind();
        }
        if was_audible {
            info!("ambient audio stopped");
            self.bus.publish(AppEvent::AudioPlaybackStopped);
        }
    }

    /// Flips and persists the mute flag, then applies it to the element.
    /// Unmuting never starts playback by itself.
    pub async fn toggle_mute(&self) -> Result<bool> {
        let muted = {
            let mut state = self.state.lock().await;
            let muted = match state.config.as_ref() {
                Some(config) => !config.muted,
                None => return Err(AudioError::Unavailable.into()),
            };

            let settings = self.settings.clone();
            tokio::task::spawn_blocking(move || settings.set_audio_muted(muted))
                .await
                .context("settings writer join failed")??;
            if let Some(config) = state.config.as_mut() {
                config.muted = muted;
            }
            if let Some(player) = &self.player {
                player.set_muted(muted);
            }

            if muted && state.release_pending() {
                log_info!("pending audio start cancelled by mute");
                state.playback = PlaybackState::Stopped;
            }
            muted
        };

        self.bus.publish(AppEvent::AudioMuteChanged { muted });
        Ok(muted)
    }

    /// Backgrounding the page pauses audible playback; returning resumes it
    /// if the session is still live and the user has not muted meanwhile.
    pub async fn set_page_visible(&self, visible: bool) {
        let Some(player) = self.player.clone() else {
            return;
        };

        let generation = {
            let mut state = self.state.lock().await;
            if state.page_visible == visible {
                return;
            }
            state.page_visible = visible;

            if !visible {
                if state.playback == PlaybackState::Playing {
                    player.pause();
                    state.playback = PlaybackState::Suspended;
                    log_debug!("audio suspended while page hidden");
                }
                return;
            }

            if state.playback != PlaybackState::Suspended {
                return;
            }
            if state.muted() || *self.session_status.borrow() != SessionStatus::Active {
                state.playback = PlaybackState::Stopped;
                return;
            }
            state.playback = PlaybackState::Scheduled;
            state.generation
        };

        self.start_playback(player, generation).await;
    }

    pub fn spawn_session_listener(
        &self,
        mut events: broadcast::Receiver<AppEvent>,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(AppEvent::SessionStarted { .. }) => controller.on_session_started().await,
                    Ok(event) if event.ends_session() => controller.on_session_ended().await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("audio listener lagged; {} events skipped", skipped);
                        if *controller.session_status.borrow() != SessionStatus::Active {
                            controller.on_session_ended().await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Unsubscribes and stops audio. Used on page teardown.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.on_session_ended().await;
    }

    async fn fire_scheduled(&self, generation: u64, token: &CancellationToken) {
        let Some(player) = self.player.clone() else {
            return;
        };

        {
            let mut state = self.state.lock().await;
            if token.is_cancelled() || state.generation != generation {
                return;
            }
            state.release_pending();

            if state.muted() || *self.session_status.borrow() != SessionStatus::Active {
                state.playback = PlaybackState::Stopped;
                return;
            }
            if !state.page_visible {
                state.playback = PlaybackState::Suspended;
                return;
            }
        }

        self.start_playback(player, generation).await;
    }

    async fn start_playback(&self, player: Arc<dyn AudioPlayer>, generation: u64) {
        let result = player.play().await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            // The session ended while `play` was in flight.
            if result.is_ok() && state.playback != PlaybackState::Playing {
                player.pause();
                player.rewind();
            }
            return;
        }

        match result {
            Ok(()) => {
                state.playback = PlaybackState::Playing;
                drop(state);
                info!("ambient audio playing");
                self.bus.publish(AppEvent::AudioPlaybackStarted);
            }
            Err(err) => {
                state.playback = PlaybackState::Stopped;
                drop(state);
                log_warn!("audio play failed: {}", err);
                self.bus.publish(AppEvent::AudioPlaybackBlocked {
                    reason: err.to_string(),
                });
            }
        }
    }
}
