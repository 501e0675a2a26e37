//! Local playback of the ambient track through rodio.
//!
//! rodio's output stream is not `Send`, so it lives on a dedicated thread and
//! is driven over a channel. Play requests carry a reply channel so refusal
//! (no output device, unreadable file) reaches the caller as an error.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
        Arc, Mutex,
    },
    thread,
};

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink, Source};
use tokio::sync::oneshot;

use crate::error::AudioError;

use super::{AudioConfig, AudioPlayer};

enum PlayerCommand {
    Play {
        reply: oneshot::Sender<Result<(), AudioError>>,
    },
    Pause,
    Rewind,
    SetMuted(bool),
}

pub struct RodioPlayer {
    tx: Mutex<Option<Sender<PlayerCommand>>>,
    source: PathBuf,
    looping: bool,
    volume: f32,
    muted: Arc<AtomicBool>,
}

impl RodioPlayer {
    /// `source_ref` is read as a local file path.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            tx: Mutex::new(None),
            source: PathBuf::from(&config.source_ref),
            looping: config.looping,
            volume: config.volume,
            muted: Arc::new(AtomicBool::new(config.muted)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<PlayerCommand>, AudioError> {
        let mut slot = self
            .tx
            .lock()
            .map_err(|e| AudioError::Output(e.to_string()))?;
        if let Some(tx) = slot.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<PlayerCommand>();
        let source = self.source.clone();
        let looping = self.looping;
        let volume = self.volume;
        let muted = Arc::clone(&self.muted);

        thread::Builder::new()
            .name("ambient-audio".to_string())
            .spawn(move || {
                let mut output: Option<(OutputStream, Sink)> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        PlayerCommand::Play { reply } => {
                            let result = ensure_output(&mut output, &source, looping).map(|sink| {
                                sink.set_volume(effective_volume(volume, muted.load(Ordering::SeqCst)));
                                sink.play();
                            });
                            let _ = reply.send(result);
                        }
                        PlayerCommand::Pause => {
                            if let Some((_, sink)) = output.as_ref() {
                                sink.pause();
                            }
                        }
                        PlayerCommand::Rewind => {
                            // Dropping the sink discards the decoded position;
                            // the next play reopens the file from the start.
                            if let Some((_stream, sink)) = output.take() {
                                sink.stop();
                            }
                        }
                        PlayerCommand::SetMuted(is_muted) => {
                            muted.store(is_muted, Ordering::SeqCst);
                            if let Some((_, sink)) = output.as_ref() {
                                sink.set_volume(effective_volume(volume, is_muted));
                            }
                        }
                    }
                }
            })
            .map_err(|e| AudioError::Output(e.to_string()))?;

        *slot = Some(tx.clone());
        Ok(tx)
    }

    fn send(&self, cmd: PlayerCommand) {
        match self.ensure_thread() {
            Ok(tx) => {
                let _ = tx.send(cmd);
            }
            Err(err) => log::warn!("audio thread unavailable: {}", err),
        }
    }
}

fn effective_volume(volume: f32, muted: bool) -> f32 {
    if muted {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn ensure_output<'a>(
    output: &'a mut Option<(OutputStream, Sink)>,
    source: &Path,
    looping: bool,
) -> Result<&'a Sink, AudioError> {
    if output.is_none() {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| AudioError::PlaybackBlocked(format!("no audio output device: {e}")))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| AudioError::PlaybackBlocked(format!("failed to create audio sink: {e}")))?;
        let file = File::open(source)
            .map_err(|e| AudioError::Output(format!("{}: {e}", source.display())))?;
        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| AudioError::Output(format!("{}: {e}", source.display())))?;
        if looping {
            sink.append(decoder.repeat_infinite());
        } else {
            sink.append(decoder);
        }
        *output = Some((stream, sink));
    }

    output
        .as_ref()
        .map(|(_, sink)| sink)
        .ok_or_else(|| AudioError::Output("audio sink missing".into()))
}

#[async_trait]
impl AudioPlayer for RodioPlayer {
    async fn play(&self) -> Result<(), AudioError> {
        let tx = self.ensure_thread()?;
        let (reply, rx) = oneshot::channel();
        tx.send(PlayerCommand::Play { reply })
            .map_err(|e| AudioError::Output(e.to_string()))?;
        rx.await
            .map_err(|_| AudioError::Output("audio thread exited".into()))?
    }

    fn pause(&self) {
        self.send(PlayerCommand::Pause);
    }

    fn rewind(&self) {
        self.send(PlayerCommand::Rewind);
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        self.send(PlayerCommand::SetMuted(muted));
    }
}
