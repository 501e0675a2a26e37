use async_trait::async_trait;

use crate::error::AudioError;

/// The persistent audio element the scene's ambient track plays through.
///
/// `play` may be refused (autoplay policy, missing output device); the other
/// calls are fire-and-forget.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self) -> Result<(), AudioError>;

    /// Pauses, keeping the current position.
    fn pause(&self);

    /// Moves the position back to the start of the track.
    fn rewind(&self);

    fn set_muted(&self, muted: bool);
}
