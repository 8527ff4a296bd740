//! Buzzer

use crate::error::HalResult;

/// Melody player
pub trait Audio: Send + Sync {
    /// Start playing `notes`, one duration step per entry.
    ///
    /// Playback runs in the background; the call returns immediately.
    fn play_melody(&self, notes: &[u8]) -> HalResult<()>;
}
