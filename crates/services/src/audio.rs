//! Audio seam. The engine only opens, starts, stops and releases handles;
//! decoding and output belong to the provider.

use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::AudioUri;

use crate::error::PlaybackError;

#[async_trait]
pub trait AudioProvider: Send + Sync {
    /// Open and prepare the resource at `uri`.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Unavailable` if the resource cannot be prepared.
    async fn open(&self, uri: &AudioUri) -> Result<Box<dyn AudioHandle>, PlaybackError>;
}

/// A prepared, single-shot audio resource.
pub trait AudioHandle: Send {
    /// Length of one full playback.
    fn duration(&self) -> Duration;

    /// # Errors
    ///
    /// Returns `PlaybackError::Unavailable` if output cannot start.
    fn start(&mut self) -> Result<(), PlaybackError>;

    fn stop(&mut self);

    /// Free the underlying resource. Called exactly once per handle.
    fn release(&mut self);
}
