//! Stand-in audio output for the terminal runner: files must exist, URLs are
//! trusted, and every track lasts a fixed number of seconds.

use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::AudioUri;
use services::error::PlaybackError;
use services::{AudioHandle, AudioProvider};
use tracing::info;

pub struct SimulatedAudioProvider {
    track_length: Duration,
}

impl SimulatedAudioProvider {
    pub fn new(track_length: Duration) -> Self {
        Self { track_length }
    }
}

#[async_trait]
impl AudioProvider for SimulatedAudioProvider {
    async fn open(&self, uri: &AudioUri) -> Result<Box<dyn AudioHandle>, PlaybackError> {
        if let Some(path) = uri.as_path() {
            if !path.exists() {
                return Err(PlaybackError::Unavailable(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
        }
        Ok(Box::new(SimulatedHandle {
            label: uri.to_string(),
            length: self.track_length,
            playing: false,
        }))
    }
}

struct SimulatedHandle {
    label: String,
    length: Duration,
    playing: bool,
}

impl AudioHandle for SimulatedHandle {
    fn duration(&self) -> Duration {
        self.length
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        self.playing = true;
        info!(track = %self.label, secs = self.length.as_secs(), "playing");
        Ok(())
    }

    fn stop(&mut self) {
        if self.playing {
            self.playing = false;
            info!(track = %self.label, "stopped");
        }
    }

    fn release(&mut self) {
        self.playing = false;
    }
}
