use std::env;
use std::time::Duration;

use tracing::warn;

/// What a submit does when the answer save fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    /// Surface the failure and move on anyway.
    #[default]
    Advance,
    /// Keep the answers in the collector and stay on the current workbook.
    BlockUntilSaved,
}

impl SavePolicy {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "advance" => Some(Self::Advance),
            "block" | "block-until-saved" => Some(Self::BlockUntilSaved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wake-up period of the countdown and the playback progress loop.
    /// The countdown still measures whole seconds whatever this is.
    pub tick_period: Duration,
    /// Ticks a finished progress bar stays full before resetting to zero.
    pub audio_reset_pause: u32,
    pub save_policy: SavePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            audio_reset_pause: 1,
            save_policy: SavePolicy::Advance,
        }
    }
}

impl SessionConfig {
    /// Read `EXAM_TICK_MILLIS` and `EXAM_SAVE_POLICY`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, with an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("EXAM_TICK_MILLIS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.tick_period = Duration::from_millis(ms),
                _ => warn!(value = %raw, "ignoring invalid EXAM_TICK_MILLIS"),
            }
        }

        if let Some(raw) = lookup("EXAM_SAVE_POLICY") {
            match SavePolicy::parse(&raw) {
                Some(policy) => config.save_policy = policy,
                None => warn!(value = %raw, "ignoring invalid EXAM_SAVE_POLICY"),
            }
        }

        config
    }

    #[must_use]
    pub fn with_save_policy(mut self, save_policy: SavePolicy) -> Self {
        self.save_policy = save_policy;
        self
    }
}
