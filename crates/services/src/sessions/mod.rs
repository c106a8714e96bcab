mod answers;
mod controller;
mod countdown;
mod playback;
mod sequencer;
mod snapshot;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use answers::AnswerCollector;
pub use controller::{
    SaveStatus, SessionController, SessionParts, SubmitOutcome, SubmitProgress,
};
pub use countdown::{CountdownTimer, TimerEvent};
pub use playback::{
    PlayGrant, PlayOutcome, PlaybackController, PlaybackEvent, PlaybackEventKind,
    PlaybackSnapshot,
};
pub use sequencer::WorkbookSequencer;
pub use snapshot::{SessionNotice, SessionSnapshot};
pub use workflow::SessionLauncher;
