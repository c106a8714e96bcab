//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{QuestionId, SessionState, TestId, TestStatus, WorkbookId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `CountdownTimer`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimerError {
    #[error("countdown duration must be > 0 seconds, got {seconds}")]
    InvalidDuration { seconds: u32 },

    #[error("countdown tick period must be non-zero")]
    ZeroPeriod,
}

/// Errors emitted while preparing or starting audio.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlaybackError {
    #[error("audio playback unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `WorkbookSequencer`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SequencerError {
    #[error("a test needs at least one workbook")]
    Empty,
    #[error("already at the last workbook")]
    NoMoreWorkbooks,
}

/// Errors emitted by `AnswerCollector`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("question {question} is not part of the current workbook")]
    UnknownQuestion { question: QuestionId },
    #[error("option {index} is out of range for question {question} ({count} options)")]
    OptionOutOfRange {
        question: QuestionId,
        index: usize,
        count: usize,
    },
    #[error("collector belongs to workbook {expected}, not {actual}")]
    WorkbookMismatch {
        expected: WorkbookId,
        actual: WorkbookId,
    },
}

/// Errors emitted by session services and the session controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no signed-in user")]
    Unauthenticated,
    #[error("test {test} is not assigned to the current user")]
    TestNotAssigned { test: TestId },
    #[error("test {test} cannot be started ({status:?})")]
    TestNotOpen { test: TestId, status: TestStatus },
    #[error("session is {0}")]
    NotRunning(SessionState),
    #[error("session controller has shut down")]
    ControllerGone,
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
