use exam_core::model::{SessionState, TestId, WorkbookId};

use super::playback::PlaybackSnapshot;

/// Non-fatal problem the session surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    SaveFailed {
        workbook_id: WorkbookId,
        message: String,
    },
    CompletionFailed {
        message: String,
    },
    PlaybackUnavailable {
        message: String,
    },
}

/// Everything a view needs to render the running test.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub test_id: TestId,
    pub state: SessionState,
    pub total_seconds: u32,
    pub remaining_seconds: u32,
    pub workbook_index: usize,
    pub workbook_count: usize,
    pub workbook_id: WorkbookId,
    pub is_last_workbook: bool,
    /// `None` once the session has ended and audio is released.
    pub playback: Option<PlaybackSnapshot>,
    pub answered: usize,
    pub notice: Option<SessionNotice>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// One-based position for display, e.g. "2 / 3".
    #[must_use]
    pub fn position_label(&self) -> String {
        format!("{} / {}", self.workbook_index + 1, self.workbook_count)
    }
}
