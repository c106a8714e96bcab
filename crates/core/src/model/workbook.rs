use std::collections::HashSet;

use thiserror::Error;

use crate::model::audio::AudioTrack;
use crate::model::ids::{QuestionId, WorkbookId};
use crate::model::question::Question;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WorkBookError {
    #[error("workbook {id} has no questions")]
    NoQuestions { id: WorkbookId },

    #[error("question {question} appears twice in workbook {id}")]
    DuplicateQuestion { id: WorkbookId, question: QuestionId },
}

/// One listening section: an audio prompt and the ordered questions about it.
///
/// Question order is significant and is preserved when answers are packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkBook {
    id: WorkbookId,
    audio: AudioTrack,
    questions: Vec<Question>,
}

impl WorkBook {
    /// # Errors
    ///
    /// Returns `WorkBookError::NoQuestions` for an empty question list and
    /// `WorkBookError::DuplicateQuestion` if two questions share an id.
    pub fn new(
        id: WorkbookId,
        audio: AudioTrack,
        questions: Vec<Question>,
    ) -> Result<Self, WorkBookError> {
        if questions.is_empty() {
            return Err(WorkBookError::NoQuestions { id });
        }
        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            if !seen.insert(q.id()) {
                return Err(WorkBookError::DuplicateQuestion {
                    id,
                    question: q.id(),
                });
            }
        }
        Ok(Self {
            id,
            audio,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> WorkbookId {
        self.id
    }

    #[must_use]
    pub fn audio(&self) -> &AudioTrack {
        &self.audio
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    /// Sum of every question's mark.
    #[must_use]
    pub fn maximum_marks(&self) -> u32 {
        self.questions
            .iter()
            .fold(0_u32, |acc, q| acc.saturating_add(q.mark()))
    }
}
