use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("a question needs at least 2 options, got {count}")]
    TooFewOptions { count: usize },

    #[error("correct option {index} is out of range for {count} options")]
    CorrectOptionOutOfRange { index: usize, count: usize },

    #[error("question mark must be > 0")]
    ZeroMark,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
    mark: u32,
}

impl Question {
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, fewer than two options
    /// are given, the correct index is out of range, or the mark is zero.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
        mark: u32,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                count: options.len(),
            });
        }
        if correct_option >= options.len() {
            return Err(QuestionError::CorrectOptionOutOfRange {
                index: correct_option,
                count: options.len(),
            });
        }
        if mark == 0 {
            return Err(QuestionError::ZeroMark);
        }

        Ok(Self {
            id,
            prompt,
            options,
            correct_option,
            mark,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    #[must_use]
    pub fn mark(&self) -> u32 {
        self.mark
    }

    /// Marks awarded for choosing `chosen`; zero unless it is the correct option.
    #[must_use]
    pub fn marks_for(&self, chosen: Option<usize>) -> u32 {
        match chosen {
            Some(index) if index == self.correct_option => self.mark,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("option {i}")).collect()
    }

    #[test]
    fn single_option_is_rejected() {
        let err = Question::new(QuestionId::new(1), "Q", options(1), 0, 1).unwrap_err();
        assert_eq!(err, QuestionError::TooFewOptions { count: 1 });
    }

    #[test]
    fn correct_option_must_be_in_range() {
        let err = Question::new(QuestionId::new(1), "Q", options(3), 3, 1).unwrap_err();
        assert_eq!(
            err,
            QuestionError::CorrectOptionOutOfRange { index: 3, count: 3 }
        );
    }

    #[test]
    fn zero_mark_is_rejected() {
        let err = Question::new(QuestionId::new(1), "Q", options(2), 0, 0).unwrap_err();
        assert_eq!(err, QuestionError::ZeroMark);
    }

    #[test]
    fn marks_only_for_correct_choice() {
        let q = Question::new(QuestionId::new(1), "Q", options(4), 2, 5).unwrap();
        assert_eq!(q.marks_for(Some(2)), 5);
        assert_eq!(q.marks_for(Some(1)), 0);
        assert_eq!(q.marks_for(None), 0);
    }
}
