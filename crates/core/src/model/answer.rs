use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuestionId, TestId, WorkbookId};
use crate::model::workbook::WorkBook;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerRecordError {
    #[error("marks obtained ({obtained}) exceed maximum marks ({maximum})")]
    MarksExceedMaximum { obtained: u32, maximum: u32 },

    #[error("marks obtained ({stored}) do not match per-question marks ({sum})")]
    MarksMismatch { stored: u32, sum: u32 },
}

//
// ─── ANSWER RECORD ─────────────────────────────────────────────────────────────
//

/// One question's outcome inside a packaged submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: QuestionId,
    pub chosen_option: Option<usize>,
    pub marks_awarded: u32,
}

/// Packaged, graded answers for a single workbook.
///
/// Entries follow the workbook's question order. Unanswered questions are
/// kept with `chosen_option: None` and score zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    workbook_id: WorkbookId,
    answers: Vec<AnsweredQuestion>,
    marks_obtained: u32,
    maximum_marks: u32,
    submitted_at: DateTime<Utc>,
}

impl AnswerRecord {
    /// Grade `selections` against `workbook`.
    ///
    /// Selections for questions outside the workbook are ignored; callers
    /// validate question ids before recording them.
    #[must_use]
    pub fn grade(
        workbook: &WorkBook,
        selections: &HashMap<QuestionId, usize>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let mut marks_obtained = 0_u32;
        let answers = workbook
            .questions()
            .iter()
            .map(|question| {
                let chosen_option = selections.get(&question.id()).copied();
                let marks_awarded = question.marks_for(chosen_option);
                marks_obtained = marks_obtained.saturating_add(marks_awarded);
                AnsweredQuestion {
                    question_id: question.id(),
                    chosen_option,
                    marks_awarded,
                }
            })
            .collect();

        Self {
            workbook_id: workbook.id(),
            answers,
            marks_obtained,
            maximum_marks: workbook.maximum_marks(),
            submitted_at,
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AnswerRecordError` if the stored totals are inconsistent.
    pub fn from_persisted(
        workbook_id: WorkbookId,
        answers: Vec<AnsweredQuestion>,
        marks_obtained: u32,
        maximum_marks: u32,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, AnswerRecordError> {
        if marks_obtained > maximum_marks {
            return Err(AnswerRecordError::MarksExceedMaximum {
                obtained: marks_obtained,
                maximum: maximum_marks,
            });
        }
        let sum = answers
            .iter()
            .fold(0_u32, |acc, a| acc.saturating_add(a.marks_awarded));
        if sum != marks_obtained {
            return Err(AnswerRecordError::MarksMismatch {
                stored: marks_obtained,
                sum,
            });
        }
        Ok(Self {
            workbook_id,
            answers,
            marks_obtained,
            maximum_marks,
            submitted_at,
        })
    }

    #[must_use]
    pub fn workbook_id(&self) -> WorkbookId {
        self.workbook_id
    }

    #[must_use]
    pub fn answers(&self) -> &[AnsweredQuestion] {
        &self.answers
    }

    #[must_use]
    pub fn marks_obtained(&self) -> u32 {
        self.marks_obtained
    }

    #[must_use]
    pub fn maximum_marks(&self) -> u32 {
        self.maximum_marks
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// The raw selections, for restoring a collector after a rejected save.
    #[must_use]
    pub fn selections(&self) -> HashMap<QuestionId, usize> {
        self.answers
            .iter()
            .filter_map(|a| a.chosen_option.map(|c| (a.question_id, c)))
            .collect()
    }
}

//
// ─── TEST RESULT ───────────────────────────────────────────────────────────────
//

/// Aggregate of every persisted workbook submission for one test attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub test_id: TestId,
    pub records: Vec<AnswerRecord>,
    pub marks_obtained: u32,
    pub maximum_marks: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestResult {
    #[must_use]
    pub fn from_records(
        test_id: TestId,
        records: Vec<AnswerRecord>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        let (marks_obtained, maximum_marks) =
            records.iter().fold((0_u32, 0_u32), |(got, max), r| {
                (
                    got.saturating_add(r.marks_obtained()),
                    max.saturating_add(r.maximum_marks()),
                )
            });
        Self {
            test_id,
            records,
            marks_obtained,
            maximum_marks,
            completed_at,
        }
    }

    #[must_use]
    pub fn workbooks_submitted(&self) -> usize {
        self.records.len()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
