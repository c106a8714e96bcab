use std::collections::HashMap;

use chrono::{DateTime, Utc};
use exam_core::model::{AnswerRecord, QuestionId, WorkBook, WorkbookId};

use crate::error::AnswerError;

/// Selections for the workbook currently on screen.
///
/// One collector lives for one workbook; the session builds a fresh one
/// whenever it advances.
#[derive(Debug, Clone)]
pub struct AnswerCollector {
    workbook_id: WorkbookId,
    option_counts: HashMap<QuestionId, usize>,
    selections: HashMap<QuestionId, usize>,
}

impl AnswerCollector {
    #[must_use]
    pub fn for_workbook(workbook: &WorkBook) -> Self {
        Self {
            workbook_id: workbook.id(),
            option_counts: workbook
                .questions()
                .iter()
                .map(|q| (q.id(), q.options().len()))
                .collect(),
            selections: HashMap::new(),
        }
    }

    #[must_use]
    pub fn workbook_id(&self) -> WorkbookId {
        self.workbook_id
    }

    /// Record `chosen` for `question`. The last selection wins.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::UnknownQuestion` for a question outside this
    /// workbook and `AnswerError::OptionOutOfRange` for a bad option index.
    pub fn record_answer(&mut self, question: QuestionId, chosen: usize) -> Result<(), AnswerError> {
        let count = *self
            .option_counts
            .get(&question)
            .ok_or(AnswerError::UnknownQuestion { question })?;
        if chosen >= count {
            return Err(AnswerError::OptionOutOfRange {
                question,
                index: chosen,
                count,
            });
        }
        self.selections.insert(question, chosen);
        Ok(())
    }

    #[must_use]
    pub fn selection(&self, question: QuestionId) -> Option<usize> {
        self.selections.get(&question).copied()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.selections.len()
    }

    /// Grade and package the selections, then clear them.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::WorkbookMismatch` if `workbook` is not the one
    /// this collector was built for; nothing is cleared in that case.
    pub fn finalize_for_submission(
        &mut self,
        workbook: &WorkBook,
        submitted_at: DateTime<Utc>,
    ) -> Result<AnswerRecord, AnswerError> {
        if workbook.id() != self.workbook_id {
            return Err(AnswerError::WorkbookMismatch {
                expected: self.workbook_id,
                actual: workbook.id(),
            });
        }
        let record = AnswerRecord::grade(workbook, &self.selections, submitted_at);
        self.selections.clear();
        Ok(record)
    }

    /// Put back the selections of a record whose save was rejected.
    pub fn restore(&mut self, record: &AnswerRecord) {
        if record.workbook_id() == self.workbook_id {
            self.selections = record.selections();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{AudioTrack, AudioUri, Question};
    use exam_core::time::fixed_now;

    fn workbook() -> WorkBook {
        let three = || vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        WorkBook::new(
            WorkbookId::new(1),
            AudioTrack::new(AudioUri::from_file("a.mp3").unwrap(), 2),
            vec![
                Question::new(QuestionId::new(1), "first", three(), 0, 10).unwrap(),
                Question::new(QuestionId::new(2), "second", three(), 2, 5).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn last_selection_wins() {
        let wb = workbook();
        let mut collector = AnswerCollector::for_workbook(&wb);
        collector.record_answer(QuestionId::new(1), 2).unwrap();
        collector.record_answer(QuestionId::new(1), 0).unwrap();
        assert_eq!(collector.selection(QuestionId::new(1)), Some(0));
        assert_eq!(collector.answered_count(), 1);
    }

    #[test]
    fn unknown_question_is_rejected() {
        let mut collector = AnswerCollector::for_workbook(&workbook());
        let err = collector.record_answer(QuestionId::new(9), 0).unwrap_err();
        assert_eq!(
            err,
            AnswerError::UnknownQuestion {
                question: QuestionId::new(9)
            }
        );
    }

    #[test]
    fn option_index_is_bounded() {
        let mut collector = AnswerCollector::for_workbook(&workbook());
        let err = collector.record_answer(QuestionId::new(2), 3).unwrap_err();
        assert!(matches!(err, AnswerError::OptionOutOfRange { count: 3, .. }));
        assert_eq!(collector.answered_count(), 0);
    }

    #[test]
    fn finalize_grades_and_clears() {
        let wb = workbook();
        let mut collector = AnswerCollector::for_workbook(&wb);
        collector.record_answer(QuestionId::new(1), 0).unwrap();
        collector.record_answer(QuestionId::new(2), 1).unwrap();

        let record = collector.finalize_for_submission(&wb, fixed_now()).unwrap();

        assert_eq!(record.marks_obtained(), 10);
        assert_eq!(record.maximum_marks(), 15);
        assert_eq!(collector.answered_count(), 0);
    }

    #[test]
    fn restore_brings_back_selections() {
        let wb = workbook();
        let mut collector = AnswerCollector::for_workbook(&wb);
        collector.record_answer(QuestionId::new(2), 2).unwrap();
        let record = collector.finalize_for_submission(&wb, fixed_now()).unwrap();

        collector.restore(&record);
        assert_eq!(collector.selection(QuestionId::new(2)), Some(2));
    }

    #[test]
    fn finalize_rejects_other_workbook() {
        let wb = workbook();
        let mut collector = AnswerCollector::for_workbook(&wb);
        collector.record_answer(QuestionId::new(1), 0).unwrap();
        let other = WorkBook::new(
            WorkbookId::new(2),
            wb.audio().clone(),
            wb.questions().to_vec(),
        )
        .unwrap();

        let err = collector
            .finalize_for_submission(&other, fixed_now())
            .unwrap_err();
        assert!(matches!(err, AnswerError::WorkbookMismatch { .. }));
        assert_eq!(collector.answered_count(), 1);
    }
}
