use exam_core::model::WorkBook;

use crate::error::SequencerError;

/// Forward-only cursor over a test's workbooks.
///
/// There is no way back: once a workbook is submitted its answers are final.
#[derive(Debug, Clone)]
pub struct WorkbookSequencer {
    workbooks: Vec<WorkBook>,
    current: usize,
}

impl WorkbookSequencer {
    /// # Errors
    ///
    /// Returns `SequencerError::Empty` if `workbooks` is empty.
    pub fn new(workbooks: Vec<WorkBook>) -> Result<Self, SequencerError> {
        if workbooks.is_empty() {
            return Err(SequencerError::Empty);
        }
        Ok(Self {
            workbooks,
            current: 0,
        })
    }

    #[must_use]
    pub fn current(&self) -> &WorkBook {
        &self.workbooks[self.current]
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workbooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workbooks.is_empty()
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current + 1 == self.workbooks.len()
    }

    /// Move to the next workbook and return it.
    ///
    /// # Errors
    ///
    /// Returns `SequencerError::NoMoreWorkbooks` on the last workbook; the
    /// position is left unchanged.
    pub fn advance(&mut self) -> Result<&WorkBook, SequencerError> {
        if self.is_last() {
            return Err(SequencerError::NoMoreWorkbooks);
        }
        self.current += 1;
        Ok(self.current())
    }
}
