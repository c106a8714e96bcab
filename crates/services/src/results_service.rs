use std::sync::Arc;

use exam_core::model::{TestId, TestResult};
use storage::repository::AnswerRepository;

use crate::auth::AuthProvider;
use crate::error::SessionError;

/// Read-only view of what the signed-in user submitted.
#[derive(Clone)]
pub struct ResultsService {
    auth: Arc<dyn AuthProvider>,
    answers: Arc<dyn AnswerRepository>,
}

impl ResultsService {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthProvider>, answers: Arc<dyn AnswerRepository>) -> Self {
        Self { auth, answers }
    }

    /// Sum every saved workbook of `test` for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Unauthenticated` without a signed-in user, or
    /// `SessionError::Storage` if the repository fails.
    pub async fn results_for(&self, test: TestId) -> Result<TestResult, SessionError> {
        let user = self.auth.current_user().ok_or(SessionError::Unauthenticated)?;
        let records = self.answers.list_answers(user.id, test).await?;
        let completed_at = self.answers.completed_at(user.id, test).await?;
        Ok(TestResult::from_records(test, records, completed_at))
    }
}
