use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerRecord, TestAssignment, TestId, TestMetadata, UserId, WorkBook,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("network failure: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Failures worth showing to the candidate as "try again".
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Network(_))
    }
}

/// Read side of the test catalogue.
#[async_trait]
pub trait TestRepository: Send + Sync {
    /// List every test assigned to `user`, with completion marks.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn fetch_tests_for_user(&self, user: UserId)
    -> Result<Vec<TestAssignment>, StorageError>;

    /// Fetch the ordered workbooks of a test.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown test.
    async fn fetch_workbooks(&self, test: TestId) -> Result<Vec<WorkBook>, StorageError>;
}

/// Write side: submissions and completion marks.
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Persist one workbook's packaged answers. Re-saving a workbook replaces it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_answers(
        &self,
        user: UserId,
        test: TestId,
        record: &AnswerRecord,
    ) -> Result<(), StorageError>;

    /// Mark the test completed for `user`. The first mark wins.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the mark cannot be stored.
    async fn mark_test_completed(
        &self,
        user: UserId,
        test: TestId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Saved records for `user` on `test`, in submission order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_answers(
        &self,
        user: UserId,
        test: TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn completed_at(
        &self,
        user: UserId,
        test: TestId,
    ) -> Result<Option<DateTime<Utc>>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct CatalogState {
    tests: HashMap<TestId, (TestMetadata, Vec<WorkBook>)>,
    assignments: HashMap<UserId, Vec<TestId>>,
}

#[derive(Default)]
struct SubmissionState {
    answers: HashMap<(UserId, TestId), Vec<AnswerRecord>>,
    completions: HashMap<(UserId, TestId), DateTime<Utc>>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    catalog: Arc<Mutex<CatalogState>>,
    submissions: Arc<Mutex<SubmissionState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a test with its workbooks, replacing any previous copy.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Network` if the lock is poisoned.
    pub fn insert_test(
        &self,
        test: TestMetadata,
        workbooks: Vec<WorkBook>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .catalog
            .lock()
            .map_err(poisoned)?;
        guard.tests.insert(test.id(), (test, workbooks));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the test was never inserted.
    pub fn assign_test(&self, user: UserId, test: TestId) -> Result<(), StorageError> {
        let mut guard = self
            .catalog
            .lock()
            .map_err(poisoned)?;
        if !guard.tests.contains_key(&test) {
            return Err(StorageError::NotFound);
        }
        let assigned = guard.assignments.entry(user).or_default();
        if !assigned.contains(&test) {
            assigned.push(test);
        }
        Ok(())
    }
}

#[async_trait]
impl TestRepository for InMemoryRepository {
    async fn fetch_tests_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<TestAssignment>, StorageError> {
        let catalog = self
            .catalog
            .lock()
            .map_err(poisoned)?;
        let submissions = self
            .submissions
            .lock()
            .map_err(poisoned)?;

        let Some(ids) = catalog.assignments.get(&user) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let (meta, _) = catalog.tests.get(id).ok_or(StorageError::NotFound)?;
            let completed_at = submissions.completions.get(&(user, *id)).copied();
            out.push(TestAssignment::new(meta.clone(), completed_at));
        }
        Ok(out)
    }

    async fn fetch_workbooks(&self, test: TestId) -> Result<Vec<WorkBook>, StorageError> {
        let guard = self
            .catalog
            .lock()
            .map_err(poisoned)?;
        guard
            .tests
            .get(&test)
            .map(|(_, workbooks)| workbooks.clone())
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn save_answers(
        &self,
        user: UserId,
        test: TestId,
        record: &AnswerRecord,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .submissions
            .lock()
            .map_err(poisoned)?;
        let records = guard.answers.entry((user, test)).or_default();
        match records
            .iter_mut()
            .find(|r| r.workbook_id() == record.workbook_id())
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn mark_test_completed(
        &self,
        user: UserId,
        test: TestId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .submissions
            .lock()
            .map_err(poisoned)?;
        guard.completions.entry((user, test)).or_insert(completed_at);
        Ok(())
    }

    async fn list_answers(
        &self,
        user: UserId,
        test: TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(poisoned)?;
        Ok(guard.answers.get(&(user, test)).cloned().unwrap_or_default())
    }

    async fn completed_at(
        &self,
        user: UserId,
        test: TestId,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(poisoned)?;
        Ok(guard.completions.get(&(user, test)).copied())
    }
}

fn poisoned<T>(e: PoisonError<T>) -> StorageError {
    StorageError::Network(format!("store unavailable: {e}"))
}

/// Repository handles shared by the services layer.
#[derive(Clone)]
pub struct Storage {
    pub tests: Arc<dyn TestRepository>,
    pub answers: Arc<dyn AnswerRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let tests: Arc<dyn TestRepository> = Arc::new(repo.clone());
        let answers: Arc<dyn AnswerRepository> = Arc::new(repo);
        Self { tests, answers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use exam_core::model::{AudioTrack, AudioUri, Question, QuestionId, WorkbookId};
    use exam_core::time::fixed_now;

    fn workbook(id: u64) -> WorkBook {
        let q = Question::new(
            QuestionId::new(1),
            "Where is the station?",
            vec!["left".into(), "right".into()],
            1,
            2,
        )
        .unwrap();
        WorkBook::new(
            WorkbookId::new(id),
            AudioTrack::new(AudioUri::from_file("a.mp3").unwrap(), 2),
            vec![q],
        )
        .unwrap()
    }

    fn metadata(id: u64) -> TestMetadata {
        let now = fixed_now();
        TestMetadata::new(TestId::new(id), "Mock test", now, now + Duration::hours(1), 600)
            .unwrap()
    }

    #[tokio::test]
    async fn assigned_tests_carry_completion() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        repo.insert_test(metadata(1), vec![workbook(1)]).unwrap();
        repo.insert_test(metadata(2), vec![workbook(2)]).unwrap();
        repo.assign_test(user, TestId::new(1)).unwrap();
        repo.assign_test(user, TestId::new(2)).unwrap();

        repo.mark_test_completed(user, TestId::new(2), fixed_now())
            .await
            .unwrap();

        let tests = repo.fetch_tests_for_user(user).await.unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].completed_at, None);
        assert_eq!(tests[1].completed_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn first_completion_mark_wins() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let later = fixed_now() + Duration::minutes(5);
        repo.mark_test_completed(user, TestId::new(1), fixed_now())
            .await
            .unwrap();
        repo.mark_test_completed(user, TestId::new(1), later)
            .await
            .unwrap();
        assert_eq!(
            repo.completed_at(user, TestId::new(1)).await.unwrap(),
            Some(fixed_now())
        );
    }

    #[tokio::test]
    async fn resaving_a_workbook_replaces_it() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let wb = workbook(1);
        let wrong = AnswerRecord::grade(
            &wb,
            &HashMap::from([(QuestionId::new(1), 0)]),
            fixed_now(),
        );
        let right = AnswerRecord::grade(
            &wb,
            &HashMap::from([(QuestionId::new(1), 1)]),
            fixed_now(),
        );

        repo.save_answers(user, TestId::new(1), &wrong).await.unwrap();
        repo.save_answers(user, TestId::new(1), &right).await.unwrap();

        let saved = repo.list_answers(user, TestId::new(1)).await.unwrap();
        assert_eq!(saved, vec![right]);
    }

    #[tokio::test]
    async fn unknown_test_has_no_workbooks() {
        let repo = InMemoryRepository::new();
        let err = repo.fetch_workbooks(TestId::new(42)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[test]
    fn assigning_unknown_test_fails() {
        let repo = InMemoryRepository::new();
        let err = repo.assign_test(UserId::new(1), TestId::new(3)).unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
