use std::sync::Arc;

use chrono::{DateTime, Utc};
use exam_core::model::{TestMetadata, TestStatus};
use storage::repository::TestRepository;

use crate::auth::AuthProvider;
use crate::error::SessionError;
use crate::Clock;

/// One row of the signed-in user's test list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestListItem {
    pub test: TestMetadata,
    pub status: TestStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TestListItem {
    #[must_use]
    pub fn can_start(&self) -> bool {
        self.status == TestStatus::Open
    }
}

/// Lists assigned tests with their status as of the clock's now.
#[derive(Clone)]
pub struct TestListService {
    clock: Clock,
    auth: Arc<dyn AuthProvider>,
    tests: Arc<dyn TestRepository>,
}

impl TestListService {
    #[must_use]
    pub fn new(clock: Clock, auth: Arc<dyn AuthProvider>, tests: Arc<dyn TestRepository>) -> Self {
        Self { clock, auth, tests }
    }

    /// Tests assigned to the signed-in user, earliest opening first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Unauthenticated` without a signed-in user, or
    /// `SessionError::Storage` if the repository fails.
    pub async fn list_for_current_user(&self) -> Result<Vec<TestListItem>, SessionError> {
        let user = self.auth.current_user().ok_or(SessionError::Unauthenticated)?;
        let now = self.clock.now();

        let mut items: Vec<TestListItem> = self
            .tests
            .fetch_tests_for_user(user.id)
            .await?
            .into_iter()
            .map(|assignment| TestListItem {
                status: assignment.status(now),
                completed_at: assignment.completed_at,
                test: assignment.test,
            })
            .collect();
        items.sort_by_key(|item| (item.test.opens_at(), item.test.id()));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthProvider;
    use chrono::Duration;
    use exam_core::model::{TestId, User, UserId};
    use exam_core::time::{fixed_clock, fixed_now};
    use storage::repository::{AnswerRepository, InMemoryRepository};

    fn meta(id: u64, opens_in_hours: i64) -> TestMetadata {
        let opens = fixed_now() + Duration::hours(opens_in_hours);
        TestMetadata::new(TestId::new(id), format!("Test {id}"), opens, opens + Duration::hours(2), 600)
            .unwrap()
    }

    #[tokio::test]
    async fn classifies_and_sorts_by_opening() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        // 1: missed, 2: open, 3: upcoming, 4: open but already taken
        for (id, offset) in [(3, 5), (1, -10), (4, -1), (2, -1)] {
            repo.insert_test(meta(id, offset), Vec::new()).unwrap();
            repo.assign_test(user, TestId::new(id)).unwrap();
        }
        repo.mark_test_completed(user, TestId::new(4), fixed_now())
            .await
            .unwrap();

        let service = TestListService::new(
            fixed_clock(),
            Arc::new(StaticAuthProvider::signed_in(User::new(user, "Kim"))),
            Arc::new(repo),
        );
        let items = service.list_for_current_user().await.unwrap();

        let summary: Vec<_> = items.iter().map(|i| (i.test.id().value(), i.status)).collect();
        assert_eq!(
            summary,
            vec![
                (1, TestStatus::Missed),
                (2, TestStatus::Open),
                (4, TestStatus::Completed),
                (3, TestStatus::Upcoming),
            ]
        );
        assert!(items[1].can_start());
        assert!(!items[2].can_start());
        assert_eq!(items[2].completed_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn signed_out_user_is_rejected() {
        let service = TestListService::new(
            fixed_clock(),
            Arc::new(StaticAuthProvider::signed_out()),
            Arc::new(InMemoryRepository::new()),
        );
        let err = service.list_for_current_user().await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthenticated));
    }
}
