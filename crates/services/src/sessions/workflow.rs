use std::sync::Arc;

use exam_core::model::{TestId, TestStatus};
use storage::repository::Storage;
use tracing::warn;

use super::controller::{SessionController, SessionParts};
use crate::audio::AudioProvider;
use crate::auth::AuthProvider;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::ticks::TickSource;
use crate::Clock;

/// Resolves a test for the signed-in user and starts its session.
#[derive(Clone)]
pub struct SessionLauncher {
    clock: Clock,
    auth: Arc<dyn AuthProvider>,
    storage: Storage,
    audio: Arc<dyn AudioProvider>,
    ticks: Arc<dyn TickSource>,
    config: SessionConfig,
}

impl SessionLauncher {
    #[must_use]
    pub fn new(
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
        storage: Storage,
        audio: Arc<dyn AudioProvider>,
        ticks: Arc<dyn TickSource>,
    ) -> Self {
        Self {
            clock,
            auth,
            storage,
            audio,
            ticks,
            config: SessionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session for `test_id`. The countdown begins immediately.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Unauthenticated` without a signed-in user,
    /// `TestNotAssigned` or `TestNotOpen` when the test cannot be taken now,
    /// and `Sequencer(Empty)` when it has no workbooks.
    pub async fn start(&self, test_id: TestId) -> Result<SessionController, SessionError> {
        let user = self.auth.current_user().ok_or(SessionError::Unauthenticated)?;

        let assignment = self
            .storage
            .tests
            .fetch_tests_for_user(user.id)
            .await?
            .into_iter()
            .find(|a| a.test.id() == test_id)
            .ok_or(SessionError::TestNotAssigned { test: test_id })?;

        let status = assignment.status(self.clock.now());
        if status != TestStatus::Open {
            warn!(test = %test_id, ?status, "refusing to start test");
            return Err(SessionError::TestNotOpen {
                test: test_id,
                status,
            });
        }

        let workbooks = self.storage.tests.fetch_workbooks(test_id).await?;
        SessionController::spawn(SessionParts {
            user,
            test: assignment.test,
            workbooks,
            storage: self.storage.clone(),
            audio: Arc::clone(&self.audio),
            ticks: Arc::clone(&self.ticks),
            clock: self.clock,
            config: self.config.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioHandle;
    use crate::auth::StaticAuthProvider;
    use crate::error::{PlaybackError, SequencerError};
    use crate::ticks::ManualClock;
    use async_trait::async_trait;
    use chrono::Duration;
    use exam_core::model::{
        AudioTrack, AudioUri, Question, QuestionId, SessionState, TestMetadata, User, UserId,
        WorkBook, WorkbookId,
    };
    use exam_core::time::{fixed_clock, fixed_now};
    use storage::repository::{AnswerRepository, InMemoryRepository};

    struct NoAudio;

    #[async_trait]
    impl AudioProvider for NoAudio {
        async fn open(&self, _uri: &AudioUri) -> Result<Box<dyn AudioHandle>, PlaybackError> {
            Err(PlaybackError::Unavailable("no audio in tests".into()))
        }
    }

    fn test_meta(id: u64, opens_in_hours: i64) -> TestMetadata {
        let opens = fixed_now() + Duration::hours(opens_in_hours);
        TestMetadata::new(TestId::new(id), "Listening", opens, opens + Duration::hours(2), 60)
            .unwrap()
    }

    fn workbook(id: u64) -> WorkBook {
        let question = Question::new(
            QuestionId::new(1),
            "Where is the station?",
            vec!["North".into(), "South".into()],
            0,
            1,
        )
        .unwrap();
        WorkBook::new(
            WorkbookId::new(id),
            AudioTrack::new(AudioUri::from_file("part.mp3").unwrap(), 2),
            vec![question],
        )
        .unwrap()
    }

    fn launcher(repo: &InMemoryRepository, signed_in: bool) -> SessionLauncher {
        let user = User::new(UserId::new(7), "Ana");
        let auth = if signed_in {
            StaticAuthProvider::signed_in(user)
        } else {
            StaticAuthProvider::signed_out()
        };
        SessionLauncher::new(
            fixed_clock(),
            Arc::new(auth),
            Storage::from_in_memory(repo.clone()),
            Arc::new(NoAudio),
            Arc::new(ManualClock::new()),
        )
    }

    #[tokio::test]
    async fn requires_a_signed_in_user() {
        let repo = InMemoryRepository::new();
        let err = launcher(&repo, false).start(TestId::new(1)).await.unwrap_err();
        assert!(matches!(err, SessionError::Unauthenticated));
    }

    #[tokio::test]
    async fn rejects_unassigned_test() {
        let repo = InMemoryRepository::new();
        repo.insert_test(test_meta(1, -1), vec![workbook(1)]).unwrap();
        let err = launcher(&repo, true).start(TestId::new(1)).await.unwrap_err();
        assert!(matches!(err, SessionError::TestNotAssigned { .. }));
    }

    #[tokio::test]
    async fn rejects_test_outside_its_window() {
        let repo = InMemoryRepository::new();
        repo.insert_test(test_meta(1, 3), vec![workbook(1)]).unwrap();
        repo.assign_test(UserId::new(7), TestId::new(1)).unwrap();
        let err = launcher(&repo, true).start(TestId::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::TestNotOpen {
                status: TestStatus::Upcoming,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn rejects_completed_test() {
        let repo = InMemoryRepository::new();
        repo.insert_test(test_meta(1, -1), vec![workbook(1)]).unwrap();
        repo.assign_test(UserId::new(7), TestId::new(1)).unwrap();
        repo.mark_test_completed(UserId::new(7), TestId::new(1), fixed_now())
            .await
            .unwrap();
        let err = launcher(&repo, true).start(TestId::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::TestNotOpen {
                status: TestStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn rejects_test_without_workbooks() {
        let repo = InMemoryRepository::new();
        repo.insert_test(test_meta(1, -1), Vec::new()).unwrap();
        repo.assign_test(UserId::new(7), TestId::new(1)).unwrap();
        let err = launcher(&repo, true).start(TestId::new(1)).await.unwrap_err();
        assert!(matches!(err, SessionError::Sequencer(SequencerError::Empty)));
    }

    #[tokio::test]
    async fn open_test_starts_running() {
        let repo = InMemoryRepository::new();
        repo.insert_test(test_meta(1, -1), vec![workbook(1), workbook(2)]).unwrap();
        repo.assign_test(UserId::new(7), TestId::new(1)).unwrap();
        let session = launcher(&repo, true).start(TestId::new(1)).await.unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Running);
        assert_eq!(snapshot.total_seconds, 60);
        assert_eq!(snapshot.workbook_count, 2);
        assert_eq!(snapshot.workbook_id, WorkbookId::new(1));
        assert!(!snapshot.is_last_workbook);
        assert_eq!(session.exit().await.unwrap(), SessionState::Exited);
    }
}
