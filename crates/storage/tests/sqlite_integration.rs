use std::collections::HashMap;

use chrono::Duration;
use exam_core::model::{
    AnswerRecord, AudioTrack, AudioUri, Question, QuestionId, TestId, TestMetadata, UserId,
    WorkBook, WorkbookId,
};
use exam_core::time::fixed_now;
use storage::repository::{AnswerRepository, StorageError, TestRepository};
use storage::sqlite::SqliteRepository;

fn question(id: u64, correct: usize, mark: u32) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        vec!["alpha".into(), "beta".into(), "gamma".into()],
        correct,
        mark,
    )
    .unwrap()
}

fn workbook(id: u64, repeats: u32) -> WorkBook {
    WorkBook::new(
        WorkbookId::new(id),
        AudioTrack::new(
            AudioUri::from_url(format!("https://cdn.example.com/part{id}.mp3")).unwrap(),
            repeats,
        ),
        vec![question(id * 10 + 1, 0, 10), question(id * 10 + 2, 2, 5)],
    )
    .unwrap()
}

fn metadata(id: u64) -> TestMetadata {
    let now = fixed_now();
    TestMetadata::new(
        TestId::new(id),
        format!("Listening {id}"),
        now,
        now + Duration::hours(2),
        1200,
    )
    .unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrips_workbooks_in_order() {
    let repo = connect("memdb_workbooks").await;
    let workbooks = vec![workbook(2, 3), workbook(1, 0)];
    repo.seed_test(&metadata(1), &workbooks).await.unwrap();

    let fetched = repo.fetch_workbooks(TestId::new(1)).await.unwrap();
    assert_eq!(fetched, workbooks);
    assert_eq!(fetched[0].audio().max_repeats(), 3);
}

#[tokio::test]
async fn sqlite_lists_assignments_with_completion() {
    let repo = connect("memdb_assignments").await;
    let user = UserId::new(7);
    repo.seed_test(&metadata(1), &[workbook(1, 2)]).await.unwrap();
    repo.seed_test(&metadata(2), &[workbook(2, 2)]).await.unwrap();
    repo.assign_test(user, TestId::new(2)).await.unwrap();
    repo.assign_test(user, TestId::new(1)).await.unwrap();
    repo.assign_test(user, TestId::new(1)).await.unwrap();

    repo.mark_test_completed(user, TestId::new(1), fixed_now())
        .await
        .unwrap();

    let listed = repo.fetch_tests_for_user(user).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|a| a.test.id()).collect();
    assert_eq!(ids, vec![TestId::new(2), TestId::new(1)]);
    assert_eq!(listed[0].completed_at, None);
    assert_eq!(listed[1].completed_at, Some(fixed_now()));
}

#[tokio::test]
async fn sqlite_upserts_answer_records() {
    let repo = connect("memdb_answers").await;
    let user = UserId::new(3);
    let wb = workbook(1, 2);
    repo.seed_test(&metadata(1), &[wb.clone()]).await.unwrap();

    let first = AnswerRecord::grade(
        &wb,
        &HashMap::from([(QuestionId::new(11), 1)]),
        fixed_now(),
    );
    let second = AnswerRecord::grade(
        &wb,
        &HashMap::from([(QuestionId::new(11), 0), (QuestionId::new(12), 2)]),
        fixed_now() + Duration::seconds(30),
    );
    repo.save_answers(user, TestId::new(1), &first).await.unwrap();
    repo.save_answers(user, TestId::new(1), &second).await.unwrap();

    let saved = repo.list_answers(user, TestId::new(1)).await.unwrap();
    assert_eq!(saved, vec![second]);
    assert_eq!(saved[0].marks_obtained(), 15);
}

#[tokio::test]
async fn sqlite_rejects_unknown_test() {
    let repo = connect("memdb_unknown").await;
    let err = repo.fetch_workbooks(TestId::new(99)).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    let err = repo
        .assign_test(UserId::new(1), TestId::new(99))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_completion_is_first_write_wins() {
    let repo = connect("memdb_completion").await;
    let user = UserId::new(1);
    repo.seed_test(&metadata(1), &[workbook(1, 1)]).await.unwrap();

    repo.mark_test_completed(user, TestId::new(1), fixed_now())
        .await
        .unwrap();
    repo.mark_test_completed(user, TestId::new(1), fixed_now() + Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(
        repo.completed_at(user, TestId::new(1)).await.unwrap(),
        Some(fixed_now())
    );
}

#[tokio::test]
async fn sqlite_closed_pool_is_a_network_failure() {
    let repo = connect("memdb_closed").await;
    repo.seed_test(&metadata(1), &[workbook(1, 1)]).await.unwrap();
    repo.pool().close().await;

    let err = repo.fetch_workbooks(TestId::new(1)).await.unwrap_err();
    assert!(matches!(err, StorageError::Network(_)), "{err:?}");
    assert!(err.is_transient());

    let err = repo
        .mark_test_completed(UserId::new(1), TestId::new(1), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Network(_)), "{err:?}");
}
