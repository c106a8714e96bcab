use chrono::{DateTime, Utc};
use exam_core::model::{TestAssignment, TestId, TestMetadata, UserId, WorkBook};
use sqlx::Row;
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{
    backend, id_i64, map_question_row, map_test_row, map_workbook_row, ser, test_i64, user_i64,
    usize_i64,
};
use crate::repository::{StorageError, TestRepository};

impl SqliteRepository {
    /// Insert or replace a test and its workbooks in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any insert fails.
    pub async fn seed_test(
        &self,
        test: &TestMetadata,
        workbooks: &[WorkBook],
    ) -> Result<(), StorageError> {
        let test_id = test_i64(test.id())?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r"
                INSERT INTO tests (id, title, opens_at, closes_at, duration_seconds)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    opens_at = excluded.opens_at,
                    closes_at = excluded.closes_at,
                    duration_seconds = excluded.duration_seconds
            ",
        )
        .bind(test_id)
        .bind(test.title())
        .bind(test.opens_at())
        .bind(test.closes_at())
        .bind(i64::from(test.duration_seconds()))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        sqlx::query("DELETE FROM workbooks WHERE test_id = ?1")
            .bind(test_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for (position, workbook) in workbooks.iter().enumerate() {
            let workbook_id = id_i64("workbook_id", workbook.id().value())?;
            sqlx::query(
                r"
                    INSERT INTO workbooks (id, test_id, position, audio_uri, max_repeats)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(workbook_id)
            .bind(test_id)
            .bind(usize_i64("position", position)?)
            .bind(workbook.audio().uri().to_string())
            .bind(i64::from(workbook.audio().max_repeats()))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            for (q_position, question) in workbook.questions().iter().enumerate() {
                let options = serde_json::to_string(question.options()).map_err(ser)?;
                sqlx::query(
                    r"
                        INSERT INTO questions (
                            id, workbook_id, position, prompt, options, correct_option, mark
                        )
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                )
                .bind(id_i64("question_id", question.id().value())?)
                .bind(workbook_id)
                .bind(usize_i64("position", q_position)?)
                .bind(question.prompt())
                .bind(options)
                .bind(usize_i64("correct_option", question.correct_option())?)
                .bind(i64::from(question.mark()))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            }
        }

        tx.commit().await.map_err(backend)?;
        debug!(test_id = %test.id(), workbooks = workbooks.len(), "seeded test");
        Ok(())
    }

    /// Assign a test to a user. Re-assigning is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the test does not exist.
    pub async fn assign_test(&self, user: UserId, test: TestId) -> Result<(), StorageError> {
        let test_id = test_i64(test)?;
        let exists = sqlx::query("SELECT 1 FROM tests WHERE id = ?1")
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
                INSERT INTO test_assignments (user_id, test_id, assigned_seq)
                VALUES (
                    ?1,
                    ?2,
                    (SELECT COALESCE(MAX(assigned_seq), 0) + 1
                       FROM test_assignments WHERE user_id = ?1)
                )
                ON CONFLICT(user_id, test_id) DO NOTHING
            ",
        )
        .bind(user_i64(user)?)
        .bind(test_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TestRepository for SqliteRepository {
    async fn fetch_tests_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<TestAssignment>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT t.id, t.title, t.opens_at, t.closes_at, t.duration_seconds,
                       c.completed_at
                FROM test_assignments a
                JOIN tests t ON t.id = a.test_id
                LEFT JOIN test_completions c
                       ON c.user_id = a.user_id AND c.test_id = a.test_id
                WHERE a.user_id = ?1
                ORDER BY a.assigned_seq ASC
            ",
        )
        .bind(user_i64(user)?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|row| {
                let test = map_test_row(row)?;
                let completed_at: Option<DateTime<Utc>> =
                    row.try_get("completed_at").map_err(ser)?;
                Ok(TestAssignment::new(test, completed_at))
            })
            .collect()
    }

    async fn fetch_workbooks(&self, test: TestId) -> Result<Vec<WorkBook>, StorageError> {
        let test_id = test_i64(test)?;
        let exists = sqlx::query("SELECT 1 FROM tests WHERE id = ?1")
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let rows = sqlx::query(
            r"
                SELECT id, audio_uri, max_repeats
                FROM workbooks
                WHERE test_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut workbooks = Vec::with_capacity(rows.len());
        for row in &rows {
            let head = map_workbook_row(row)?;
            let question_rows = sqlx::query(
                r"
                    SELECT id, prompt, options, correct_option, mark
                    FROM questions
                    WHERE workbook_id = ?1
                    ORDER BY position ASC
                ",
            )
            .bind(id_i64("workbook_id", head.id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

            let questions = question_rows
                .iter()
                .map(map_question_row)
                .collect::<Result<Vec<_>, _>>()?;
            workbooks.push(WorkBook::new(head.id, head.audio, questions).map_err(ser)?);
        }
        Ok(workbooks)
    }
}
