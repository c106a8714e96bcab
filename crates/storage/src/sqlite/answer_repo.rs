use chrono::{DateTime, Utc};
use exam_core::model::{AnswerRecord, TestId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{backend, id_i64, map_answer_row, ser, test_i64, user_i64};
use crate::repository::{AnswerRepository, StorageError};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn save_answers(
        &self,
        user: UserId,
        test: TestId,
        record: &AnswerRecord,
    ) -> Result<(), StorageError> {
        let answers = serde_json::to_string(record.answers()).map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO answer_records (
                    user_id, test_id, workbook_id, answers,
                    marks_obtained, maximum_marks, submitted_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(user_id, test_id, workbook_id) DO UPDATE SET
                    answers = excluded.answers,
                    marks_obtained = excluded.marks_obtained,
                    maximum_marks = excluded.maximum_marks,
                    submitted_at = excluded.submitted_at
            ",
        )
        .bind(user_i64(user)?)
        .bind(test_i64(test)?)
        .bind(id_i64("workbook_id", record.workbook_id().value())?)
        .bind(answers)
        .bind(i64::from(record.marks_obtained()))
        .bind(i64::from(record.maximum_marks()))
        .bind(record.submitted_at())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn mark_test_completed(
        &self,
        user: UserId,
        test: TestId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO test_completions (user_id, test_id, completed_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, test_id) DO NOTHING
            ",
        )
        .bind(user_i64(user)?)
        .bind(test_i64(test)?)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn list_answers(
        &self,
        user: UserId,
        test: TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT workbook_id, answers, marks_obtained, maximum_marks, submitted_at
                FROM answer_records
                WHERE user_id = ?1 AND test_id = ?2
                ORDER BY id ASC
            ",
        )
        .bind(user_i64(user)?)
        .bind(test_i64(test)?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(map_answer_row).collect()
    }

    async fn completed_at(
        &self,
        user: UserId,
        test: TestId,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT completed_at FROM test_completions
                WHERE user_id = ?1 AND test_id = ?2
            ",
        )
        .bind(user_i64(user)?)
        .bind(test_i64(test)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|r| r.try_get::<DateTime<Utc>, _>("completed_at").map_err(ser))
            .transpose()
    }
}
