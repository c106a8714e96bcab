use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerRecord, AnsweredQuestion, AudioTrack, AudioUri, Question, QuestionId, TestId,
    TestMetadata, UserId, WorkbookId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Classify a driver error. Anything not about the data itself is a transport failure.
pub(crate) fn backend(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        decode @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. }) => StorageError::Serialization(decode.to_string()),
        other => StorageError::Network(other.to_string()),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn usize_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_i64(user: UserId) -> Result<i64, StorageError> {
    id_i64("user_id", user.value())
}

pub(crate) fn test_i64(test: TestId) -> Result<i64, StorageError> {
    id_i64("test_id", test.value())
}

pub(crate) fn map_test_row(row: &sqlx::sqlite::SqliteRow) -> Result<TestMetadata, StorageError> {
    let id = TestId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?);
    let title: String = row.try_get("title").map_err(ser)?;
    let opens_at: DateTime<Utc> = row.try_get("opens_at").map_err(ser)?;
    let closes_at: DateTime<Utc> = row.try_get("closes_at").map_err(ser)?;
    let duration = u32_from_i64(
        "duration_seconds",
        row.try_get::<i64, _>("duration_seconds").map_err(ser)?,
    )?;
    TestMetadata::new(id, title, opens_at, closes_at, duration).map_err(ser)
}

/// Workbook columns without its questions; questions are joined in afterwards.
pub(crate) struct WorkbookRow {
    pub id: WorkbookId,
    pub audio: AudioTrack,
}

pub(crate) fn map_workbook_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkbookRow, StorageError> {
    let id = WorkbookId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?);
    let uri: String = row.try_get("audio_uri").map_err(ser)?;
    let max_repeats = u32_from_i64(
        "max_repeats",
        row.try_get::<i64, _>("max_repeats").map_err(ser)?,
    )?;
    Ok(WorkbookRow {
        id,
        audio: AudioTrack::new(AudioUri::parse(&uri).map_err(ser)?, max_repeats),
    })
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let id = QuestionId::new(i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?);
    let prompt: String = row.try_get("prompt").map_err(ser)?;
    let options_json: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;
    let correct = usize_from_i64(
        "correct_option",
        row.try_get::<i64, _>("correct_option").map_err(ser)?,
    )?;
    let mark = u32_from_i64("mark", row.try_get::<i64, _>("mark").map_err(ser)?)?;
    Question::new(id, prompt, options, correct, mark).map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    let workbook_id = WorkbookId::new(i64_to_u64(
        "workbook_id",
        row.try_get::<i64, _>("workbook_id").map_err(ser)?,
    )?);
    let answers_json: String = row.try_get("answers").map_err(ser)?;
    let answers: Vec<AnsweredQuestion> = serde_json::from_str(&answers_json).map_err(ser)?;
    let marks_obtained = u32_from_i64(
        "marks_obtained",
        row.try_get::<i64, _>("marks_obtained").map_err(ser)?,
    )?;
    let maximum_marks = u32_from_i64(
        "maximum_marks",
        row.try_get::<i64, _>("maximum_marks").map_err(ser)?,
    )?;
    let submitted_at: DateTime<Utc> = row.try_get("submitted_at").map_err(ser)?;

    AnswerRecord::from_persisted(
        workbook_id,
        answers,
        marks_obtained,
        maximum_marks,
        submitted_at,
    )
    .map_err(ser)
}
