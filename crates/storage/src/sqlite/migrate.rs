use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the catalogue (tests, assignments, workbooks, questions) and the
/// submission tables (answer records, completions).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS tests (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                opens_at TEXT NOT NULL,
                closes_at TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL CHECK (duration_seconds > 0)
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS test_assignments (
                user_id INTEGER NOT NULL,
                test_id INTEGER NOT NULL,
                assigned_seq INTEGER NOT NULL,
                PRIMARY KEY (user_id, test_id),
                FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS workbooks (
                id INTEGER PRIMARY KEY,
                test_id INTEGER NOT NULL,
                position INTEGER NOT NULL CHECK (position >= 0),
                audio_uri TEXT NOT NULL,
                max_repeats INTEGER NOT NULL CHECK (max_repeats >= 0),
                UNIQUE (test_id, position),
                FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER NOT NULL,
                workbook_id INTEGER NOT NULL,
                position INTEGER NOT NULL CHECK (position >= 0),
                prompt TEXT NOT NULL,
                options TEXT NOT NULL,
                correct_option INTEGER NOT NULL CHECK (correct_option >= 0),
                mark INTEGER NOT NULL CHECK (mark > 0),
                PRIMARY KEY (workbook_id, id),
                FOREIGN KEY (workbook_id) REFERENCES workbooks(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS answer_records (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                test_id INTEGER NOT NULL,
                workbook_id INTEGER NOT NULL,
                answers TEXT NOT NULL,
                marks_obtained INTEGER NOT NULL CHECK (marks_obtained >= 0),
                maximum_marks INTEGER NOT NULL CHECK (maximum_marks >= 0),
                submitted_at TEXT NOT NULL,
                UNIQUE (user_id, test_id, workbook_id),
                FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS test_completions (
                user_id INTEGER NOT NULL,
                test_id INTEGER NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (user_id, test_id),
                FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE
            );
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            CREATE INDEX IF NOT EXISTS idx_questions_workbook_position
                ON questions (workbook_id, position);
        ",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(())
}
