use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::models::{Attempt, Run, RunStatus, Schedule, ScheduleStatus, Target};

use super::{Page, RunOutcome, ScheduleMetrics, Store, SystemMetrics};

/// SQLite-backed [`Store`] implementation, the default persistence layer.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to `database_url`, creating the database file if absent, and
    /// applies pending migrations from `migrations/`.
    ///
    /// Foreign key enforcement is left off: a target deleted out from under
    /// an active schedule must leave the schedule's row in place so the next
    /// firing can observe the dangling reference and record it as a failed
    /// run (see `recorder::record_missing_target`), rather than have it
    /// silently cascade away. Referential integrity on writes is instead
    /// enforced by the store itself, see `check_target_exists`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Wraps an already-open pool, used by tests that share an in-memory database.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_unique_violation(err: sqlx::Error, entity: &'static str, name: &str) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return StoreError::DuplicateName {
                    entity,
                    name: name.to_string(),
                };
            }
        }
        StoreError::Database(err)
    }

    /// Rejects anything but a syntactically valid, absolute http(s) URL.
    fn validate_url(url: &str) -> Result<(), StoreError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| StoreError::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            _ => Err(StoreError::InvalidUrl(url.to_string())),
        }
    }

    /// A schedule's `target_id` is a foreign key in spirit only (enforcement
    /// is off, see `connect`), so the store checks it itself before the write
    /// lands rather than let a dangling reference through.
    async fn check_target_exists(&self, schedule_id: i64, target_id: i64) -> Result<(), StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM targets WHERE id = ?)")
            .bind(target_id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::DanglingTarget(schedule_id, target_id))
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_target(&self, target: Target) -> Result<Target, StoreError> {
        Self::validate_url(&target.url)?;
        let row = sqlx::query(
            r#"
            INSERT INTO targets (name, url, method, headers, body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, name, url, method, headers, body, created_at, updated_at
            "#,
        )
        .bind(&target.name)
        .bind(&target.url)
        .bind(target.method)
        .bind(&target.headers)
        .bind(&target.body)
        .bind(target.created_at)
        .bind(target.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, "target", &target.name))?;
        row_to_target(&row)
    }

    async fn update_target(&self, target: Target) -> Result<Target, StoreError> {
        Self::validate_url(&target.url)?;
        let updated_at = Utc::now();
        let row = sqlx::query(
            r#"
            UPDATE targets
            SET name = ?, url = ?, method = ?, headers = ?, body = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, name, url, method, headers, body, created_at, updated_at
            "#,
        )
        .bind(&target.name)
        .bind(&target.url)
        .bind(target.method)
        .bind(&target.headers)
        .bind(&target.body)
        .bind(updated_at)
        .bind(target.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, "target", &target.name))?
        .ok_or(StoreError::TargetNotFound(target.id))?;
        row_to_target(&row)
    }

    async fn delete_target(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, url, method, headers, body, created_at, updated_at FROM targets ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_target).collect()
    }

    async fn find_target_by_id(&self, id: i64) -> Result<Option<Target>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, url, method, headers, body, created_at, updated_at FROM targets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_target).transpose()
    }

    async fn find_target_by_name(&self, name: &str) -> Result<Option<Target>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, url, method, headers, body, created_at, updated_at FROM targets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_target).transpose()
    }

    async fn insert_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        if schedule.schedule_type == crate::models::ScheduleType::Window
            && schedule.duration_seconds.is_none()
        {
            return Err(StoreError::MissingWindowDuration);
        }
        self.check_target_exists(schedule.id, schedule.target_id).await?;
        let row = sqlx::query(
            r#"
            INSERT INTO schedules
                (name, target_id, schedule_type, interval_seconds, duration_seconds,
                 status, created_at, started_at, stopped_at, job_handle)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, name, target_id, schedule_type, interval_seconds, duration_seconds,
                      status, created_at, started_at, stopped_at, job_handle
            "#,
        )
        .bind(&schedule.name)
        .bind(schedule.target_id)
        .bind(schedule.schedule_type)
        .bind(schedule.interval_seconds)
        .bind(schedule.duration_seconds)
        .bind(schedule.status)
        .bind(schedule.created_at)
        .bind(schedule.started_at)
        .bind(schedule.stopped_at)
        .bind(&schedule.job_handle)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, "schedule", &schedule.name))?;
        row_to_schedule(&row)
    }

    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        self.check_target_exists(schedule.id, schedule.target_id).await?;
        let row = sqlx::query(
            r#"
            UPDATE schedules
            SET name = ?, target_id = ?, schedule_type = ?, interval_seconds = ?,
                duration_seconds = ?, status = ?, started_at = ?, stopped_at = ?, job_handle = ?
            WHERE id = ?
            RETURNING id, name, target_id, schedule_type, interval_seconds, duration_seconds,
                      status, created_at, started_at, stopped_at, job_handle
            "#,
        )
        .bind(&schedule.name)
        .bind(schedule.target_id)
        .bind(schedule.schedule_type)
        .bind(schedule.interval_seconds)
        .bind(schedule.duration_seconds)
        .bind(schedule.status)
        .bind(schedule.started_at)
        .bind(schedule.stopped_at)
        .bind(&schedule.job_handle)
        .bind(schedule.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_unique_violation(e, "schedule", &schedule.name))?
        .ok_or(StoreError::ScheduleNotFound(schedule.id))?;
        row_to_schedule(&row)
    }

    async fn delete_schedule(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_schedules(
        &self,
        status_filter: Option<ScheduleStatus>,
    ) -> Result<Vec<Schedule>, StoreError> {
        let rows = match status_filter {
            Some(status) => {
                sqlx::query(
                    r#"SELECT id, name, target_id, schedule_type, interval_seconds, duration_seconds,
                              status, created_at, started_at, stopped_at, job_handle
                       FROM schedules WHERE status = ? ORDER BY id"#,
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT id, name, target_id, schedule_type, interval_seconds, duration_seconds,
                              status, created_at, started_at, stopped_at, job_handle
                       FROM schedules ORDER BY id"#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(row_to_schedule).collect()
    }

    async fn find_schedule_by_id(&self, id: i64) -> Result<Option<Schedule>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, name, target_id, schedule_type, interval_seconds, duration_seconds,
                      status, created_at, started_at, stopped_at, job_handle
               FROM schedules WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_schedule).transpose()
    }

    async fn find_schedule_by_name(&self, name: &str) -> Result<Option<Schedule>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, name, target_id, schedule_type, interval_seconds, duration_seconds,
                      status, created_at, started_at, stopped_at, job_handle
               FROM schedules WHERE name = ?"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_schedule).transpose()
    }

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        self.list_schedules(Some(ScheduleStatus::Active)).await
    }

    async fn set_schedule_status(
        &self,
        id: i64,
        status: ScheduleStatus,
        stopped_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE schedules SET status = ?, stopped_at = ? WHERE id = ?")
            .bind(status)
            .bind(stopped_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ScheduleNotFound(id));
        }
        Ok(())
    }

    async fn set_schedule_started_at(
        &self,
        id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE schedules SET started_at = ? WHERE id = ?")
            .bind(started_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ScheduleNotFound(id));
        }
        Ok(())
    }

    async fn set_schedule_job_handle(
        &self,
        id: i64,
        job_handle: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE schedules SET job_handle = ? WHERE id = ?")
            .bind(job_handle)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ScheduleNotFound(id));
        }
        Ok(())
    }

    async fn insert_run(&self, run: Run) -> Result<Run, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO runs
                (schedule_id, status, started_at, completed_at, status_code, latency_ms,
                 response_size_bytes, error_message, error_type, request_url, request_method,
                 request_headers, request_body, response_headers, response_body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, schedule_id, status, started_at, completed_at, status_code, latency_ms,
                      response_size_bytes, error_message, error_type, request_url, request_method,
                      request_headers, request_body, response_headers, response_body
            "#,
        )
        .bind(run.schedule_id)
        .bind(run.status)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.status_code)
        .bind(run.latency_ms)
        .bind(run.response_size_bytes)
        .bind(&run.error_message)
        .bind(run.error_type)
        .bind(&run.request_url)
        .bind(run.request_method)
        .bind(&run.request_headers)
        .bind(&run.request_body)
        .bind(&run.response_headers)
        .bind(&run.response_body)
        .fetch_one(&self.pool)
        .await?;
        row_to_run(&row)
    }

    async fn update_run(&self, id: i64, outcome: RunOutcome) -> Result<Run, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE runs
            SET status = ?, completed_at = ?, status_code = ?, latency_ms = ?,
                response_size_bytes = ?, error_message = ?, error_type = ?,
                response_headers = ?, response_body = ?
            WHERE id = ?
            RETURNING id, schedule_id, status, started_at, completed_at, status_code, latency_ms,
                      response_size_bytes, error_message, error_type, request_url, request_method,
                      request_headers, request_body, response_headers, response_body
            "#,
        )
        .bind(outcome.status)
        .bind(outcome.completed_at)
        .bind(outcome.status_code)
        .bind(outcome.latency_ms)
        .bind(outcome.response_size_bytes)
        .bind(&outcome.error_message)
        .bind(outcome.error_type)
        .bind(&outcome.response_headers)
        .bind(&outcome.response_body)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::RunNotFound(id))?;
        row_to_run(&row)
    }

    async fn insert_attempt(&self, attempt: Attempt) -> Result<Attempt, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO attempts
                (run_id, attempt_number, status, started_at, completed_at, status_code,
                 latency_ms, error_message, error_type)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, run_id, attempt_number, status, started_at, completed_at, status_code,
                      latency_ms, error_message, error_type
            "#,
        )
        .bind(attempt.run_id)
        .bind(attempt.attempt_number)
        .bind(attempt.status)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .bind(attempt.status_code)
        .bind(attempt.latency_ms)
        .bind(&attempt.error_message)
        .bind(attempt.error_type)
        .fetch_one(&self.pool)
        .await?;
        row_to_attempt(&row)
    }

    async fn list_runs(&self, schedule_id: Option<i64>, page: Page) -> Result<Vec<Run>, StoreError> {
        let limit = if page.limit > 0 { page.limit } else { 50 };
        let rows = match schedule_id {
            Some(sid) => {
                sqlx::query(
                    r#"SELECT id, schedule_id, status, started_at, completed_at, status_code, latency_ms,
                              response_size_bytes, error_message, error_type, request_url, request_method,
                              request_headers, request_body, response_headers, response_body
                       FROM runs WHERE schedule_id = ? ORDER BY started_at DESC LIMIT ? OFFSET ?"#,
                )
                .bind(sid)
                .bind(limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT id, schedule_id, status, started_at, completed_at, status_code, latency_ms,
                              response_size_bytes, error_message, error_type, request_url, request_method,
                              request_headers, request_body, response_headers, response_body
                       FROM runs ORDER BY started_at DESC LIMIT ? OFFSET ?"#,
                )
                .bind(limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(row_to_run).collect()
    }

    async fn find_run_with_attempts(
        &self,
        id: i64,
    ) -> Result<Option<(Run, Vec<Attempt>)>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, schedule_id, status, started_at, completed_at, status_code, latency_ms,
                      response_size_bytes, error_message, error_type, request_url, request_method,
                      request_headers, request_body, response_headers, response_body
               FROM runs WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let run = row_to_run(&row)?;

        let attempt_rows = sqlx::query(
            r#"SELECT id, run_id, attempt_number, status, started_at, completed_at, status_code,
                      latency_ms, error_message, error_type
               FROM attempts WHERE run_id = ? ORDER BY attempt_number"#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        let attempts = attempt_rows.iter().map(row_to_attempt).collect::<Result<_, _>>()?;
        Ok(Some((run, attempts)))
    }

    async fn system_metrics(&self) -> Result<SystemMetrics, StoreError> {
        let target_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM targets")
            .fetch_one(&self.pool)
            .await?;
        let schedule_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schedules")
            .fetch_one(&self.pool)
            .await?;
        let active_schedule_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM schedules WHERE status = 'active'")
                .fetch_one(&self.pool)
                .await?;
        let paused_schedule_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM schedules WHERE status = 'paused'")
                .fetch_one(&self.pool)
                .await?;
        let stopped_schedule_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM schedules WHERE status = 'stopped'")
                .fetch_one(&self.pool)
                .await?;
        let run_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs")
            .fetch_one(&self.pool)
            .await?;
        let runs_last_hour: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM runs WHERE started_at >= datetime('now', '-1 hour')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SystemMetrics {
            target_count,
            schedule_count,
            active_schedule_count,
            paused_schedule_count,
            stopped_schedule_count,
            run_count,
            runs_last_hour,
        })
    }

    async fn schedule_metrics(&self, schedule_id: i64) -> Result<ScheduleMetrics, StoreError> {
        let total_runs: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE schedule_id = ?")
                .bind(schedule_id)
                .fetch_one(&self.pool)
                .await?;
        let successful_runs: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM runs WHERE schedule_id = ? AND status = 'success'",
        )
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await?;
        let failed_runs = total_runs - successful_runs;
        let average_latency_ms: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(latency_ms) FROM runs WHERE schedule_id = ? AND latency_ms IS NOT NULL",
        )
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await?;
        let last_run_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(started_at) FROM runs WHERE schedule_id = ?",
        )
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ScheduleMetrics {
            total_runs,
            successful_runs,
            failed_runs,
            average_latency_ms,
            last_run_at,
        })
    }
}

fn row_to_target(row: &SqliteRow) -> Result<Target, StoreError> {
    Ok(Target::builder()
        .id(row.try_get::<i64, _>("id")?)
        .name(row.try_get::<String, _>("name")?)
        .url(row.try_get::<String, _>("url")?)
        .method(row.try_get::<crate::models::HttpMethod, _>("method")?)
        .headers(row.try_get::<Option<String>, _>("headers")?)
        .body(row.try_get::<Option<String>, _>("body")?)
        .created_at(row.try_get::<DateTime<Utc>, _>("created_at")?)
        .updated_at(row.try_get::<DateTime<Utc>, _>("updated_at")?)
        .build())
}

fn row_to_schedule(row: &SqliteRow) -> Result<Schedule, StoreError> {
    Ok(Schedule::builder()
        .id(row.try_get::<i64, _>("id")?)
        .name(row.try_get::<String, _>("name")?)
        .target_id(row.try_get::<i64, _>("target_id")?)
        .schedule_type(row.try_get::<crate::models::ScheduleType, _>("schedule_type")?)
        .interval_seconds(row.try_get::<i64, _>("interval_seconds")?)
        .duration_seconds(row.try_get::<Option<i64>, _>("duration_seconds")?)
        .status(row.try_get::<ScheduleStatus, _>("status")?)
        .created_at(row.try_get::<DateTime<Utc>, _>("created_at")?)
        .started_at(row.try_get::<Option<DateTime<Utc>>, _>("started_at")?)
        .stopped_at(row.try_get::<Option<DateTime<Utc>>, _>("stopped_at")?)
        .job_handle(row.try_get::<Option<String>, _>("job_handle")?)
        .build())
}

fn row_to_run(row: &SqliteRow) -> Result<Run, StoreError> {
    Ok(Run::builder()
        .id(row.try_get::<i64, _>("id")?)
        .schedule_id(row.try_get::<i64, _>("schedule_id")?)
        .status(row.try_get::<RunStatus, _>("status")?)
        .started_at(row.try_get::<DateTime<Utc>, _>("started_at")?)
        .completed_at(row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?)
        .status_code(row.try_get::<Option<i64>, _>("status_code")?)
        .latency_ms(row.try_get::<Option<f64>, _>("latency_ms")?)
        .response_size_bytes(row.try_get::<Option<i64>, _>("response_size_bytes")?)
        .error_message(row.try_get::<Option<String>, _>("error_message")?)
        .error_type(row.try_get::<Option<crate::models::ErrorType>, _>("error_type")?)
        .request_url(row.try_get::<String, _>("request_url")?)
        .request_method(row.try_get::<crate::models::HttpMethod, _>("request_method")?)
        .request_headers(row.try_get::<Option<String>, _>("request_headers")?)
        .request_body(row.try_get::<Option<String>, _>("request_body")?)
        .response_headers(row.try_get::<Option<String>, _>("response_headers")?)
        .response_body(row.try_get::<Option<String>, _>("response_body")?)
        .build())
}

fn row_to_attempt(row: &SqliteRow) -> Result<Attempt, StoreError> {
    Ok(Attempt::builder()
        .id(row.try_get::<i64, _>("id")?)
        .run_id(row.try_get::<i64, _>("run_id")?)
        .attempt_number(row.try_get::<i64, _>("attempt_number")?)
        .status(row.try_get::<RunStatus, _>("status")?)
        .started_at(row.try_get::<DateTime<Utc>, _>("started_at")?)
        .completed_at(row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?)
        .status_code(row.try_get::<Option<i64>, _>("status_code")?)
        .latency_ms(row.try_get::<Option<f64>, _>("latency_ms")?)
        .error_message(row.try_get::<Option<String>, _>("error_message")?)
        .error_type(row.try_get::<Option<crate::models::ErrorType>, _>("error_type")?)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, ScheduleType};

    async fn test_store() -> SqliteStore {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteStore::from_pool(pool)
    }

    #[tokio::test]
    async fn insert_and_find_target() {
        let store = test_store().await;
        let target = Target::builder()
            .name("t1")
            .url("https://example.test")
            .method(HttpMethod::Get)
            .build();
        let inserted = store.insert_target(target).await.unwrap();
        assert!(inserted.id > 0);

        let found = store.find_target_by_name("t1").await.unwrap().unwrap();
        assert_eq!(found.id, inserted.id);
    }

    #[tokio::test]
    async fn duplicate_target_name_rejected() {
        let store = test_store().await;
        let make = || {
            Target::builder()
                .name("dup")
                .url("https://example.test")
                .method(HttpMethod::Get)
                .build()
        };
        store.insert_target(make()).await.unwrap();
        let err = store.insert_target(make()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName { .. }));
    }

    #[tokio::test]
    async fn window_schedule_requires_duration() {
        let store = test_store().await;
        let target = store
            .insert_target(
                Target::builder()
                    .name("t1")
                    .url("https://example.test")
                    .method(HttpMethod::Get)
                    .build(),
            )
            .await
            .unwrap();
        let schedule = Schedule::builder()
            .name("s1")
            .target_id(target.id)
            .schedule_type(ScheduleType::Window)
            .interval_seconds(5i64)
            .build();
        let err = store.insert_schedule(schedule).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingWindowDuration));
    }

    #[tokio::test]
    async fn list_active_schedules_filters_by_status() {
        let store = test_store().await;
        let target = store
            .insert_target(
                Target::builder()
                    .name("t1")
                    .url("https://example.test")
                    .method(HttpMethod::Get)
                    .build(),
            )
            .await
            .unwrap();
        let active = store
            .insert_schedule(
                Schedule::builder()
                    .name("active")
                    .target_id(target.id)
                    .schedule_type(ScheduleType::Interval)
                    .interval_seconds(5i64)
                    .build(),
            )
            .await
            .unwrap();
        let mut paused = Schedule::builder()
            .name("paused")
            .target_id(target.id)
            .schedule_type(ScheduleType::Interval)
            .interval_seconds(5i64)
            .build();
        paused.status = ScheduleStatus::Paused;
        store.insert_schedule(paused).await.unwrap();

        let actives = store.list_active_schedules().await.unwrap();
        assert_eq!(actives.len(), 1);
        assert_eq!(actives[0].id, active.id);
    }

    #[tokio::test]
    async fn malformed_target_url_rejected() {
        let store = test_store().await;
        let target = Target::builder()
            .name("t1")
            .url("not-a-url")
            .method(HttpMethod::Get)
            .build();
        let err = store.insert_target(target).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn non_http_target_url_rejected() {
        let store = test_store().await;
        let target = Target::builder()
            .name("t1")
            .url("ftp://example.test/file")
            .method(HttpMethod::Get)
            .build();
        let err = store.insert_target(target).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn schedule_with_unknown_target_is_rejected() {
        let store = test_store().await;
        let schedule = Schedule::builder()
            .name("s1")
            .target_id(404i64)
            .schedule_type(ScheduleType::Interval)
            .interval_seconds(5i64)
            .build();
        let err = store.insert_schedule(schedule).await.unwrap_err();
        assert!(matches!(err, StoreError::DanglingTarget(_, 404)));
    }

    #[tokio::test]
    async fn target_can_be_deleted_out_from_under_a_schedule() {
        let store = test_store().await;
        let target = store
            .insert_target(
                Target::builder()
                    .name("t1")
                    .url("https://example.test")
                    .method(HttpMethod::Get)
                    .build(),
            )
            .await
            .unwrap();
        let schedule = store
            .insert_schedule(
                Schedule::builder()
                    .name("s1")
                    .target_id(target.id)
                    .schedule_type(ScheduleType::Interval)
                    .interval_seconds(5i64)
                    .build(),
            )
            .await
            .unwrap();

        store.delete_target(target.id).await.unwrap();

        let reloaded = store.find_schedule_by_id(schedule.id).await.unwrap();
        assert!(
            reloaded.is_some(),
            "schedule must survive its target's deletion so a firing can observe and record it as missing"
        );
    }
}
