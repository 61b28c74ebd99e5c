//! Durable persistence of targets, schedules, runs, and attempts.
//!
//! The trait is backend-agnostic; [`sqlite::SqliteStore`] is the shipped
//! implementation against the DSN in [`crate::config::Config`].

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{Attempt, Run, RunStatus, Schedule, ScheduleStatus, Target};

/// Optional paging window for list operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }
}

/// Fields accepted on a run completion update (phase two of the two-phase write).
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub completed_at: DateTime<Utc>,
    pub status_code: Option<i64>,
    pub latency_ms: Option<f64>,
    pub response_size_bytes: Option<i64>,
    pub error_message: Option<String>,
    pub error_type: Option<crate::models::ErrorType>,
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
}

/// System-wide counters mirroring the original admin metrics surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMetrics {
    pub target_count: i64,
    pub schedule_count: i64,
    pub active_schedule_count: i64,
    pub paused_schedule_count: i64,
    pub stopped_schedule_count: i64,
    pub run_count: i64,
    pub runs_last_hour: i64,
}

/// Per-schedule counters mirroring the original admin metrics surface.
#[derive(Clone, Debug, Default)]
pub struct ScheduleMetrics {
    pub total_runs: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub average_latency_ms: Option<f64>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- targets --
    async fn insert_target(&self, target: Target) -> Result<Target, StoreError>;
    async fn update_target(&self, target: Target) -> Result<Target, StoreError>;
    async fn delete_target(&self, id: i64) -> Result<(), StoreError>;
    async fn list_targets(&self) -> Result<Vec<Target>, StoreError>;
    async fn find_target_by_id(&self, id: i64) -> Result<Option<Target>, StoreError>;
    async fn find_target_by_name(&self, name: &str) -> Result<Option<Target>, StoreError>;

    // -- schedules --
    async fn insert_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;
    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;
    async fn delete_schedule(&self, id: i64) -> Result<(), StoreError>;
    async fn list_schedules(
        &self,
        status_filter: Option<ScheduleStatus>,
    ) -> Result<Vec<Schedule>, StoreError>;
    async fn find_schedule_by_id(&self, id: i64) -> Result<Option<Schedule>, StoreError>;
    async fn find_schedule_by_name(&self, name: &str) -> Result<Option<Schedule>, StoreError>;
    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, StoreError>;
    async fn set_schedule_status(
        &self,
        id: i64,
        status: ScheduleStatus,
        stopped_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
    async fn set_schedule_started_at(
        &self,
        id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn set_schedule_job_handle(
        &self,
        id: i64,
        job_handle: Option<String>,
    ) -> Result<(), StoreError>;

    // -- runs / attempts --
    async fn insert_run(&self, run: Run) -> Result<Run, StoreError>;
    async fn update_run(&self, id: i64, outcome: RunOutcome) -> Result<Run, StoreError>;
    async fn insert_attempt(&self, attempt: Attempt) -> Result<Attempt, StoreError>;
    async fn list_runs(
        &self,
        schedule_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<Run>, StoreError>;
    async fn find_run_with_attempts(
        &self,
        id: i64,
    ) -> Result<Option<(Run, Vec<Attempt>)>, StoreError>;

    // -- metrics --
    async fn system_metrics(&self) -> Result<SystemMetrics, StoreError>;
    async fn schedule_metrics(&self, schedule_id: i64) -> Result<ScheduleMetrics, StoreError>;
}
