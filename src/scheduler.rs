//! Owns the job registry, turns schedule rows into timers, and drives the
//! admin-facing lifecycle (start/shutdown/rehydrate/add/pause/resume/remove).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::SchedulerError;
use crate::executor::{ExecutionRequest, Executor};
use crate::models::{Schedule, ScheduleStatus, ScheduleType};
use crate::recorder::RunRecorder;
use crate::registry::{JobRegistry, Trigger};
use crate::store::Store;

pub struct SchedulerService {
    store: Arc<dyn Store>,
    registry: Arc<JobRegistry>,
    executor: Arc<Executor>,
    recorder: Arc<RunRecorder>,
}

impl SchedulerService {
    pub fn new(
        store: Arc<dyn Store>,
        default_timeout: Duration,
        max_concurrent_jobs: usize,
    ) -> anyhow::Result<Arc<Self>> {
        let executor = Arc::new(Executor::new(default_timeout)?);
        let recorder = Arc::new(RunRecorder::new(Arc::clone(&store)));
        let registry = Arc::new(JobRegistry::new(max_concurrent_jobs));
        Ok(Arc::new(Self {
            store,
            registry,
            executor,
            recorder,
        }))
    }

    /// Begins servicing timers. Idempotent: the registry is already live
    /// from construction, so this exists purely as a lifecycle marker for
    /// callers and future pre-flight checks.
    pub async fn start(self: &Arc<Self>) {
        info!("scheduler service started");
    }

    /// Stops accepting new firings and cancels every registered timer.
    /// In-flight HTTP calls are not aborted; they run to their own timeout.
    pub async fn shutdown(self: &Arc<Self>) {
        info!("scheduler service shutting down");
        self.registry.clear().await;
    }

    /// Loads every ACTIVE schedule and installs its timer. Per-schedule
    /// failures are logged and skipped; they never abort the whole pass.
    pub async fn rehydrate(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let schedules = self.store.list_active_schedules().await?;
        for schedule in schedules {
            let id = schedule.id;
            if let Err(err) = self.add_job(&schedule).await {
                warn!(schedule_id = id, error = %err, "failed to rehydrate schedule, skipping");
            }
        }
        Ok(())
    }

    /// Installs (or replaces) the timer for `schedule`.
    pub async fn add_job(self: &Arc<Self>, schedule: &Schedule) -> Result<(), SchedulerError> {
        match schedule.schedule_type {
            ScheduleType::Interval => {
                self.install_recurring(schedule, None).await;
            }
            ScheduleType::Window => {
                self.add_window_job(schedule).await?;
            }
        }
        Ok(())
    }

    async fn add_window_job(self: &Arc<Self>, schedule: &Schedule) -> Result<(), SchedulerError> {
        let duration_seconds = schedule
            .duration_seconds
            .ok_or(crate::error::StoreError::MissingWindowDuration)?;

        let started_at = match schedule.started_at {
            Some(started_at) => started_at,
            None => {
                let now = Utc::now();
                self.store.set_schedule_started_at(schedule.id, now).await?;
                now
            }
        };
        let end_time = started_at + chrono::Duration::seconds(duration_seconds);

        if Utc::now() >= end_time {
            self.store
                .set_schedule_status(schedule.id, ScheduleStatus::Stopped, Some(Utc::now()))
                .await?;
            return Ok(());
        }

        self.install_recurring(schedule, Some(end_time)).await;

        let stop_service = Arc::clone(self);
        let schedule_id = schedule.id;
        self.registry
            .add_job(schedule.stop_job_name(), Trigger::Once { at: end_time }, move || {
                let service = Arc::clone(&stop_service);
                async move { service.on_stop(schedule_id).await }
            })
            .await;

        Ok(())
    }

    async fn install_recurring(self: &Arc<Self>, schedule: &Schedule, end_time: Option<chrono::DateTime<Utc>>) {
        let fire_service = Arc::clone(self);
        let schedule_id = schedule.id;
        let interval = Duration::from_secs(schedule.interval_seconds.max(1) as u64);

        self.registry
            .add_job(
                schedule.job_name(),
                Trigger::Recurring { interval, end_time },
                move || {
                    let service = Arc::clone(&fire_service);
                    async move { service.on_fire(schedule_id).await }
                },
            )
            .await;

        if let Err(err) = self
            .store
            .set_schedule_job_handle(schedule.id, Some(schedule.job_name()))
            .await
        {
            warn!(schedule_id = schedule.id, error = %err, "failed to persist job_handle");
        }
    }

    pub async fn pause_job(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        if !self.registry.pause_job(&schedule.job_name()).await {
            return Err(SchedulerError::NotRegistered(schedule.job_name()));
        }
        Ok(())
    }

    pub async fn resume_job(self: &Arc<Self>, schedule: &Schedule) -> Result<(), SchedulerError> {
        if self.registry.has_job(&schedule.job_name()).await {
            self.registry.resume_job(&schedule.job_name()).await;
        } else {
            self.add_job(schedule).await?;
        }
        Ok(())
    }

    pub async fn remove_job(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        self.registry.remove_job(&schedule.job_name()).await;
        self.registry.remove_job(&schedule.stop_job_name()).await;
        self.store.set_schedule_job_handle(schedule.id, None).await?;
        Ok(())
    }

    async fn on_stop(&self, schedule_id: i64) {
        if let Err(err) = self
            .store
            .set_schedule_status(schedule_id, ScheduleStatus::Stopped, Some(Utc::now()))
            .await
        {
            error!(schedule_id, error = %err, "failed to mark schedule stopped");
        }
        self.registry.remove_job(&format!("schedule_{schedule_id}")).await;
    }

    async fn on_fire(&self, schedule_id: i64) {
        let schedule = match self.store.find_schedule_by_id(schedule_id).await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => return,
            Err(err) => {
                error!(schedule_id, error = %err, "failed to load schedule for firing");
                return;
            }
        };

        if schedule.status != ScheduleStatus::Active {
            return;
        }

        let target = match self.store.find_target_by_id(schedule.target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!(schedule_id, target_id = schedule.target_id, "target missing at firing time");
                if let Err(err) = self
                    .recorder
                    .record_missing_target(schedule_id, schedule.target_id)
                    .await
                {
                    error!(schedule_id, error = %err, "failed to record missing-target run");
                }
                return;
            }
            Err(err) => {
                error!(schedule_id, error = %err, "failed to load target for firing");
                return;
            }
        };

        let request = ExecutionRequest {
            url: target.url.clone(),
            method: target.method,
            headers: target.headers_map(),
            body: target.body.clone(),
        };

        let run = match self.recorder.begin(schedule_id, &request).await {
            Ok(run) => run,
            Err(err) => {
                error!(schedule_id, error = %err, "failed to persist provisional run");
                return;
            }
        };

        let outcome = self.executor.execute(request).await;

        if let Err(err) = self.recorder.complete(run.id, outcome).await {
            error!(schedule_id, run_id = run.id, error = %err, "failed to persist run outcome");
        }
    }
}
