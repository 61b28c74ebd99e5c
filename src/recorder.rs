//! Two-phase durable write around one firing: insert a provisional run
//! before the request goes out, then update it (plus its attempt) once the
//! executor returns. This is what makes a stuck firing visible in the
//! ledger as `status = failed, completed_at IS NULL` instead of invisible.

use std::sync::Arc;

use chrono::Utc;

use crate::error::StoreError;
use crate::executor::{ExecutionOutcome, ExecutionRequest};
use crate::models::{Attempt, Run};
use crate::store::{RunOutcome, Store};

pub struct RunRecorder {
    store: Arc<dyn Store>,
}

impl RunRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Phase one: persist a provisional run for `schedule_id` before firing.
    pub async fn begin(&self, schedule_id: i64, request: &ExecutionRequest) -> Result<Run, StoreError> {
        let headers_json = serde_json::to_string(&request.headers).ok();
        let run = Run::builder()
            .schedule_id(schedule_id)
            .request_url(request.url.clone())
            .request_method(request.method)
            .request_headers(headers_json)
            .request_body(request.body.clone())
            .started_at(Utc::now())
            .build();
        self.store.insert_run(run).await
    }

    /// Phase two: fold the executor's outcome into the run and its attempt.
    pub async fn complete(&self, run_id: i64, outcome: ExecutionOutcome) -> Result<Run, StoreError> {
        let completed_at = Utc::now();
        let run_outcome = RunOutcome {
            status: outcome.status,
            completed_at,
            status_code: outcome.status_code,
            latency_ms: Some(outcome.latency_ms),
            response_size_bytes: outcome.response_size_bytes,
            error_message: outcome.error_message.clone(),
            error_type: outcome.error_type,
            response_headers: outcome.response_headers,
            response_body: outcome.response_body,
        };
        let run = self.store.update_run(run_id, run_outcome).await?;

        let attempt = Attempt::builder()
            .run_id(run_id)
            .attempt_number(1i64)
            .status(run.status)
            .started_at(run.started_at)
            .completed_at(Some(completed_at))
            .status_code(run.status_code)
            .latency_ms(run.latency_ms)
            .error_message(run.error_message.clone())
            .error_type(run.error_type)
            .build();
        self.store.insert_attempt(attempt).await?;

        Ok(run)
    }

    /// Records a firing that never reached the executor (e.g. a missing
    /// target) as a terminal failed run rather than leaving no trace.
    pub async fn record_missing_target(&self, schedule_id: i64, target_id: i64) -> Result<Run, StoreError> {
        let now = Utc::now();
        let run = Run::builder()
            .schedule_id(schedule_id)
            .request_url(String::new())
            .request_method(crate::models::HttpMethod::Get)
            .started_at(now)
            .status(crate::models::RunStatus::Failed)
            .completed_at(Some(now))
            .error_type(Some(crate::models::ErrorType::Unknown))
            .error_message(Some(format!("target {target_id} no longer exists")))
            .build();
        let run = self.store.insert_run(run).await?;

        let attempt = Attempt::builder()
            .run_id(run.id)
            .attempt_number(1i64)
            .status(run.status)
            .started_at(run.started_at)
            .completed_at(run.completed_at)
            .error_type(run.error_type)
            .error_message(run.error_message.clone())
            .build();
        self.store.insert_attempt(attempt).await?;

        Ok(run)
    }
}
