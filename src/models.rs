use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// HTTP verb a [`Target`] is invoked with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// True for the verbs whose body is eligible for JSON-body detection per the executor.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// An HTTP endpoint specification admins attach schedules to.
#[derive(Clone, Debug, Serialize, Deserialize, TypedBuilder, sqlx::FromRow)]
#[builder(field_defaults(setter(into)))]
pub struct Target {
    #[builder(default = 0)]
    pub id: i64,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    #[builder(default)]
    pub headers: Option<String>,
    #[builder(default)]
    pub body: Option<String>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Target {
    /// Parses the stored header blob. Malformed JSON is treated as "no headers".
    pub fn headers_map(&self) -> HashMap<String, String> {
        self.headers
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// How a [`Schedule`] repeats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Interval,
    Window,
}

/// Lifecycle state of a [`Schedule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Stopped,
}

/// A recurring (or bounded) firing rule bound to one [`Target`].
#[derive(Clone, Debug, Serialize, Deserialize, TypedBuilder, sqlx::FromRow)]
#[builder(field_defaults(setter(into)))]
pub struct Schedule {
    #[builder(default = 0)]
    pub id: i64,
    pub name: String,
    pub target_id: i64,
    pub schedule_type: ScheduleType,
    pub interval_seconds: i64,
    #[builder(default)]
    pub duration_seconds: Option<i64>,
    #[builder(default = ScheduleStatus::Active)]
    pub status: ScheduleStatus,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub job_handle: Option<String>,
}

impl Schedule {
    /// The opaque registry job name for this schedule's main timer.
    pub fn job_name(&self) -> String {
        format!("schedule_{}", self.id)
    }

    /// The opaque registry job name for this schedule's WINDOW stop hook.
    pub fn stop_job_name(&self) -> String {
        format!("{}_stop", self.job_name())
    }

    /// For WINDOW schedules with a known start, the instant the window closes.
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        match (self.schedule_type, self.started_at, self.duration_seconds) {
            (ScheduleType::Window, Some(started_at), Some(duration_seconds)) => {
                Some(started_at + chrono::Duration::seconds(duration_seconds))
            }
            _ => None,
        }
    }
}

/// Terminal outcome of a firing, shared by [`Run`] and [`Attempt`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Timeout,
    DnsError,
    ConnectionError,
}

/// Finer-grained classification of a non-success [`RunStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Http4xx,
    Http5xx,
    HttpUnexpected,
    Timeout,
    Dns,
    Connection,
    Unknown,
}

/// One firing of one [`Schedule`]: exactly one attempted request.
#[derive(Clone, Debug, Serialize, Deserialize, TypedBuilder, sqlx::FromRow)]
#[builder(field_defaults(setter(into)))]
pub struct Run {
    #[builder(default = 0)]
    pub id: i64,
    pub schedule_id: i64,
    #[builder(default = RunStatus::Failed)]
    pub status: RunStatus,
    #[builder(default = Utc::now())]
    pub started_at: DateTime<Utc>,
    #[builder(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub status_code: Option<i64>,
    #[builder(default)]
    pub latency_ms: Option<f64>,
    #[builder(default)]
    pub response_size_bytes: Option<i64>,
    #[builder(default)]
    pub error_message: Option<String>,
    #[builder(default)]
    pub error_type: Option<ErrorType>,
    pub request_url: String,
    pub request_method: HttpMethod,
    #[builder(default)]
    pub request_headers: Option<String>,
    #[builder(default)]
    pub request_body: Option<String>,
    #[builder(default)]
    pub response_headers: Option<String>,
    #[builder(default)]
    pub response_body: Option<String>,
}

/// A subordinate execution record of one try within a [`Run`].
///
/// This version always produces exactly one attempt per run; the table
/// exists so the run contract is stable if per-firing retries are added.
#[derive(Clone, Debug, Serialize, Deserialize, TypedBuilder, sqlx::FromRow)]
#[builder(field_defaults(setter(into)))]
pub struct Attempt {
    #[builder(default = 0)]
    pub id: i64,
    pub run_id: i64,
    #[builder(default = 1)]
    pub attempt_number: i64,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[builder(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub status_code: Option<i64>,
    #[builder(default)]
    pub latency_ms: Option<f64>,
    #[builder(default)]
    pub error_message: Option<String>,
    #[builder(default)]
    pub error_type: Option<ErrorType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_end_requires_started_at() {
        let schedule = Schedule::builder()
            .name("s1")
            .target_id(1i64)
            .schedule_type(ScheduleType::Window)
            .interval_seconds(1i64)
            .duration_seconds(Some(30i64))
            .build();
        assert!(schedule.window_end().is_none());
    }

    #[test]
    fn window_end_computed_once_started() {
        let now = Utc::now();
        let schedule = Schedule::builder()
            .name("s1")
            .target_id(1i64)
            .schedule_type(ScheduleType::Window)
            .interval_seconds(1i64)
            .duration_seconds(Some(30i64))
            .started_at(Some(now))
            .build();
        assert_eq!(schedule.window_end(), Some(now + chrono::Duration::seconds(30)));
    }

    #[test]
    fn malformed_headers_json_yields_empty_map() {
        let target = Target::builder()
            .name("t1")
            .url("https://example.test")
            .method(HttpMethod::Get)
            .headers(Some("not json".to_string()))
            .build();
        assert!(target.headers_map().is_empty());
    }
}
