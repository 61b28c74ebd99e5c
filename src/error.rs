use thiserror::Error;

/// Errors surfaced by the [`crate::store::Store`] trait and its implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no target with id {0}")]
    TargetNotFound(i64),

    #[error("no schedule with id {0}")]
    ScheduleNotFound(i64),

    #[error("no run with id {0}")]
    RunNotFound(i64),

    #[error("a {entity} named '{name}' already exists")]
    DuplicateName { entity: &'static str, name: String },

    #[error("schedule {0} has no target {1}")]
    DanglingTarget(i64, i64),

    #[error("window schedule requires duration_seconds")]
    MissingWindowDuration,

    #[error("target url '{0}' is not a valid absolute http(s) URL")]
    InvalidUrl(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced while installing or removing timers on the [`crate::registry::JobRegistry`]
/// or while driving the [`crate::scheduler::SchedulerService`] lifecycle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("job '{0}' is not registered")]
    NotRegistered(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
