//! In-memory, time-triggered job registry.
//!
//! Reproduces the three job-default semantics the scheduler depends on:
//! `coalesce=true` (a burst of missed ticks collapses into a single
//! catch-up firing), `misfire_grace_time=60s` (a tick observed later than
//! that is dropped instead of firing stale), and `max_instances=1` (a job
//! already in flight is never re-entered; the overlapping tick is skipped).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const MISFIRE_GRACE: Duration = Duration::from_secs(60);

type Callback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// When a job fires, and for how long.
#[derive(Clone)]
pub enum Trigger {
    /// Fires every `interval`, forever unless `end_time` is reached.
    Recurring {
        interval: Duration,
        end_time: Option<DateTime<Utc>>,
    },
    /// Fires exactly once, at `at`, then self-removes.
    Once { at: DateTime<Utc> },
}

struct JobHandle {
    paused: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the active timers and dispatches their callbacks, bounded by a
/// global concurrency cap shared across all jobs.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobHandle>>,
    concurrency: Arc<Semaphore>,
    /// Handles of currently-dispatched firings, tracked so `clear()` can wait
    /// for them instead of letting them get dropped (and aborted) with the runtime.
    in_flight_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl JobRegistry {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            concurrency: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            in_flight_tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers `name` with `trigger`, replacing any existing job of the
    /// same name. The callback is invoked with max-instances=1 semantics.
    pub async fn add_job<F, Fut>(&self, name: impl Into<String>, trigger: Trigger, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        self.remove_job(&name).await;

        let callback: Callback = Arc::new(move || Box::pin(callback()));
        let paused = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task = spawn_trigger_loop(
            name.clone(),
            trigger,
            callback,
            Arc::clone(&paused),
            Arc::clone(&in_flight),
            cancel.clone(),
            Arc::clone(&self.concurrency),
            Arc::clone(&self.in_flight_tasks),
        );

        self.jobs.write().await.insert(
            name,
            JobHandle {
                paused,
                in_flight,
                cancel,
                task,
            },
        );
    }

    pub async fn remove_job(&self, name: &str) {
        if let Some(handle) = self.jobs.write().await.remove(name) {
            handle.cancel.cancel();
            handle.task.abort();
        }
    }

    pub async fn pause_job(&self, name: &str) -> bool {
        match self.jobs.read().await.get(name) {
            Some(handle) => {
                handle.paused.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub async fn resume_job(&self, name: &str) -> bool {
        match self.jobs.read().await.get(name) {
            Some(handle) => {
                handle.paused.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub async fn has_job(&self, name: &str) -> bool {
        self.jobs.read().await.contains_key(name)
    }

    pub async fn job_names(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Cancels every registered job's timer loop, then waits for any firing
    /// already dispatched to finish. Timer loops are aborted outright (they
    /// carry no state worth preserving); in-flight firings are awaited, not
    /// aborted, so a request already in flight is allowed to complete and
    /// persist its run.
    pub async fn clear(&self) {
        let mut jobs = self.jobs.write().await;
        for (_, handle) in jobs.drain() {
            handle.cancel.cancel();
            handle.task.abort();
        }
        drop(jobs);

        let handles: Vec<JoinHandle<()>> = self.in_flight_tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_trigger_loop(
    name: String,
    trigger: Trigger,
    callback: Callback,
    paused: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
    concurrency: Arc<Semaphore>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match trigger {
            Trigger::Once { at } => {
                run_once(&name, at, callback, in_flight, cancel, concurrency, tasks).await;
            }
            Trigger::Recurring { interval, end_time } => {
                run_recurring(
                    &name,
                    interval,
                    end_time,
                    callback,
                    paused,
                    in_flight,
                    cancel,
                    concurrency,
                    tasks,
                )
                .await;
            }
        }
    })
}

async fn sleep_until_instant(at: DateTime<Utc>) {
    let delta = at - Utc::now();
    let millis = delta.num_milliseconds().max(0) as u64;
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

async fn run_once(
    name: &str,
    at: DateTime<Utc>,
    callback: Callback,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
    concurrency: Arc<Semaphore>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = sleep_until_instant(at) => {
            fire(name, callback, in_flight, concurrency, tasks).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_recurring(
    name: &str,
    interval: Duration,
    end_time: Option<DateTime<Utc>>,
    callback: Callback,
    paused: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
    concurrency: Arc<Semaphore>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    let mut scheduled = tokio::time::Instant::now() + interval;

    loop {
        if let Some(end) = end_time {
            if Utc::now() >= end {
                debug!(job = name, "recurring job reached end_time, stopping");
                return;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(scheduled) => {}
        }

        let now = tokio::time::Instant::now();
        let lateness = now.saturating_duration_since(scheduled);

        // Coalesce: jump straight to the next slot that is still in the future,
        // collapsing any burst of missed ticks into a single catch-up.
        let mut next = scheduled + interval;
        while next <= now {
            next += interval;
        }
        scheduled = next;

        if paused.load(Ordering::SeqCst) {
            trace!(job = name, "tick skipped, job paused");
            continue;
        }

        if lateness > MISFIRE_GRACE {
            warn!(job = name, lateness_ms = lateness.as_millis() as u64, "misfire grace exceeded, dropping tick");
            continue;
        }

        fire(
            name,
            Arc::clone(&callback),
            Arc::clone(&in_flight),
            Arc::clone(&concurrency),
            Arc::clone(&tasks),
        )
        .await;
    }
}

async fn fire(
    name: &str,
    callback: Callback,
    in_flight: Arc<AtomicBool>,
    concurrency: Arc<Semaphore>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    if in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!(job = name, "previous invocation still running, skipping tick (max_instances=1)");
        return;
    }

    let name = name.to_string();
    let handle = tokio::spawn(async move {
        let _permit = concurrency.acquire_owned().await;
        callback().await;
        in_flight.store(false, Ordering::SeqCst);
    });

    let mut tasks = tasks.lock().await;
    tasks.retain(|h| !h.is_finished());
    tasks.push(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn recurring_job_fires_multiple_times() {
        let registry = JobRegistry::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        registry
            .add_job(
                "job1",
                Trigger::Recurring {
                    interval: Duration::from_millis(50),
                    end_time: None,
                },
                move || {
                    let count = Arc::clone(&count_clone);
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    }
                },
            )
            .await;

        tokio::time::sleep(Duration::from_millis(260)).await;
        registry.remove_job("job1").await;

        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 3, "expected at least 3 firings, got {fired}");
    }

    #[tokio::test]
    async fn paused_job_does_not_fire() {
        let registry = JobRegistry::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        registry
            .add_job(
                "job1",
                Trigger::Recurring {
                    interval: Duration::from_millis(30),
                    end_time: None,
                },
                move || {
                    let count = Arc::clone(&count_clone);
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    }
                },
            )
            .await;

        registry.pause_job("job1").await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        registry.remove_job("job1").await;
    }

    #[tokio::test]
    async fn max_instances_one_skips_overlapping_tick() {
        let registry = JobRegistry::new(10);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        registry
            .add_job(
                "job1",
                Trigger::Recurring {
                    interval: Duration::from_millis(20),
                    end_time: None,
                },
                move || {
                    let count = Arc::clone(&count_clone);
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                },
            )
            .await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        registry.remove_job("job1").await;

        // The handler sleeps far longer than the tick interval; overlap
        // suppression means it should have fired only once in this window.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn add_job_twice_replaces_the_first() {
        let registry = JobRegistry::new(10);
        registry
            .add_job("job1", Trigger::Recurring { interval: Duration::from_secs(60), end_time: None }, || async {})
            .await;
        registry
            .add_job("job1", Trigger::Recurring { interval: Duration::from_secs(60), end_time: None }, || async {})
            .await;
        assert_eq!(registry.job_names().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_job_on_unregistered_name_is_a_no_op() {
        let registry = JobRegistry::new(10);
        registry.remove_job("missing").await;
        assert!(!registry.has_job("missing").await);
    }

    #[tokio::test]
    async fn clear_waits_for_in_flight_firing_to_complete() {
        let registry = JobRegistry::new(10);
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = Arc::clone(&finished);

        registry
            .add_job(
                "job1",
                Trigger::Recurring {
                    interval: Duration::from_millis(10),
                    end_time: None,
                },
                move || {
                    let finished = Arc::clone(&finished_clone);
                    async move {
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        finished.store(true, Ordering::SeqCst);
                    }
                },
            )
            .await;

        // Let the first tick fire and enter its handler, then shut down
        // while that handler is still sleeping.
        tokio::time::sleep(Duration::from_millis(30)).await;
        registry.clear().await;

        assert!(
            finished.load(Ordering::SeqCst),
            "clear() must wait for the in-flight firing to complete, not abort it"
        );
    }
}
