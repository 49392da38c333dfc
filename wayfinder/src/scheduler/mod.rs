//! Bounded, retrying, cancellable request scheduler.
//!
//! All backend traffic flows through one [`RequestScheduler`] daemon:
//! at most `max_in_flight` fetches execute concurrently, excess
//! requests queue in submission order, and a uniform dispatch delay
//! smooths bursty submission toward rate-limited backends.
//!
//! Cancellation is cooperative. Every request carries a logical
//! purpose and a sequence token; submitting a newer request for a
//! superseding purpose (route fetches) marks every older outstanding
//! request of that purpose cancelled. Queued requests are skipped at
//! dispatch; in-flight requests run to completion and their results
//! are discarded on arrival. Nothing is preempted.
//!
//! Completions never touch engine state directly: they are posted as
//! [`FetchCompleted`] events into the engine's input stream and
//! reconciled there.

mod policy;

pub use policy::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};

use crate::provider::{Candidate, ProviderError};
use crate::route::Route;
use crate::telemetry::NavMetrics;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default maximum number of fetches in flight.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 6;

/// Default delay between dispatches, in milliseconds.
pub const DEFAULT_DISPATCH_DELAY_MS: u64 = 120;

/// Default request channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Logical purpose of a scheduled fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPurpose {
    /// Route fetch for trip preview.
    PreviewRoute,
    /// Route fetch after a confirmed deviation.
    Reroute,
    /// Elevation profile for the route ahead.
    Elevation,
    /// Speed limit near the current position.
    SpeedLimit,
    /// Forward geocoding.
    Geocode,
}

impl RequestPurpose {
    /// Whether a newer submission of this purpose invalidates older
    /// outstanding requests.
    ///
    /// Route fetches are trip-scoped and superseded by newer ones.
    /// Elevation and speed-limit fetches are keyed by position, not by
    /// route, so route changes do not cancel them.
    pub fn superseded_by_newer(self) -> bool {
        matches!(self, Self::PreviewRoute | Self::Reroute)
    }
}

/// Successful fetch payload.
#[derive(Debug, Clone)]
pub enum FetchPayload {
    /// A fetched route.
    Route(Route),
    /// Elevations for the requested points, in order.
    Elevation(Vec<f64>),
    /// Speed limit in km/h, or `None` where unmapped.
    SpeedLimit(Option<f64>),
    /// Geocoding candidates.
    Geocode(Vec<Candidate>),
}

/// Completion event posted into the engine input stream.
#[derive(Debug, Clone)]
pub struct FetchCompleted {
    /// What the fetch was for.
    pub purpose: RequestPurpose,
    /// Sequence token the request was submitted under.
    pub token: u64,
    /// Final result after retries.
    pub result: Result<FetchPayload, ProviderError>,
}

/// A single async fetch operation.
///
/// Implementations wrap one provider call; the scheduler owns retry,
/// pacing and cancellation around it.
pub trait FetchTask: Send + Sync + 'static {
    /// Short name for logging ("FetchRoute", "FetchSpeedLimit").
    fn name(&self) -> &str;

    /// Executes the fetch once.
    fn run(&self) -> BoxFuture<'_, Result<FetchPayload, ProviderError>>;
}

/// A request waiting for dispatch.
pub struct ScheduledRequest {
    /// The fetch to execute.
    pub task: Box<dyn FetchTask>,
    /// Logical purpose, used for cancellation scoping.
    pub purpose: RequestPurpose,
    /// Sequence token snapshot taken at submission time.
    pub token: u64,
}

/// Scheduler configuration.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Maximum fetches in flight.
    pub max_in_flight: usize,
    /// Uniform delay between dispatches.
    pub dispatch_delay: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Request channel capacity.
    pub channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            dispatch_delay: Duration::from_millis(DEFAULT_DISPATCH_DELAY_MS),
            retry: RetryPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Cloneable handle for submitting requests to the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    request_tx: mpsc::Sender<ScheduledRequest>,
    latest_tokens: Arc<Mutex<HashMap<RequestPurpose, u64>>>,
}

impl SchedulerHandle {
    /// Submits a request for execution.
    ///
    /// For superseding purposes this immediately marks every older
    /// outstanding request of the same purpose cancelled. Returns
    /// false when the scheduler has shut down.
    pub async fn submit(&self, request: ScheduledRequest) -> bool {
        if request.purpose.superseded_by_newer() {
            let mut latest = self.latest_tokens.lock();
            let entry = latest.entry(request.purpose).or_insert(request.token);
            if request.token > *entry {
                *entry = request.token;
            }
        }
        self.request_tx.send(request).await.is_ok()
    }
}

/// The request scheduler daemon.
///
/// Owns the dispatch loop; runs as a long-lived background task.
pub struct RequestScheduler {
    config: SchedulerConfig,
    request_rx: mpsc::Receiver<ScheduledRequest>,
    completion_tx: mpsc::Sender<FetchCompleted>,
    latest_tokens: Arc<Mutex<HashMap<RequestPurpose, u64>>>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<NavMetrics>,
}

impl RequestScheduler {
    /// Creates a scheduler and its submission handle.
    ///
    /// Completions are posted to `completion_tx` in completion order,
    /// which may differ from submission order.
    pub fn new(
        config: SchedulerConfig,
        completion_tx: mpsc::Sender<FetchCompleted>,
        metrics: Arc<NavMetrics>,
    ) -> (Self, SchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);
        let latest_tokens = Arc::new(Mutex::new(HashMap::new()));
        let semaphore = Arc::new(Semaphore::new(config.max_in_flight));

        let handle = SchedulerHandle {
            request_tx,
            latest_tokens: Arc::clone(&latest_tokens),
        };

        let scheduler = Self {
            config,
            request_rx,
            completion_tx,
            latest_tokens,
            semaphore,
            metrics,
        };

        (scheduler, handle)
    }

    /// Runs the dispatch loop until shutdown is signalled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            max_in_flight = self.config.max_in_flight,
            dispatch_delay_ms = self.config.dispatch_delay.as_millis() as u64,
            "Request scheduler starting"
        );

        let mut last_dispatch: Option<Instant> = None;

        loop {
            let request = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Request scheduler shutting down");
                    break;
                }

                request = self.request_rx.recv() => match request {
                    Some(request) => request,
                    None => {
                        debug!("Request channel closed, scheduler stopping");
                        break;
                    }
                },
            };

            // Superseded while queued: skip without executing.
            if self.is_superseded(request.purpose, request.token) {
                debug!(
                    task = request.task.name(),
                    token = request.token,
                    "Dropping superseded queued request"
                );
                self.metrics.request_cancelled();
                continue;
            }

            // Uniform pacing between dispatches smooths bursts.
            if let Some(last) = last_dispatch {
                tokio::time::sleep_until(last + self.config.dispatch_delay).await;
            }
            last_dispatch = Some(Instant::now());

            let permit = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Request scheduler shutting down");
                    break;
                }

                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break, // semaphore closed, unreachable in practice
                },
            };

            // Superseded while paced or waiting for a permit: skip
            // before spending a backend call.
            if self.is_superseded(request.purpose, request.token) {
                debug!(
                    task = request.task.name(),
                    token = request.token,
                    "Dropping request superseded while waiting"
                );
                self.metrics.request_cancelled();
                drop(permit);
                continue;
            }

            let retry = self.config.retry.clone();
            let completion_tx = self.completion_tx.clone();
            let latest_tokens = Arc::clone(&self.latest_tokens);
            let metrics = Arc::clone(&self.metrics);

            tokio::spawn(async move {
                let ScheduledRequest {
                    task,
                    purpose,
                    token,
                } = request;

                let result = execute_with_retry(task.as_ref(), &retry, &metrics).await;
                drop(permit);

                // Completion-time token check: results from requests
                // superseded while in flight are discarded on arrival.
                let superseded = purpose.superseded_by_newer()
                    && latest_tokens
                        .lock()
                        .get(&purpose)
                        .is_some_and(|latest| *latest > token);
                if superseded {
                    debug!(task = task.name(), token, "Discarding superseded fetch result");
                    metrics.stale_result_dropped();
                    return;
                }

                if completion_tx
                    .send(FetchCompleted {
                        purpose,
                        token,
                        result,
                    })
                    .await
                    .is_err()
                {
                    debug!(task = task.name(), "Completion channel closed");
                }
            });
        }
    }

    fn is_superseded(&self, purpose: RequestPurpose, token: u64) -> bool {
        purpose.superseded_by_newer()
            && self
                .latest_tokens
                .lock()
                .get(&purpose)
                .is_some_and(|latest| *latest > token)
    }
}

/// Runs a task, retrying the transient error class per policy.
async fn execute_with_retry(
    task: &dyn FetchTask,
    retry: &RetryPolicy,
    metrics: &NavMetrics,
) -> Result<FetchPayload, ProviderError> {
    let mut attempt = 1;
    loop {
        match task.run().await {
            Ok(payload) => return Ok(payload),
            Err(err) if err.is_transient() => match retry.delay_for_attempt(attempt) {
                Some(delay) => {
                    warn!(
                        task = task.name(),
                        attempt,
                        error = %err,
                        "Transient fetch failure, retrying"
                    );
                    metrics.request_retried();
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(task = task.name(), attempt, error = %err, "Retries exhausted");
                    return Err(err);
                }
            },
            Err(err) => {
                warn!(task = task.name(), error = %err, "Permanent fetch failure");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Test task: optionally fails a few times, optionally waits on a
    /// gate, and tracks concurrency.
    struct TestTask {
        name: &'static str,
        remaining_failures: AtomicU32,
        gate: Option<Arc<Semaphore>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl TestTask {
        fn simple(name: &'static str) -> Self {
            Self {
                name,
                remaining_failures: AtomicU32::new(0),
                gate: None,
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(name: &'static str, failures: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(failures),
                ..Self::simple(name)
            }
        }

        fn gated(
            name: &'static str,
            gate: Arc<Semaphore>,
            active: Arc<AtomicUsize>,
            max_active: Arc<AtomicUsize>,
        ) -> Self {
            Self {
                name,
                remaining_failures: AtomicU32::new(0),
                gate: Some(gate),
                active,
                max_active,
            }
        }
    }

    impl FetchTask for TestTask {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self) -> BoxFuture<'_, Result<FetchPayload, ProviderError>> {
            Box::pin(async move {
                if self
                    .remaining_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(ProviderError::RateLimited);
                }

                let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active.fetch_max(now_active, Ordering::SeqCst);

                if let Some(gate) = &self.gate {
                    gate.acquire().await.unwrap().forget();
                }

                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(FetchPayload::SpeedLimit(None))
            })
        }
    }

    fn fast_config(max_in_flight: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_in_flight,
            dispatch_delay: Duration::from_millis(1),
            retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
            channel_capacity: 64,
        }
    }

    async fn spawn_scheduler(
        config: SchedulerConfig,
    ) -> (
        SchedulerHandle,
        mpsc::Receiver<FetchCompleted>,
        Arc<NavMetrics>,
        CancellationToken,
    ) {
        let metrics = Arc::new(NavMetrics::new());
        let (completion_tx, completion_rx) = mpsc::channel(64);
        let (scheduler, handle) = RequestScheduler::new(config, completion_tx, Arc::clone(&metrics));

        let shutdown = CancellationToken::new();
        tokio::spawn(scheduler.run(shutdown.clone()));

        (handle, completion_rx, metrics, shutdown)
    }

    fn request(purpose: RequestPurpose, token: u64, task: TestTask) -> ScheduledRequest {
        ScheduledRequest {
            task: Box::new(task),
            purpose,
            token,
        }
    }

    #[tokio::test]
    async fn completes_and_posts_result() {
        let (handle, mut completions, _, shutdown) = spawn_scheduler(fast_config(6)).await;

        assert!(
            handle
                .submit(request(
                    RequestPurpose::SpeedLimit,
                    1,
                    TestTask::simple("speed")
                ))
                .await
        );

        let completed = tokio::time::timeout(Duration::from_secs(1), completions.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.purpose, RequestPurpose::SpeedLimit);
        assert_eq!(completed.token, 1);
        assert!(completed.result.is_ok());

        shutdown.cancel();
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let (handle, mut completions, metrics, shutdown) = spawn_scheduler(fast_config(6)).await;

        handle
            .submit(request(
                RequestPurpose::Elevation,
                1,
                TestTask::failing("elevation", 2),
            ))
            .await;

        let completed = tokio::time::timeout(Duration::from_secs(1), completions.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(completed.result.is_ok());
        assert_eq!(metrics.snapshot().requests_retried, 2);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn transient_failure_exhausts_attempts() {
        let mut config = fast_config(6);
        config.retry = RetryPolicy::fixed(2, Duration::from_millis(1));
        let (handle, mut completions, metrics, shutdown) = spawn_scheduler(config).await;

        handle
            .submit(request(
                RequestPurpose::Elevation,
                1,
                TestTask::failing("elevation", 10),
            ))
            .await;

        let completed = tokio::time::timeout(Duration::from_secs(1), completions.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.result.unwrap_err(), ProviderError::RateLimited);
        assert_eq!(metrics.snapshot().requests_retried, 1);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn permanent_failure_surfaces_immediately() {
        struct PermanentFail;
        impl FetchTask for PermanentFail {
            fn name(&self) -> &str {
                "route"
            }
            fn run(&self) -> BoxFuture<'_, Result<FetchPayload, ProviderError>> {
                Box::pin(async { Err(ProviderError::Malformed("bad".into())) })
            }
        }

        let (handle, mut completions, metrics, shutdown) = spawn_scheduler(fast_config(6)).await;
        handle
            .submit(ScheduledRequest {
                task: Box::new(PermanentFail),
                purpose: RequestPurpose::Geocode,
                token: 1,
            })
            .await;

        let completed = tokio::time::timeout(Duration::from_secs(1), completions.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            completed.result.unwrap_err(),
            ProviderError::Malformed(_)
        ));
        assert_eq!(metrics.snapshot().requests_retried, 0);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn bounds_concurrency_and_queues_excess() {
        let (handle, mut completions, _, shutdown) = spawn_scheduler(fast_config(6)).await;

        let gate = Arc::new(Semaphore::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        // 8 submissions against 6 slots: 6 run, 2 queue.
        for token in 1..=8 {
            handle
                .submit(request(
                    RequestPurpose::Elevation,
                    token,
                    TestTask::gated(
                        "elevation",
                        Arc::clone(&gate),
                        Arc::clone(&active),
                        Arc::clone(&max_active),
                    ),
                ))
                .await;
        }

        // Let the first 6 reach the gate.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(active.load(Ordering::SeqCst), 6);

        gate.add_permits(8);
        for _ in 0..8 {
            tokio::time::timeout(Duration::from_secs(1), completions.recv())
                .await
                .unwrap()
                .unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 6);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn newer_token_cancels_older_same_purpose() {
        // One slot so the second reroute queues behind the first.
        let (handle, mut completions, metrics, shutdown) = spawn_scheduler(fast_config(1)).await;

        let gate = Arc::new(Semaphore::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        handle
            .submit(request(
                RequestPurpose::Reroute,
                1,
                TestTask::gated(
                    "reroute",
                    Arc::clone(&gate),
                    Arc::clone(&active),
                    Arc::clone(&max_active),
                ),
            ))
            .await;
        // Wait until the first reroute holds the slot and is executing.
        while active.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        handle
            .submit(request(
                RequestPurpose::Reroute,
                2,
                TestTask::gated(
                    "reroute",
                    Arc::clone(&gate),
                    Arc::clone(&active),
                    Arc::clone(&max_active),
                ),
            ))
            .await;
        // Token 3 supersedes both outstanding reroutes.
        handle
            .submit(request(RequestPurpose::Reroute, 3, TestTask::simple("reroute")))
            .await;

        gate.add_permits(4);

        let completed = tokio::time::timeout(Duration::from_secs(1), completions.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.token, 3);

        // No further completions: token 1 was dropped on arrival,
        // token 2 skipped before it ever executed.
        assert!(
            tokio::time::timeout(Duration::from_millis(100), completions.recv())
                .await
                .is_err()
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stale_results_dropped, 1);
        assert_eq!(snapshot.requests_cancelled, 1);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn non_superseding_purposes_unaffected_by_tokens() {
        let (handle, mut completions, _, shutdown) = spawn_scheduler(fast_config(6)).await;

        handle
            .submit(request(RequestPurpose::SpeedLimit, 1, TestTask::simple("speed")))
            .await;
        handle
            .submit(request(RequestPurpose::SpeedLimit, 2, TestTask::simple("speed")))
            .await;

        // Both complete; position-keyed fetches are never token-cancelled.
        for _ in 0..2 {
            let completed = tokio::time::timeout(Duration::from_secs(1), completions.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(completed.result.is_ok());
        }

        shutdown.cancel();
    }

    #[tokio::test]
    async fn submit_fails_after_shutdown() {
        let (handle, _completions, _, shutdown) = spawn_scheduler(fast_config(1)).await;
        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The daemon has dropped its receiver by now.
        let accepted = handle
            .submit(request(RequestPurpose::Geocode, 1, TestTask::simple("geocode")))
            .await;
        assert!(!accepted);
    }
}
