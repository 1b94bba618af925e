// crates/poller/src/poller.rs
//! Client-side job polling.
//!
//! A [`JobPoller`] follows at most one job at a time. Tracking a job checks
//! its status once immediately and then every `interval` until the job
//! completes or fails, calling exactly one of the two callbacks. Tracking a
//! different job, calling [`JobPoller::clear`], or dropping the poller tears
//! the current loop down first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scarab_types::{JobError, JobStatus, StatusReport};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::ClientError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Anything that can report a job's raw status body.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn check(&self, job_id: &str) -> Result<Value, ClientError>;
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Give up with [`PollFailure::TimedOut`] once this much time has passed
    /// since the first check. `None` polls forever.
    pub max_wait: Option<Duration>,
    /// Transport errors retried within one tick before giving up.
    pub max_transport_retries: u32,
    /// Backoff unit; attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_wait: None,
            max_transport_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Processing { job_id: String },
    Completed { job_id: String },
    Failed { job_id: String },
}

/// Why polling ended without a completed job.
#[derive(Debug, Error)]
pub enum PollFailure {
    /// The server reports the job itself as failed.
    #[error("job {job_id} failed: {error}")]
    JobFailed {
        job_id: String,
        error: JobError,
        payload: Value,
    },

    /// The server answered `success: false` without a failed job, e.g. an
    /// unknown or expired id.
    #[error("status check for {job_id} rejected: {error}")]
    Rejected {
        job_id: String,
        error: JobError,
        payload: Value,
    },

    /// The status could not be fetched or decoded.
    #[error("could not fetch status of {job_id}: {source}")]
    Transport {
        job_id: String,
        #[source]
        source: ClientError,
    },

    #[error("job {job_id} still processing after {waited:?}")]
    TimedOut { job_id: String, waited: Duration },
}

impl PollFailure {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PollFailure::JobFailed { .. } => "job_failed",
            PollFailure::Rejected { .. } => "rejected",
            PollFailure::Transport { .. } => "transport",
            PollFailure::TimedOut { .. } => "timed_out",
        }
    }
}

enum Verdict {
    Processing,
    Completed,
    Failed(PollFailure),
}

fn classify(job_id: &str, payload: &Value) -> Verdict {
    let report: StatusReport = match serde_json::from_value(payload.clone()) {
        Ok(report) => report,
        Err(e) => {
            return Verdict::Failed(PollFailure::Transport {
                job_id: job_id.to_string(),
                source: ClientError::Decode(e.to_string()),
            })
        }
    };

    match report.status {
        Some(JobStatus::Completed) if report.success => Verdict::Completed,
        Some(JobStatus::Failed) => Verdict::Failed(PollFailure::JobFailed {
            job_id: job_id.to_string(),
            error: JobError::from_value(report.error.as_ref()),
            payload: payload.clone(),
        }),
        _ if !report.success => Verdict::Failed(PollFailure::Rejected {
            job_id: job_id.to_string(),
            error: JobError::from_value(report.error.as_ref()),
            payload: payload.clone(),
        }),
        _ => Verdict::Processing,
    }
}

struct ActiveLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A loop's claim on the shared state.
///
/// Every `track`, `clear` and drop bumps the generation while holding the
/// watch lock, so a loop that was superseded can never settle the state or
/// run its callback, however late it wakes up.
struct Ticket {
    state: Arc<watch::Sender<PollState>>,
    generation: Arc<AtomicU64>,
    issued: u64,
    job_id: String,
}

impl Ticket {
    /// Move `Processing{job_id}` to `next`. False if this loop was replaced.
    fn settle(&self, next: PollState) -> bool {
        self.state.send_if_modified(|current| {
            let ours = self.generation.load(Ordering::SeqCst) == self.issued
                && matches!(current, PollState::Processing { job_id } if *job_id == self.job_id);
            if ours {
                *current = next;
            }
            ours
        })
    }
}

/// Follows one job at a time against a [`StatusSource`].
pub struct JobPoller<S: StatusSource> {
    source: Arc<S>,
    config: PollerConfig,
    state: Arc<watch::Sender<PollState>>,
    generation: Arc<AtomicU64>,
    active: Option<ActiveLoop>,
}

impl<S: StatusSource> JobPoller<S> {
    pub fn new(source: Arc<S>, config: PollerConfig) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            source,
            config,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Start following `job_id`, replacing whatever was tracked before.
    ///
    /// `on_complete` receives the full status body of the completed job.
    /// Exactly one callback runs, unless the loop is torn down first, in
    /// which case neither does.
    pub fn track<C, E>(&mut self, job_id: impl Into<String>, on_complete: C, on_error: E)
    where
        C: FnOnce(Value) + Send + 'static,
        E: FnOnce(PollFailure) + Send + 'static,
    {
        self.teardown();
        let job_id = job_id.into();
        let cancel = CancellationToken::new();
        let issued = self.supersede(PollState::Processing {
            job_id: job_id.clone(),
        });
        let ticket = Ticket {
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            issued,
            job_id: job_id.clone(),
        };

        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            self.config.clone(),
            job_id,
            cancel.clone(),
            ticket,
            on_complete,
            on_error,
        ));
        self.active = Some(ActiveLoop { cancel, handle });
    }

    /// Stop following the current job, if any, and go idle.
    pub fn clear(&mut self) {
        self.teardown();
        self.supersede(PollState::Idle);
    }

    /// Invalidate every outstanding ticket and publish `next`, atomically.
    fn supersede(&self, next: PollState) -> u64 {
        let mut issued = 0;
        self.state.send_modify(|current| {
            issued = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = next;
        });
        issued
    }

    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.handle.abort();
        }
    }
}

impl<S: StatusSource> Drop for JobPoller<S> {
    fn drop(&mut self) {
        self.teardown();
        self.state.send_if_modified(|_| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            false
        });
    }
}

async fn poll_loop<S, C, E>(
    source: Arc<S>,
    config: PollerConfig,
    job_id: String,
    cancel: CancellationToken,
    ticket: Ticket,
    on_complete: C,
    on_error: E,
) where
    S: StatusSource,
    C: FnOnce(Value) + Send + 'static,
    E: FnOnce(PollFailure) + Send + 'static,
{
    let started = Instant::now();
    let mut ticker = tokio::time::interval(config.interval);
    // A slow check swallows the ticks it overlapped instead of bursting.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut checks = 0u32;

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if let Some(max_wait) = config.max_wait {
            let waited = started.elapsed();
            if waited >= max_wait {
                break Err(PollFailure::TimedOut {
                    job_id: job_id.clone(),
                    waited,
                });
            }
        }

        let Some(checked) = check_with_retries(source.as_ref(), &config, &job_id, &cancel).await else {
            return;
        };
        checks += 1;

        match checked {
            Ok(payload) => match classify(&job_id, &payload) {
                Verdict::Processing => {
                    tracing::debug!(job_id = %job_id, checks, "job still processing");
                }
                Verdict::Completed => break Ok(payload),
                Verdict::Failed(failure) => break Err(failure),
            },
            Err(source) => {
                break Err(PollFailure::Transport {
                    job_id: job_id.clone(),
                    source,
                })
            }
        }
    };

    // Late results after teardown are discarded.
    if cancel.is_cancelled() {
        return;
    }

    match outcome {
        Ok(payload) => {
            if !ticket.settle(PollState::Completed {
                job_id: job_id.clone(),
            }) {
                tracing::debug!(job_id = %job_id, "discarding completion of replaced poll");
                return;
            }
            tracing::info!(job_id = %job_id, checks, "job completed");
            on_complete(payload);
        }
        Err(failure) => {
            if !ticket.settle(PollState::Failed {
                job_id: job_id.clone(),
            }) {
                tracing::debug!(job_id = %job_id, "discarding failure of replaced poll");
                return;
            }
            tracing::warn!(
                job_id = %job_id,
                checks,
                kind = failure.kind(),
                error = %failure,
                "job polling failed"
            );
            on_error(failure);
        }
    }
}

/// One status check, retrying transport errors with linear backoff.
///
/// `None` means the loop was cancelled while waiting.
async fn check_with_retries<S: StatusSource>(
    source: &S,
    config: &PollerConfig,
    job_id: &str,
    cancel: &CancellationToken,
) -> Option<Result<Value, ClientError>> {
    let mut attempt = 0u32;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = source.check(job_id) => result,
        };
        match result {
            Err(e) if attempt < config.max_transport_retries => {
                attempt += 1;
                let delay = config.retry_delay * attempt;
                tracing::warn!(
                    job_id = %job_id,
                    kind = "transport",
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "status check failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            other => return Some(other),
        }
    }
}
