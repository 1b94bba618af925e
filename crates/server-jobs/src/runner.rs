// crates/server-jobs/src/runner.rs
//! Supervised execution of the external analyzer.
//!
//! Every submitted job runs in its own task under a supervisor:
//!
//! 1. wait for a permit (the job stays `processing` meanwhile)
//! 2. spawn `program [script] input filter results_dir` and race it against
//!    the wall-clock timeout
//! 3. remove the input file
//! 4. record exactly one terminal outcome through the [`JobSink`]
//!
//! A panic in step 2 is caught by the supervisor and recorded as a failure,
//! so steps 3 and 4 happen on every path.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scarab_types::{AnalysisResult, FilterOption, JobError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::outcome::{interpret, ProcessOutput};
use crate::paths::{find_executable, remove_input_file};
use crate::store::JobStore;
use crate::types::JobId;

/// Max chars of analyzer stderr written to the log.
const STDERR_LOG_LIMIT: usize = 500;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
pub const DEFAULT_DOWNLOAD_PREFIX: &str = "/api/v1/analysis/download";

/// How the analyzer is invoked.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Executable, looked up on `PATH` when it has no separator.
    pub program: PathBuf,
    /// Optional first positional argument (the analysis script).
    pub script: Option<PathBuf>,
    /// Directory the analyzer writes its workbook into.
    pub results_dir: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub download_prefix: String,
}

impl RunnerConfig {
    pub fn new(program: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: None,
            results_dir: results_dir.into(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            download_prefix: DEFAULT_DOWNLOAD_PREFIX.to_string(),
        }
    }

    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_download_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.download_prefix = prefix.into();
        self
    }

    /// Script path as the child process will see it.
    fn script_path(&self) -> Option<PathBuf> {
        let script = self.script.as_ref()?;
        match &self.working_dir {
            Some(dir) if script.is_relative() => Some(dir.join(script)),
            _ => Some(script.clone()),
        }
    }

    /// Whether both the program and (if configured) the script exist.
    pub fn analyzer_available(&self) -> bool {
        let program_found = find_executable(&self.program).is_some()
            || self
                .working_dir
                .as_ref()
                .is_some_and(|dir| dir.join(&self.program).is_file());
        program_found && self.script_path().map_or(true, |s| s.is_file())
    }
}

/// Receiver of terminal job outcomes.
///
/// The runner calls exactly one of these per submitted job.
pub trait JobSink: Send + Sync + 'static {
    fn record_completed(&self, id: &JobId, result: AnalysisResult);
    fn record_failed(&self, id: &JobId, error: JobError);
}

impl JobSink for JobStore {
    fn record_completed(&self, id: &JobId, result: AnalysisResult) {
        if let Err(e) = self.complete(id.as_str(), result) {
            tracing::warn!(job_id = %id, error = %e, "dropping completion");
        }
    }

    fn record_failed(&self, id: &JobId, error: JobError) {
        if let Err(e) = self.fail(id.as_str(), error) {
            tracing::warn!(job_id = %id, error = %e, "dropping failure");
        }
    }
}

/// One unit of work handed to the runner.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: JobId,
    /// Uploaded input; deleted once the job finishes.
    pub input: PathBuf,
    pub filter: FilterOption,
}

/// Ways an analyzer run can end without producing a process output.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start analysis: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("analysis exceeded {0:?}")]
    Timeout(Duration),

    #[error("failed waiting for analyzer: {0}")]
    Wait(#[source] std::io::Error),
}

impl RunnerError {
    fn into_job_error(self) -> JobError {
        match self {
            RunnerError::Spawn(e) => JobError::detailed("failed to start analysis", e.to_string()),
            RunnerError::Timeout(_) => JobError::message("timeout"),
            RunnerError::Wait(e) => JobError::detailed("execution failed", e.to_string()),
        }
    }
}

/// Bounded pool of supervised analyzer runs.
pub struct JobRunner {
    config: Arc<RunnerConfig>,
    permits: Arc<Semaphore>,
    sink: Arc<dyn JobSink>,
    tracker: TaskTracker,
}

impl JobRunner {
    pub fn new(config: RunnerConfig, sink: Arc<dyn JobSink>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config: Arc::new(config),
            permits,
            sink,
            tracker: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Jobs submitted and not yet finished, queued ones included.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Start `spec` in the background and return immediately.
    ///
    /// The returned handle resolves after the terminal outcome is recorded;
    /// callers are free to drop it.
    pub fn submit(&self, spec: JobSpec) -> JoinHandle<()> {
        let work = run_job(Arc::clone(&self.config), spec.clone());
        self.supervise(spec, work)
    }

    pub(crate) fn supervise<F>(&self, spec: JobSpec, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<AnalysisResult, JobError>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let sink = Arc::clone(&self.sink);
        self.tracker.spawn(async move {
            let JobSpec { id, input, .. } = spec;

            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    metrics::gauge!("analysis_jobs_running").increment(1.0);
                    let started = Instant::now();
                    let joined = tokio::spawn(work).await;
                    metrics::gauge!("analysis_jobs_running").decrement(1.0);
                    metrics::histogram!("analysis_job_duration_seconds")
                        .record(started.elapsed().as_secs_f64());

                    match joined {
                        Ok(outcome) => outcome,
                        Err(e) if e.is_panic() => {
                            tracing::error!(job_id = %id, "analysis task panicked");
                            Err(JobError::message("internal runner error"))
                        }
                        Err(e) => {
                            tracing::error!(job_id = %id, error = %e, "analysis task cancelled");
                            Err(JobError::detailed("internal runner error", e.to_string()))
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "runner pool closed");
                    Err(JobError::detailed("internal runner error", e.to_string()))
                }
            };

            remove_input_file(&input).await;
            finish(sink.as_ref(), &id, outcome);
        })
    }

    /// Stop accepting work and wait for every in-flight job to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn finish(sink: &dyn JobSink, id: &JobId, outcome: Result<AnalysisResult, JobError>) {
    match outcome {
        Ok(result) => {
            tracing::info!(job_id = %id, excel_file = %result.excel_file, "analysis completed");
            metrics::counter!("analysis_jobs_finished_total", "outcome" => "completed").increment(1);
            sink.record_completed(id, result);
        }
        Err(error) => {
            tracing::warn!(job_id = %id, error = %error, "analysis failed");
            metrics::counter!("analysis_jobs_finished_total", "outcome" => "failed").increment(1);
            sink.record_failed(id, error);
        }
    }
}

async fn run_job(config: Arc<RunnerConfig>, spec: JobSpec) -> Result<AnalysisResult, JobError> {
    let output = execute(&config, &spec)
        .await
        .map_err(RunnerError::into_job_error)?;
    interpret(&output, &config.results_dir, &config.download_prefix)
}

/// Run the analyzer to exit or timeout, capturing stdout and stderr in full.
async fn execute(config: &RunnerConfig, spec: &JobSpec) -> Result<ProcessOutput, RunnerError> {
    let mut cmd = Command::new(&config.program);
    if let Some(script) = config.script_path() {
        cmd.arg(script);
    }
    cmd.arg(&spec.input)
        .arg(spec.filter.as_str())
        .arg(&config.results_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout reaches helpers the analyzer spawned.
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;
    let pid = child.id();
    tracing::info!(
        job_id = %spec.id,
        pid = ?pid,
        filter = %spec.filter,
        "analyzer started"
    );

    let mut stdout_task = tokio::spawn(drain_pipe(child.stdout.take()));
    let mut stderr_task = tokio::spawn(drain_pipe(child.stderr.take()));
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + config.timeout;

    // The deadline covers the pipes too: a helper holding stdout open must
    // not outlive the timeout.
    let finished = tokio::time::timeout_at(deadline, async {
        let status = child.wait().await;
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (status, stdout, stderr)
    })
    .await;

    let (status, stdout, stderr) = match finished {
        Ok(finished) => finished,
        Err(_) => {
            tracing::warn!(
                job_id = %spec.id,
                timeout_secs = config.timeout.as_secs_f64(),
                "analyzer timed out, killing"
            );
            kill_process_group(pid);
            // The analyzer itself may already be reaped while a helper kept
            // the pipes open.
            if !matches!(child.try_wait(), Ok(Some(_))) {
                if let Err(e) = child.kill().await {
                    tracing::warn!(job_id = %spec.id, error = %e, "failed to kill analyzer");
                }
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunnerError::Timeout(config.timeout));
        }
    };
    let status = status.map_err(RunnerError::Wait)?;

    tracing::info!(
        job_id = %spec.id,
        exit_code = ?status.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        stdout_len = stdout.len(),
        "analyzer exited"
    );
    if !stderr.trim().is_empty() {
        tracing::debug!(
            job_id = %spec.id,
            stderr = %truncate_chars(&stderr, STDERR_LOG_LIMIT),
            "analyzer stderr"
        );
    }

    Ok(ProcessOutput {
        success: status.success(),
        exit_code: status.code(),
        stdout,
        stderr,
    })
}

/// SIGKILL every process in the analyzer's group. The group id is the
/// analyzer's pid, and outlives it while any member is still running.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::debug!(pgid = pid, error = %e, "analyzer process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn drain_pipe<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "analyzer pipe read error");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
