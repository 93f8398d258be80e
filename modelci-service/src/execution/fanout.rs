// Fan-out
// Runs every matrix entry as an independent, isolated task

use super::error::JobError;
use super::events::{EventSender, ExecutionEvent};
use super::executor::JobExecutor;
use super::models::{JobResult, JobStatus, JobVariant};
use crate::matrix::MatrixEntry;

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{info, warn};

/// Outcome of a fan-out, one result per entry in matrix order
#[derive(Debug)]
pub struct FanoutSummary {
    pub results: Vec<JobResult>,
    pub duration: Duration,
}

impl FanoutSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// True when every unit succeeded (vacuously true for an empty matrix)
    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

/// Parallel executor over matrix entries
#[derive(Clone)]
pub struct Fanout {
    executor: JobExecutor,
    /// Maximum concurrently running jobs (None = unlimited)
    max_parallel: Option<usize>,
}

impl Fanout {
    pub fn new(executor: JobExecutor) -> Self {
        Self {
            executor,
            max_parallel: None,
        }
    }

    /// Bound concurrency; 0 means unlimited
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = (max_parallel > 0).then_some(max_parallel);
        self
    }

    /// Run all entries and wait for every one of them.
    ///
    /// A failing or panicking unit never affects its siblings. Dropping the
    /// returned future aborts every unit.
    pub async fn run(&self, entries: Vec<MatrixEntry>, variant: JobVariant) -> FanoutSummary {
        let start = Instant::now();
        let events = self.executor.events().clone();

        info!(jobs = entries.len(), %variant, max_parallel = ?self.max_parallel, "fan-out started");
        events.send_event(ExecutionEvent::fanout_started(entries.len(), variant));

        let semaphore = self.max_parallel.map(|n| Arc::new(Semaphore::new(n)));
        let mut set = JoinSet::new();

        for (index, entry) in entries.iter().cloned().enumerate() {
            let executor = self.executor.clone();
            let semaphore = semaphore.clone();

            set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                let fallback = entry.clone();
                let job = AbortOnDrop(tokio::spawn(async move {
                    executor.execute(&entry, variant).await
                }));
                let result = job
                    .join()
                    .await
                    .unwrap_or_else(|e| aborted(fallback, variant, e));
                (index, result)
            });
        }

        let mut slots: Vec<Option<JobResult>> = entries.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "fan-out task ended without a result"),
            }
        }

        let results: Vec<JobResult> = slots
            .into_iter()
            .zip(entries)
            .map(|(slot, entry)| {
                slot.unwrap_or_else(|| {
                    missing(entry, variant, "task ended without reporting a result")
                })
            })
            .collect();

        let summary = FanoutSummary {
            results,
            duration: start.elapsed(),
        };

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            duration = ?summary.duration,
            "fan-out completed"
        );
        events.send_event(ExecutionEvent::fanout_completed(
            summary.succeeded(),
            summary.failed(),
            summary.duration,
        ));

        summary
    }
}

/// Aborts the job task when dropped, so cancelling the fan-out cancels its jobs
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T, JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn aborted(entry: MatrixEntry, variant: JobVariant, error: JoinError) -> JobResult {
    let reason = if error.is_panic() {
        let payload = error.into_panic();
        format!("job panicked: {}", panic_message(payload.as_ref()))
    } else {
        "job was cancelled".to_string()
    };
    warn!(job = %entry.job_name(), %reason, "job aborted");
    missing(entry, variant, &reason)
}

fn missing(entry: MatrixEntry, variant: JobVariant, reason: &str) -> JobResult {
    JobResult {
        job_name: entry.job_name(),
        entry,
        variant,
        status: JobStatus::Failed,
        reached: None,
        failed_state: None,
        error: Some(JobError::Aborted(reason.to_string()).to_string()),
        steps: Vec::new(),
        duration: Duration::ZERO,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::StaticSecretStore;
    use crate::config::ServiceConfig;
    use crate::execution::events::progress_channel;
    use crate::execution::models::JobState;
    use crate::matrix::{MatrixBuilder, RunnerSpec};
    use crate::runners::{OutputSink, ShellOutput, StepCommand, StepRunner};

    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails commands mentioning `broken`, panics on `panic`, tracks concurrency
    #[derive(Default)]
    struct ScriptedRunner {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StepRunner for ScriptedRunner {
        async fn run(&self, command: &StepCommand, _on_output: OutputSink<'_>) -> ShellOutput {
            let line = command.to_string();
            if line.contains("panic") {
                panic!("runner exploded");
            }

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            ShellOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(if line.contains("broken") { 1 } else { 0 }),
            }
        }
    }

    fn runner() -> RunnerSpec {
        RunnerSpec {
            label: "8-core-ubuntu".to_string(),
            platform: "x86_64".to_string(),
        }
    }

    fn entries(names: &[&str]) -> Vec<MatrixEntry> {
        names
            .iter()
            .fold(MatrixBuilder::new(), |builder, name| {
                builder.add_wget(
                    format!("org/{}", name),
                    &runner(),
                    vec![format!("https://example.com/{}.pt", name)],
                )
            })
            .build()
            .include
    }

    fn fanout(root: &std::path::Path, runner: Arc<ScriptedRunner>) -> Fanout {
        let executor = JobExecutor::new(ServiceConfig::default().with_root(root))
            .with_runner(runner)
            .with_secret_store(Arc::new(StaticSecretStore::new()));
        Fanout::new(executor)
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let temp = tempfile::tempdir().unwrap();
        let summary = fanout(temp.path(), Arc::new(ScriptedRunner::default()))
            .run(entries(&["good", "broken"]), JobVariant::CpuCompile)
            .await;

        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.results[0].reached, Some(JobState::Done));
        assert_eq!(
            summary.results[1].failed_state,
            Some(JobState::CheckpointAcquired)
        );
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.success());
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let temp = tempfile::tempdir().unwrap();
        let summary = fanout(temp.path(), Arc::new(ScriptedRunner::default()))
            .run(entries(&["first", "panic", "last"]), JobVariant::CpuAoti)
            .await;

        assert!(summary.results[0].succeeded());
        assert!(summary.results[2].succeeded());

        let crashed = &summary.results[1];
        assert_eq!(crashed.job_name, "panic (8-core-ubuntu)");
        assert_eq!(crashed.status, JobStatus::Failed);
        let error = crashed.error.as_deref().unwrap();
        assert!(error.contains("panicked"));
        assert!(error.contains("runner exploded"));
    }

    #[tokio::test]
    async fn test_results_keep_matrix_order() {
        let temp = tempfile::tempdir().unwrap();
        let names = ["a", "b", "c", "d", "e"];
        let summary = fanout(temp.path(), Arc::new(ScriptedRunner::default()))
            .run(entries(&names), JobVariant::CpuCompile)
            .await;

        let got: Vec<_> = summary
            .results
            .iter()
            .map(|r| r.entry.model_name.as_str())
            .collect();
        assert_eq!(got, names);
        assert!(summary.success());
    }

    #[tokio::test]
    async fn test_max_parallel_bounds_concurrency() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let summary = fanout(temp.path(), runner.clone())
            .with_max_parallel(1)
            .run(entries(&["a", "b", "c"]), JobVariant::CpuCompile)
            .await;

        assert!(summary.success());
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_matrix() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, mut rx) = progress_channel();
        let executor = JobExecutor::new(ServiceConfig::default().with_root(temp.path()))
            .with_progress(tx);

        let summary = Fanout::new(executor)
            .run(Vec::new(), JobVariant::Gpu)
            .await;

        assert!(summary.results.is_empty());
        assert!(summary.success());
        assert!(matches!(
            rx.recv().await,
            Some(ExecutionEvent::FanoutStarted { total_jobs: 0, .. })
        ));
    }
}
