// Fetch coordinator - bounded fetch pool, single fetches and strategy races
//
// Every strategy runs in its own spawned task holding a pool permit and an
// attempt directory. Results travel back over a channel; whoever drops the
// receiving side (race loser, expired secondary, cancelled caller) also drops
// any artifact still in flight, which deletes it from disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::errors::FetchError;
use super::models::{AttemptDir, ExtractOptions, Fetched, SearchEntry, Strategy};
use super::traits::Extractor;

/// Lifecycle of one strategy inside the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded(PathBuf),
    Failed(String),
    Cancelled,
}

/// Bookkeeping for one strategy of one request
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub strategy: Strategy,
    pub timeout: Duration,
    pub started_at: Instant,
    pub state: TaskState,
}

/// What to fetch and how
#[derive(Debug, Clone)]
pub struct FetchSpec {
    pub source: String,
    pub strategy: Strategy,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
}

impl FetchSpec {
    pub fn new(source: impl Into<String>, strategy: Strategy, timeout: Duration) -> Self {
        Self {
            source: source.into(),
            strategy,
            timeout,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Clone)]
pub struct FetchCoordinator {
    extractor: Arc<dyn Extractor>,
    permits: Arc<Semaphore>,
    work_dir: PathBuf,
}

impl FetchCoordinator {
    pub fn new(extractor: Arc<dyn Extractor>, max_concurrent: usize, work_dir: PathBuf) -> Self {
        Self {
            extractor,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            work_dir,
        }
    }

    /// Search lookup under `timeout`, pool wait included
    pub async fn lookup(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<SearchEntry>, FetchError> {
        let started = Instant::now();
        let work = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| FetchError::NetworkError("fetch pool closed".to_string()))?;
            self.extractor.search(query, limit, timeout).await
        };

        let result = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        debug!(
            limit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "lookup finished"
        );
        result
    }

    /// Run a single strategy to completion
    pub async fn fetch_one(&self, spec: FetchSpec) -> Result<Fetched, FetchError> {
        let strategy = spec.strategy;
        let handle = AbortOnDrop(tokio::spawn(run_strategy(
            Arc::clone(&self.extractor),
            Arc::clone(&self.permits),
            self.work_dir.clone(),
            spec,
        )));

        match handle.join().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%strategy, error = %e, "fetch task did not complete");
                Err(FetchError::NetworkError(format!("fetch task failed: {}", e)))
            }
        }
    }

    /// Race several strategies of the same source.
    ///
    /// Resolves with the first success. Strategies that have not finished yet
    /// stay reachable through [`RaceWin::secondary`] until `deadline` (measured
    /// from the start of the race). Failures never end the race early while
    /// another strategy is still running.
    pub async fn race(
        &self,
        source: &str,
        strategies: &[Strategy],
        headers: &[(String, String)],
        per_strategy: Duration,
        deadline: Duration,
    ) -> Result<RaceWin, FetchError> {
        let started = Instant::now();
        let (tx, rx) = mpsc::channel(strategies.len().max(1));
        let mut tasks = Vec::with_capacity(strategies.len());
        let mut handles = Vec::with_capacity(strategies.len());

        for (idx, strategy) in strategies.iter().copied().enumerate() {
            let spec = FetchSpec::new(source, strategy, per_strategy).with_headers(headers.to_vec());
            let tx = tx.clone();
            let extractor = Arc::clone(&self.extractor);
            let permits = Arc::clone(&self.permits);
            let work_dir = self.work_dir.clone();

            handles.push(tokio::spawn(async move {
                let outcome = run_strategy(extractor, permits, work_dir, spec).await;
                // receiver gone: the artifact inside `outcome` is dropped and deleted
                let _ = tx.send((idx, outcome)).await;
            }));
            tasks.push(FetchTask {
                strategy,
                timeout: per_strategy,
                started_at: started,
                state: TaskState::Running,
            });
        }
        drop(tx);

        let mut running = Running {
            tasks,
            handles,
            results: rx,
            deadline: started + deadline,
        };
        let mut failures = Vec::new();

        loop {
            match running.recv().await {
                Received::Deadline => {
                    warn!(source, deadline_s = deadline.as_secs(), "race deadline elapsed");
                    return Err(FetchError::DeadlineExceeded(deadline));
                }
                Received::Closed => {
                    warn!(source, failed = failures.len(), "every strategy failed");
                    return Err(FetchError::AllStrategiesFailed(failures));
                }
                Received::Done(strategy, Err(e)) => {
                    debug!(%strategy, error = %e, "strategy failed, waiting for the rest");
                    failures.push((strategy, e));
                }
                Received::Done(strategy, Ok(fetched)) => {
                    info!(
                        %strategy,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "race won"
                    );
                    return Ok(RaceWin {
                        primary: fetched,
                        secondary: Secondary {
                            running: Some(running),
                        },
                    });
                }
            }
        }
    }
}

/// First success of a race plus the strategies still running
#[derive(Debug)]
pub struct RaceWin {
    pub primary: Fetched,
    pub secondary: Secondary,
}

/// Late results of a race, pollable until the race deadline.
///
/// Dropping it cancels whatever is still running and deletes any artifact
/// that arrives afterwards.
#[derive(Debug)]
pub struct Secondary {
    running: Option<Running>,
}

impl Secondary {
    /// Strategies that have not reached a terminal state yet
    pub fn pending(&self) -> Vec<Strategy> {
        self.running
            .as_ref()
            .map(|r| {
                r.tasks
                    .iter()
                    .filter(|t| t.state == TaskState::Running)
                    .map(|t| t.strategy)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tasks(&self) -> &[FetchTask] {
        self.running.as_ref().map_or(&[], |r| r.tasks.as_slice())
    }

    /// Next successful late result, or `None` once nothing can arrive before the deadline
    pub async fn next(&mut self) -> Option<Fetched> {
        let running = self.running.as_mut()?;
        loop {
            match running.recv().await {
                Received::Done(_, Ok(fetched)) => return Some(fetched),
                Received::Done(strategy, Err(e)) => {
                    debug!(%strategy, error = %e, "secondary strategy failed");
                }
                Received::Deadline | Received::Closed => {
                    self.running = None;
                    return None;
                }
            }
        }
    }

    /// Stop the remaining strategies now
    pub fn cancel(mut self) {
        self.running = None;
    }
}

enum Received {
    Done(Strategy, Result<Fetched, FetchError>),
    Closed,
    Deadline,
}

#[derive(Debug)]
struct Running {
    tasks: Vec<FetchTask>,
    handles: Vec<JoinHandle<()>>,
    results: mpsc::Receiver<(usize, Result<Fetched, FetchError>)>,
    deadline: Instant,
}

impl Running {
    async fn recv(&mut self) -> Received {
        match tokio::time::timeout_at(self.deadline, self.results.recv()).await {
            Err(_) => Received::Deadline,
            Ok(None) => Received::Closed,
            Ok(Some((idx, outcome))) => {
                let task = &mut self.tasks[idx];
                task.state = match &outcome {
                    Ok(fetched) => TaskState::Succeeded(fetched.artifact.path().to_path_buf()),
                    Err(e) => TaskState::Failed(e.to_string()),
                };
                Received::Done(task.strategy, outcome)
            }
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        for task in &mut self.tasks {
            if matches!(task.state, TaskState::Pending | TaskState::Running) {
                task.state = TaskState::Cancelled;
                debug!(strategy = %task.strategy, "strategy cancelled");
            }
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T, tokio::task::JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Body of one strategy task: permit, attempt directory, bounded extraction.
///
/// The budget starts at dispatch, so time spent queued for a permit counts.
async fn run_strategy(
    extractor: Arc<dyn Extractor>,
    permits: Arc<Semaphore>,
    work_dir: PathBuf,
    spec: FetchSpec,
) -> Result<Fetched, FetchError> {
    let deadline = Instant::now() + spec.timeout;
    let _permit = match tokio::time::timeout_at(deadline, permits.acquire_owned()).await {
        Ok(permit) => {
            permit.map_err(|_| FetchError::NetworkError("fetch pool closed".to_string()))?
        }
        Err(_) => {
            warn!(strategy = %spec.strategy, timeout_s = spec.timeout.as_secs(), "no fetch slot before timeout");
            return Err(FetchError::Timeout(spec.timeout));
        }
    };

    let attempt = AttemptDir::create(&work_dir)
        .map_err(|e| FetchError::NetworkError(format!("cannot create attempt directory: {}", e)))?;
    let opts = ExtractOptions {
        strategy: spec.strategy,
        timeout: spec.timeout,
        headers: spec.headers.clone(),
        output_dir: attempt.path().to_path_buf(),
    };

    let started = Instant::now();
    info!(strategy = %spec.strategy, source = %spec.source, extractor = extractor.name(), "strategy started");

    let media = match tokio::time::timeout_at(deadline, extractor.extract(&spec.source, &opts)).await {
        Ok(Ok(media)) => media,
        Ok(Err(e)) => {
            warn!(strategy = %spec.strategy, error = %e, "strategy failed");
            return Err(e);
        }
        Err(_) => {
            warn!(strategy = %spec.strategy, timeout_s = spec.timeout.as_secs(), "strategy timed out");
            return Err(FetchError::Timeout(spec.timeout));
        }
    };

    if !media.path.starts_with(attempt.path()) {
        return Err(FetchError::NetworkError(format!(
            "extractor wrote outside its attempt directory: {}",
            media.path.display()
        )));
    }

    info!(
        strategy = %spec.strategy,
        id = %media.id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "strategy succeeded"
    );
    Ok(Fetched {
        strategy: spec.strategy,
        id: media.id,
        title: media.title,
        artifact: attempt.into_artifact(media.path),
    })
}
