//! Benchmark scheduler: drives a session over every (test case, provider)
//! pair in order.
//!
//! The session loop runs in its own task, watched by a supervisor task that
//! turns a panicking loop into a `Failed` session. Session, results and
//! progress are published through `watch` channels; results are always
//! published before the progress count that includes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::ProviderId;
use crate::orchestrator::ProviderOrchestrator;
use crate::sampler::MetricsSampler;

use super::attempt::{run_attempt, AttemptContext, AttemptOutcome};
use super::types::{BenchmarkProgress, BenchmarkResult, BenchmarkSession, BenchmarkStatus};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("A benchmark session is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between consecutive pairs. Not applied after the last pair.
    pub inter_test_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { inter_test_delay: Duration::from_millis(2000) }
    }
}

struct Shared {
    orchestrator: Arc<ProviderOrchestrator>,
    sampler: Arc<MetricsSampler>,
    config: SchedulerConfig,
    session: watch::Sender<Option<BenchmarkSession>>,
    results: watch::Sender<Vec<BenchmarkResult>>,
    progress: watch::Sender<BenchmarkProgress>,
    /// Set by `start`, cleared once the terminal session is published.
    running: AtomicBool,
}

struct ActiveRun {
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

pub struct BenchmarkScheduler {
    shared: Arc<Shared>,
    // Held across `stop`, so `start` observes a stop in progress as busy.
    run: tokio::sync::Mutex<Option<ActiveRun>>,
}

impl BenchmarkScheduler {
    pub fn new(
        orchestrator: Arc<ProviderOrchestrator>,
        sampler: Arc<MetricsSampler>,
        config: SchedulerConfig,
    ) -> Self {
        let (session, _) = watch::channel(None);
        let (results, _) = watch::channel(Vec::new());
        let (progress, _) = watch::channel(BenchmarkProgress::default());
        Self {
            shared: Arc::new(Shared {
                orchestrator,
                sampler,
                config,
                session,
                results,
                progress,
                running: AtomicBool::new(false),
            }),
            run: tokio::sync::Mutex::new(None),
        }
    }

    /// Start running `session` in the background and return its id.
    ///
    /// A session that is not `Idle` is rerun under a fresh id. Must be
    /// called from within a tokio runtime.
    pub fn start(&self, session: BenchmarkSession) -> Result<String, SchedulerError> {
        let mut run = self.run.try_lock().map_err(|_| SchedulerError::AlreadyRunning)?;
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let mut session = if session.status == BenchmarkStatus::Idle { session } else { session.rerun() };
        session.results.clear();
        session.current_test_index = 0;
        session.current_provider_index = 0;
        session.start_time = Some(Utc::now());
        session.end_time = None;
        session.transition(BenchmarkStatus::Running);

        let id = session.id.clone();
        tracing::info!(
            session_id = %id,
            name = %session.name,
            pairs = session.total_pairs(),
            "benchmark session started"
        );

        self.shared.results.send_replace(Vec::new());
        self.shared.progress.send_replace(BenchmarkProgress {
            total_tests: session.total_pairs(),
            is_running: true,
            ..Default::default()
        });
        self.shared.session.send_replace(Some(session.clone()));

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(session_loop(self.shared.clone(), session, cancel.clone()));
        let supervisor = tokio::spawn(supervise(self.shared.clone(), worker));
        *run = Some(ActiveRun { cancel, supervisor });
        Ok(id)
    }

    /// Cancel the running session and wait for its loop to exit.
    ///
    /// Returns true if the session ended up `Cancelled`. A finished session
    /// keeps its terminal status.
    pub async fn stop(&self) -> bool {
        let mut run = self.run.lock().await;
        if !self.shared.running.load(Ordering::SeqCst) {
            return false;
        }
        let Some(active) = run.take() else { return false };

        tracing::info!("benchmark stop requested");
        active.cancel.cancel();
        self.shared.orchestrator.interrupt_current().await;
        if let Err(e) = active.supervisor.await {
            tracing::error!(error = %e, "benchmark supervisor ended abnormally");
        }
        self.shared.sampler.cancel().await;

        // The loop normally publishes its own terminal state.
        let results = self.shared.results.borrow().clone();
        self.shared.session.send_modify(|session| {
            if let Some(session) = session {
                if session.transition(BenchmarkStatus::Cancelled) {
                    session.end_time = Some(Utc::now());
                    session.results = results;
                }
            }
        });
        self.shared.progress.send_modify(|p| p.is_running = false);
        self.shared.running.store(false, Ordering::SeqCst);

        self.shared
            .session
            .borrow()
            .as_ref()
            .is_some_and(|s| s.status == BenchmarkStatus::Cancelled)
    }

    /// Drop the current session, its results and progress. Does not stop
    /// a running session.
    pub fn clear(&self) {
        self.shared.session.send_replace(None);
        self.shared.results.send_replace(Vec::new());
        self.shared.progress.send_replace(BenchmarkProgress::default());
    }

    /// Wait until the current session leaves `Running` and return it.
    pub async fn wait_until_finished(&self) -> Option<BenchmarkSession> {
        let mut rx = self.shared.session.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                match current.as_ref() {
                    Some(session) if session.status == BenchmarkStatus::Running => {}
                    other => return other.cloned(),
                }
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn current_session(&self) -> Option<BenchmarkSession> {
        self.shared.session.borrow().clone()
    }

    pub fn results(&self) -> Vec<BenchmarkResult> {
        self.shared.results.borrow().clone()
    }

    pub fn progress(&self) -> BenchmarkProgress {
        self.shared.progress.borrow().clone()
    }

    pub fn results_for_provider(&self, provider: ProviderId) -> Vec<BenchmarkResult> {
        self.shared
            .results
            .borrow()
            .iter()
            .filter(|r| r.provider == provider)
            .cloned()
            .collect()
    }

    pub fn results_for_test_case(&self, test_case_id: &str) -> Vec<BenchmarkResult> {
        self.shared
            .results
            .borrow()
            .iter()
            .filter(|r| r.test_case_id == test_case_id)
            .cloned()
            .collect()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<BenchmarkSession>> {
        self.shared.session.subscribe()
    }

    pub fn subscribe_results(&self) -> watch::Receiver<Vec<BenchmarkResult>> {
        self.shared.results.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<BenchmarkProgress> {
        self.shared.progress.subscribe()
    }
}

async fn supervise(shared: Arc<Shared>, worker: JoinHandle<()>) {
    let Err(e) = worker.await else { return };
    tracing::error!(error = %e, "benchmark loop aborted");

    shared.sampler.cancel().await;
    shared.orchestrator.release_current().await;

    let results = shared.results.borrow().clone();
    shared.session.send_modify(|session| {
        if let Some(session) = session {
            if session.transition(BenchmarkStatus::Failed) {
                session.end_time = Some(Utc::now());
                session.results = results;
            }
        }
    });
    shared.progress.send_modify(|p| {
        p.is_running = false;
        p.current_test_case = None;
        p.current_provider = None;
    });
    shared.running.store(false, Ordering::SeqCst);
}

async fn session_loop(shared: Arc<Shared>, mut session: BenchmarkSession, cancel: CancellationToken) {
    let total = session.total_pairs();
    let device = shared.sampler.device_info();
    let delay = shared.config.inter_test_delay;
    let test_cases = session.test_cases.clone();
    let providers = session.providers.clone();
    let session_id = session.id.clone();
    let mut results: Vec<BenchmarkResult> = Vec::with_capacity(total);

    let ctx = AttemptContext {
        orchestrator: &shared.orchestrator,
        sampler: &shared.sampler,
        device: &device,
        session_id: &session_id,
        prompt_mode: session.prompt_mode,
        cancel: &cancel,
    };

    'pairs: for (test_index, test_case) in test_cases.iter().enumerate() {
        for (provider_index, &provider) in providers.iter().enumerate() {
            if cancel.is_cancelled() {
                break 'pairs;
            }

            session.current_test_index = test_index;
            session.current_provider_index = provider_index;
            shared.session.send_replace(Some(session.clone()));
            shared.progress.send_modify(|p| {
                p.current_test_case = Some(test_case.name.clone());
                p.current_provider = Some(provider);
            });

            match run_attempt(&ctx, test_case, provider).await {
                AttemptOutcome::Finished(result) => {
                    results.push(*result);
                    shared.results.send_replace(results.clone());
                    let completed = results.len();
                    shared.progress.send_modify(|p| p.completed_tests = completed);
                }
                AttemptOutcome::Cancelled => break 'pairs,
            }

            if results.len() < total && !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break 'pairs,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    shared.orchestrator.release_current().await;

    // A full matrix is a completed run even if a stop arrived afterwards.
    let status = if results.len() == total {
        BenchmarkStatus::Completed
    } else {
        BenchmarkStatus::Cancelled
    };
    let failed = results.iter().filter(|r| !r.success).count();
    session.results = results;
    session.end_time = Some(Utc::now());
    session.transition(status);
    tracing::info!(
        session_id = %session.id,
        status = ?status,
        results = session.results.len(),
        failed,
        "benchmark session finished"
    );

    shared.progress.send_modify(|p| {
        p.is_running = false;
        p.is_completed = status == BenchmarkStatus::Completed;
        p.current_test_case = None;
        p.current_provider = None;
    });
    shared.session.send_replace(Some(session));
    shared.running.store(false, Ordering::SeqCst);
}
