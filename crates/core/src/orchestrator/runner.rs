//! Ingest orchestrator implementation.
//!
//! Two background loops share one engine state:
//! - Watch loop: polls the watch folder and appends stable files to the
//!   queue, and republishes status when pause is toggled
//! - Processing loop: takes the oldest queued file and runs it to completion,
//!   one job at a time

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dedup::Deduplicator;
use crate::job::{Job, JobOutcome, JobStage};
use crate::metrics::{ACTIVE_JOBS, FILES_ADMITTED, JOBS_TOTAL, JOB_DURATION, QUEUE_DEPTH};
use crate::pipeline::{ColorProcessor, JobObserver, PipelineRunner, Transcoder};
use crate::status::{
    ActiveJobView, Counters, EngineEvent, EngineState, HistoryRecord, StatusSnapshot,
    StatusStore, LOG_TAIL_CAP,
};
use crate::watcher::FileWatcher;

use super::config::OrchestratorConfig;
use super::control::EngineControl;
use super::queue::IngestQueue;
use super::types::OrchestratorError;

/// Callback invoked after every job stage change.
pub type TransitionCallback = Arc<dyn Fn(&Job) + Send + Sync>;

/// Everything a status snapshot is built from.
#[derive(Default)]
struct SharedState {
    queue: IngestQueue,
    active: Option<Job>,
    processed: u64,
    failed: u64,
    events: VecDeque<EngineEvent>,
}

impl SharedState {
    fn log(&mut self, at: DateTime<Utc>, message: String) {
        self.events.push_back(EngineEvent { at, message });
        while self.events.len() > LOG_TAIL_CAP {
            self.events.pop_front();
        }
    }
}

/// Forwards runner callbacks into the engine state.
struct StatusObserver<'a, C, T>
where
    C: ColorProcessor + 'static,
    T: Transcoder + 'static,
{
    orchestrator: &'a IngestOrchestrator<C, T>,
}

#[async_trait]
impl<'a, C, T> JobObserver for StatusObserver<'a, C, T>
where
    C: ColorProcessor + 'static,
    T: Transcoder + 'static,
{
    async fn on_transition(&self, job: &Job) {
        self.orchestrator.record_job(job, true).await;
    }

    async fn on_progress(&self, job: &Job) {
        self.orchestrator.record_job(job, false).await;
    }
}

/// The ingest orchestrator: watches, queues and processes files.
pub struct IngestOrchestrator<C, T>
where
    C: ColorProcessor + 'static,
    T: Transcoder + 'static,
{
    config: OrchestratorConfig,
    runner: PipelineRunner<C, T>,
    store: Arc<StatusStore>,
    dedup: Deduplicator,
    watcher: Mutex<FileWatcher>,
    state: Mutex<SharedState>,
    /// Held for the whole of a job; at most one job runs.
    job_slot: Mutex<()>,
    control: EngineControl,
    on_transition: Option<TransitionCallback>,

    // Runtime state
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C, T> IngestOrchestrator<C, T>
where
    C: ColorProcessor + 'static,
    T: Transcoder + 'static,
{
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        runner: PipelineRunner<C, T>,
        store: Arc<StatusStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let watcher = FileWatcher::new(config.watch_dir.clone(), &config.processing);

        Self {
            config,
            runner,
            store,
            dedup: Deduplicator::new(),
            watcher: Mutex::new(watcher),
            state: Mutex::new(SharedState::default()),
            job_slot: Mutex::new(()),
            control: EngineControl::new(),
            on_transition: None,
            running: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Set a callback to be invoked after every job stage change.
    pub fn with_transition_callback(mut self, callback: TransitionCallback) -> Self {
        self.on_transition = Some(callback);
        self
    }

    /// Use an existing pause handle instead of a fresh one.
    pub fn with_control(mut self, control: EngineControl) -> Self {
        self.control = control;
        self
    }

    pub fn control(&self) -> EngineControl {
        self.control.clone()
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Names of the files waiting in the queue, oldest first.
    pub async fn queued_files(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.queue.views().into_iter().map(|v| v.file_name).collect()
    }

    /// Start the watch and processing loops.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting ingest orchestrator");

        let watch = self.spawn_watch_loop();
        let processing = self.spawn_processing_loop();
        self.tasks.lock().await.extend([watch, processing]);

        info!("Ingest orchestrator started");
    }

    /// Stop both loops. A job in flight runs to completion first.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping ingest orchestrator");

        let _ = self.shutdown_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!("Orchestrator task ended abnormally: {}", e);
            }
        }

        self.refresh_status().await;
        info!("Ingest orchestrator stopped");
    }

    /// Run one watch-folder poll at `now`.
    ///
    /// Returns the names admitted to the queue by this poll.
    pub async fn poll_watch_folder(&self, now: DateTime<Utc>) -> Vec<String> {
        let queued = self.state.lock().await.queue.names();

        let admitted = {
            let mut watcher = self.watcher.lock().await;
            watcher.poll(now, &self.dedup, |name| queued.contains(name))
        };

        if admitted.is_empty() {
            return Vec::new();
        }

        let mut names = Vec::with_capacity(admitted.len());
        {
            let mut state = self.state.lock().await;
            for file in admitted {
                info!(file = %file.file_name, size = file.size_bytes, "Queued file");
                state.log(now, format!("Queued {}", file.file_name));
                state.queue.push(file.file_name.clone(), file.path, now);
                FILES_ADMITTED.inc();
                names.push(file.file_name);
            }
            QUEUE_DEPTH.set(state.queue.len() as i64);
            self.publish(&state, now);
        }

        self.control.wake();
        names
    }

    /// Take the oldest queued file and run it to a terminal stage.
    ///
    /// Returns `None` when paused or when the queue is empty.
    pub async fn process_next(&self) -> Result<Option<HistoryRecord>, OrchestratorError> {
        let _slot = self.job_slot.lock().await;

        if self.control.is_paused() {
            return Ok(None);
        }

        let mut job = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.queue.pop() else {
                return Ok(None);
            };

            let now = Utc::now();
            let mut job = Job::new(entry.file_name, entry.path, now);
            job.advance(JobStage::Claimed, now)?;

            state.log(now, format!("Claimed {}", job.file_name));
            state.active = Some(job.clone());
            QUEUE_DEPTH.set(state.queue.len() as i64);
            self.publish(&state, now);
            job
        };

        ACTIVE_JOBS.set(1);
        info!(job_id = %job.id, file = %job.file_name, "Claimed job");
        self.notify_transition(&job);

        let observer = StatusObserver { orchestrator: self };
        let run = self.runner.run(&mut job, &observer).await;

        let record = run
            .map_err(OrchestratorError::from)
            .and_then(|()| HistoryRecord::from_job(&job).ok_or(OrchestratorError::MissingOutcome(job.id)));

        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.active = None;
        ACTIVE_JOBS.set(0);

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                self.publish(&state, now);
                return Err(e);
            }
        };

        if let Err(e) = self.store.append_history(record.clone()) {
            error!("Failed to persist history for {}: {}", record.file_name, e);
        }

        match &job.outcome {
            Some(JobOutcome::Success { output_path }) => {
                state.processed += 1;
                state.log(now, format!("Finished {}", job.file_name));
                info!(
                    job_id = %job.id,
                    output = %output_path.display(),
                    duration_secs = record.duration_secs,
                    "Job finished"
                );
                JOBS_TOTAL.with_label_values(&["success", "none"]).inc();
                JOB_DURATION
                    .with_label_values(&["success"])
                    .observe(record.duration_secs);
            }
            Some(JobOutcome::Failure { reason, details }) => {
                state.failed += 1;
                state.log(now, format!("Failed {}: {}", job.file_name, reason));
                warn!(job_id = %job.id, reason = %reason, "Job failed: {}", details);
                JOBS_TOTAL
                    .with_label_values(&["failure", reason.as_str()])
                    .inc();
                JOB_DURATION
                    .with_label_values(&["failure"])
                    .observe(record.duration_secs);
            }
            None => {}
        }

        self.publish(&state, now);
        Ok(Some(record))
    }

    /// Build the current snapshot without publishing it.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        self.build_snapshot(&state, Utc::now())
    }

    /// Publish a fresh snapshot, picking up pause changes.
    pub async fn refresh_status(&self) {
        let state = self.state.lock().await;
        self.publish(&state, Utc::now());
    }

    /// Update the active job view after a runner callback.
    async fn record_job(&self, job: &Job, transition: bool) {
        let now = Utc::now();
        {
            let mut state = self.state.lock().await;
            if transition {
                state.log(now, format!("{}: {}", job.file_name, job.stage));
            }
            state.active = Some(job.clone());
            self.publish(&state, now);
        }

        if transition {
            debug!(job_id = %job.id, stage = %job.stage, "Job stage changed");
            self.notify_transition(job);
        }
    }

    fn notify_transition(&self, job: &Job) {
        if let Some(callback) = &self.on_transition {
            callback(job);
        }
    }

    fn build_snapshot(&self, state: &SharedState, now: DateTime<Utc>) -> StatusSnapshot {
        let paused = self.control.is_paused();
        let active = state.active.as_ref().filter(|job| !job.stage.is_terminal());

        StatusSnapshot {
            state: EngineState::derive(paused, active.is_some()),
            paused,
            active_job: active.map(|job| ActiveJobView::from_job(job, now)),
            queue: state.queue.views(),
            counters: Counters {
                processed: state.processed,
                failed: state.failed,
                queued: state.queue.len(),
            },
            log_tail: state.events.iter().cloned().collect(),
            updated_at: now,
        }
    }

    fn publish(&self, state: &SharedState, now: DateTime<Utc>) {
        if let Err(e) = self.store.publish(self.build_snapshot(state, now)) {
            error!("Failed to persist status: {}", e);
        }
    }

    fn spawn_watch_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut pause_rx = self.control.subscribe();

        tokio::spawn(async move {
            info!(
                "Watch loop started on {}",
                orchestrator.config.watch_dir.display()
            );
            let mut ticker = tokio::time::interval(orchestrator.config.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("Watch loop received shutdown signal");
                        break;
                    }
                    // The processing loop is busy while a job runs; publish
                    // pause changes from here so they show up immediately.
                    Ok(()) = pause_rx.changed() => {
                        orchestrator.refresh_status().await;
                    }
                    _ = ticker.tick() => {
                        if !orchestrator.running.load(Ordering::Relaxed) {
                            break;
                        }
                        if orchestrator.store.has_pending_writes() {
                            if let Err(e) = orchestrator.store.retry_pending() {
                                error!("Status write still failing: {}", e);
                            }
                        }
                        orchestrator.poll_watch_folder(Utc::now()).await;
                    }
                }
            }
            info!("Watch loop stopped");
        })
    }

    fn spawn_processing_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let idle_wait = orchestrator.config.poll_interval();

        tokio::spawn(async move {
            info!("Processing loop started");
            'outer: loop {
                loop {
                    if !orchestrator.running.load(Ordering::SeqCst) {
                        break 'outer;
                    }
                    match orchestrator.process_next().await {
                        Ok(Some(_)) => continue,
                        Ok(None) => break,
                        Err(e) => {
                            error!("Processing error: {}", e);
                            break;
                        }
                    }
                }

                orchestrator.refresh_status().await;

                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("Processing loop received shutdown signal");
                        break;
                    }
                    _ = orchestrator.control.notified() => {}
                    _ = tokio::time::sleep(idle_wait) => {}
                }
            }
            info!("Processing loop stopped");
        })
    }
}
