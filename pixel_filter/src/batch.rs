//! Batch Coordinator
//!
//! Runs one decode -> filter -> encode unit per input file on a rayon pool,
//! isolates per-item failures, aggregates progress and reports everything
//! through [`BatchEvent`]s.
//!
//! State machine: Idle -> Running -> Idle. Only one run may be active per
//! coordinator; a second `start` while Running is rejected, not queued.

use crate::cancel::{CancelSignal, Cancelled};
use crate::codec::{self, DecodeError, EncodeError};
use crate::events::{BatchEvent, BatchListener, EventBus, LogTag, ProcessedImage};
use crate::filter::{apply as apply_filter, FilterKind};
use crate::pixel_buffer::PixelBuffer;
use crate::thread_manager;
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// One input file and the output it will produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl WorkItem {
    pub fn new(input: impl Into<PathBuf>, filter: FilterKind) -> Self {
        let input = input.into();
        let output = Self::output_path(&input, filter);
        Self { input, output }
    }

    /// `<dir>/<prefix>_<file name>`, next to the input. The original
    /// extension is kept even though the content is always PNG.
    pub fn output_path(input: &Path, filter: FilterKind) -> PathBuf {
        let name = format!("{}_{}", filter.prefix(), file_name_of(input));
        match input.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.input)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Final result of one work item. Reported exactly once per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Done,
    Canceled,
    Failed(String),
}

impl Outcome {
    pub fn status_text(&self) -> &'static str {
        match self {
            Outcome::Done => "Done",
            Outcome::Canceled => "Canceled",
            Outcome::Failed(_) => "Failed",
        }
    }
}

/// Everything that can end a single unit of work early.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Canceled(#[from] Cancelled),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    Completed,
    Cancelled,
    CompletedWithErrors,
}

impl BatchStatus {
    /// Cancelled wins over failures, failures win over success.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let mut any_failed = false;
        for outcome in outcomes {
            match outcome {
                Outcome::Canceled => return BatchStatus::Cancelled,
                Outcome::Failed(_) => any_failed = true,
                Outcome::Done => {}
            }
        }
        if any_failed {
            BatchStatus::CompletedWithErrors
        } else {
            BatchStatus::Completed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub item: WorkItem,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub filter: FilterKind,
    pub results: Vec<ItemResult>,
    pub elapsed: Duration,
}

impl BatchSummary {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| *o == Outcome::Done)
    }

    pub fn canceled(&self) -> usize {
        self.count(|o| *o == Outcome::Canceled)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// Inputs that failed, with their error messages.
    pub fn errors(&self) -> impl Iterator<Item = (&Path, &str)> + '_ {
        self.results.iter().filter_map(|r| match &r.outcome {
            Outcome::Failed(msg) => Some((r.item.input.as_path(), msg.as_str())),
            _ => None,
        })
    }

    pub fn outcome_for(&self, input: &Path) -> Option<&Outcome> {
        self.results
            .iter()
            .find(|r| r.item.input == input)
            .map(|r| &r.outcome)
    }

    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            100.0
        } else {
            (self.succeeded() as f64 / self.total() as f64) * 100.0
        }
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("no input files")]
    NoInputs,

    #[error("a batch run is already in progress")]
    AlreadyRunning,

    #[error("failed to spawn batch thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Pool size for a coordinator.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub threads: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threads: thread_manager::get_optimal_threads(),
        }
    }
}

impl BatchConfig {
    /// Automatic sizing, unless `PIXEL_FILTER_THREADS` says otherwise.
    pub fn from_env() -> Self {
        match thread_manager::threads_from_env() {
            Some(threads) => Self { threads },
            None => Self::default(),
        }
    }

    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

struct Inner {
    config: BatchConfig,
    bus: EventBus,
    /// `Some` while Running; holds the live run's cancellation flag.
    active: Mutex<Option<CancelSignal>>,
    /// Held across a state flip and its `StateChanged` event so listeners
    /// see `true`/`false` strictly alternate.
    transition: Mutex<()>,
}

pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

impl BatchCoordinator {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                bus: EventBus::default(),
                active: Mutex::new(None),
                transition: Mutex::new(()),
            }),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn BatchListener>) {
        self.inner.bus.subscribe(listener);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.active).is_some()
    }

    /// Starts a run in the background and returns immediately.
    ///
    /// Rejected with [`StartError::NoInputs`] for an empty list and with
    /// [`StartError::AlreadyRunning`] while another run is active; neither
    /// rejection changes any state or emits any event.
    ///
    /// Listeners must not call `start` from inside a `StateChanged` event.
    pub fn start(
        &self,
        paths: Vec<PathBuf>,
        filter: FilterKind,
    ) -> Result<BatchHandle, StartError> {
        if paths.is_empty() {
            return Err(StartError::NoInputs);
        }

        let transition = lock(&self.inner.transition);
        let cancel = {
            let mut active = lock(&self.inner.active);
            if active.is_some() {
                warn!("Ignoring start request: a batch run is already in progress");
                return Err(StartError::AlreadyRunning);
            }
            let cancel = CancelSignal::new();
            *active = Some(cancel.clone());
            cancel
        };
        self.inner.bus.publish(BatchEvent::StateChanged(true));
        drop(transition);

        let items: Vec<WorkItem> = paths.into_iter().map(|p| WorkItem::new(p, filter)).collect();

        self.inner.bus.publish(BatchEvent::Progress(0));
        self.inner.bus.log(
            LogTag::Info,
            format!("Filtering {} image(s) with {} filter...", items.len(), filter),
        );

        let inner = Arc::clone(&self.inner);
        let run_items = items.clone();
        let run_cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("pixel-filter-batch".into())
            .spawn(move || inner.drive(run_items, filter, run_cancel));

        match spawned {
            Ok(thread) => Ok(BatchHandle {
                inner: Arc::clone(&self.inner),
                thread,
                cancel,
                items,
                filter,
                started: Instant::now(),
            }),
            Err(e) => {
                error!(error = %e, "Failed to spawn batch thread");
                self.inner
                    .abort_run(format!("Error: failed to start batch run: {}", e));
                Err(StartError::Spawn(e))
            }
        }
    }

    /// Blocking convenience: `start` followed by `join`.
    pub fn run(&self, paths: Vec<PathBuf>, filter: FilterKind) -> Result<BatchSummary, StartError> {
        Ok(self.start(paths, filter)?.join())
    }

    /// Requests cancellation of the active run.
    ///
    /// Returns `false` (and does nothing) when idle or when cancellation was
    /// already requested.
    pub fn cancel(&self) -> bool {
        self.inner.request_cancel(None)
    }
}

/// Handle to a run started with [`BatchCoordinator::start`].
pub struct BatchHandle {
    inner: Arc<Inner>,
    thread: JoinHandle<BatchSummary>,
    cancel: CancelSignal,
    items: Vec<WorkItem>,
    filter: FilterKind,
    started: Instant,
}

impl BatchHandle {
    /// Cancels this run if it is still the active one.
    pub fn cancel(&self) -> bool {
        self.inner.request_cancel(Some(&self.cancel))
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for every unit to report. Never fails: if the driver thread
    /// itself died, every item is reported as failed.
    pub fn join(self) -> BatchSummary {
        match self.thread.join() {
            Ok(summary) => summary,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(error = %msg, "Batch driver panicked");
                BatchSummary {
                    status: BatchStatus::CompletedWithErrors,
                    filter: self.filter,
                    results: self
                        .items
                        .into_iter()
                        .map(|item| ItemResult {
                            item,
                            outcome: Outcome::Failed(format!("batch aborted: {}", msg)),
                        })
                        .collect(),
                    elapsed: self.started.elapsed(),
                }
            }
        }
    }
}

/// Drives the run back to Idle however the driver exits. When dropped while
/// still armed (unwinding), it also forces the final progress and an error line.
struct RunGuard<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.abort_run("Error: batch run aborted unexpectedly.");
        } else {
            self.inner.finish_run();
        }
    }
}

impl Inner {
    fn request_cancel(&self, only: Option<&CancelSignal>) -> bool {
        let active = lock(&self.active);
        let requested = match active.as_ref() {
            Some(signal) if only.map_or(true, |o| o.same_as(signal)) => signal.cancel(),
            _ => false,
        };
        drop(active);

        if requested {
            self.bus.log(LogTag::Cancel, "Cancel requested.");
        }
        requested
    }

    /// Idle transition. Dropping the signal clears the cancellation flag
    /// for the next run. `StateChanged(false)` goes out before a new `start`
    /// can observe the coordinator as idle.
    fn finish_run(&self) {
        let _transition = lock(&self.transition);
        self.bus.publish(BatchEvent::StateChanged(false));
        *lock(&self.active) = None;
    }

    /// Ends a run that never produced a summary: final progress, an error
    /// line as the terminal log, then Idle.
    fn abort_run(&self, message: impl Into<String>) {
        self.bus.publish(BatchEvent::Progress(100));
        self.bus.log(LogTag::Error, message);
        self.finish_run();
    }

    fn build_pool(&self) -> Option<rayon::ThreadPool> {
        let threads = self.config.threads.max(1);
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pixel-filter-{}", i))
            .build()
            .or_else(|_| rayon::ThreadPoolBuilder::new().num_threads(2).build())
            .map_err(|e| {
                warn!(error = %e, "Failed to create thread pool, using the global pool");
            })
            .ok()
    }

    fn drive(
        &self,
        items: Vec<WorkItem>,
        filter: FilterKind,
        cancel: CancelSignal,
    ) -> BatchSummary {
        let mut guard = RunGuard {
            inner: self,
            armed: true,
        };
        let started = Instant::now();
        let total = items.len();
        let completed = AtomicUsize::new(0);
        let last_progress = Mutex::new(0u8);

        let run_unit = |item: &WorkItem| -> Outcome {
            let outcome = self.run_unit(item, filter, &cancel);
            let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
            self.publish_progress(&last_progress, (done * 100 / total) as u8);
            outcome
        };

        let outcomes: Vec<Outcome> = match self.build_pool() {
            Some(pool) => {
                debug!(threads = pool.current_num_threads(), total, "Dispatching batch");
                pool.install(|| items.par_iter().map(run_unit).collect())
            }
            None => items.par_iter().map(run_unit).collect(),
        };

        let status = BatchStatus::from_outcomes(&outcomes);
        let summary = BatchSummary {
            status,
            filter,
            results: items
                .into_iter()
                .zip(outcomes)
                .map(|(item, outcome)| ItemResult { item, outcome })
                .collect(),
            elapsed: started.elapsed(),
        };

        self.publish_progress(&last_progress, 100);
        match status {
            BatchStatus::Completed => self
                .bus
                .log(LogTag::Complete, "All images processed successfully."),
            BatchStatus::CompletedWithErrors => self.bus.log(
                LogTag::Warning,
                format!(
                    "Processing finished with errors: {} of {} image(s) failed.",
                    summary.failed(),
                    summary.total()
                ),
            ),
            BatchStatus::Cancelled => self.bus.log(LogTag::Cancel, "Processing was canceled."),
        }
        info!(
            status = ?status,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            canceled = summary.canceled(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Batch run finished"
        );

        guard.armed = false;
        drop(guard);
        summary
    }

    /// Publishes `percent` unless a larger value already went out, so
    /// observers see a non-decreasing sequence under concurrent completions.
    fn publish_progress(&self, last: &Mutex<u8>, percent: u8) {
        let percent = percent.min(100);
        let mut last = lock(last);
        if percent < *last {
            return;
        }
        *last = percent;
        self.bus.publish(BatchEvent::Progress(percent));
    }

    /// One isolated unit: never panics, never fails the batch.
    fn run_unit(&self, item: &WorkItem, filter: FilterKind, cancel: &CancelSignal) -> Outcome {
        let file_name = item.file_name();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.process(item, &file_name, filter, cancel)
        }))
        .unwrap_or_else(|payload| {
            Err(ItemError::Unexpected(format!(
                "panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

        let (outcome, image) = match result {
            Ok(buffer) => (Outcome::Done, Some(Arc::new(buffer))),
            Err(ItemError::Canceled(_)) => (Outcome::Canceled, None),
            Err(e) => (Outcome::Failed(e.to_string()), None),
        };

        self.bus.publish(BatchEvent::ItemProcessed(ProcessedImage {
            file_name: file_name.clone(),
            input: item.input.clone(),
            output: (outcome == Outcome::Done).then(|| item.output.clone()),
            outcome: outcome.clone(),
            image,
        }));

        match &outcome {
            Outcome::Done => self.bus.log(
                LogTag::Success,
                format!("{} processed with {} filter.", file_name, filter),
            ),
            Outcome::Canceled => self
                .bus
                .log(LogTag::Warning, format!("{} canceled.", file_name)),
            Outcome::Failed(msg) => self
                .bus
                .log(LogTag::Error, format!("Error: {}: {}", file_name, msg)),
        }
        outcome
    }

    fn process(
        &self,
        item: &WorkItem,
        file_name: &str,
        filter: FilterKind,
        cancel: &CancelSignal,
    ) -> Result<PixelBuffer, ItemError> {
        cancel.check()?;
        self.bus.log(LogTag::Info, format!("Processing {}...", file_name));

        let original = codec::decode(&item.input)?;
        cancel.check()?;

        let filtered = apply_filter(&original, filter, cancel)?;
        drop(original);

        // Last chance to back out before anything touches the disk.
        cancel.check()?;
        codec::encode(&filtered, &item.output)?;
        Ok(filtered)
    }
}
