//! Periodic polling, alerting and daily summary tasks
//!
//! # Overview
//!
//! [`PollingScheduler::run`] spawns one tokio task per source plus a
//! notification task and a daily summary task into a single `JoinSet`:
//!
//! ```text
//!  ┌──────────────┐  ┌──────────────┐  ┌───────────────┐  ┌───────────────┐
//!  │ twitter loop │  │ reddit loop  │  │ notifications │  │ daily summary │
//!  │ fetch→store  │  │ fetch→store  │  │ detect→alert  │  │ check→digest  │
//!  └──────┬───────┘  └──────┬───────┘  └───────┬───────┘  └───────┬───────┘
//!         └─────────────────┴─────────┬────────┴──────────────────┘
//!                                     ▼
//!                         SchedulerContext (running flag,
//!                         per-task state, last check)
//! ```
//!
//! Stopping is cooperative: [`SchedulerHandle::stop`] clears the running
//! flag, which each loop checks at its top. Fetches and sleeps already in
//! flight complete first; [`PollingScheduler::run_until`] ties that stop to
//! a shutdown signal without cancelling the run. A task that panics stops
//! the whole run with [`SchedulerError::TaskFailed`].
//!
//! # Modules
//!
//! - [`daily`] - once-a-day trigger window
//! - [`pipeline`] - the fetch/persist, detection and summary steps
//! - [`error`] - scheduler errors

pub mod daily;
pub mod error;
pub mod pipeline;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::analytics::{EmergenceDetector, ScoreEngine};
use crate::config::Config;
use crate::notifications::SharedNotifier;
use crate::sources::{RedditSource, SharedSource, TwitterSource};
use crate::storage::SharedTrendStore;

pub use daily::DailyTrigger;
pub use error::{SchedulerError, SchedulerResult};
pub use pipeline::Pipeline;

/// Items requested per filter by [`PollingScheduler::run_single_check`]
pub const SINGLE_CHECK_LIMIT: u32 = 3;

const NOTIFICATION_TASK: &str = "notifications";
const DAILY_SUMMARY_TASK: &str = "daily_summary";

/// Local wall-clock used by the daily summary task
pub type LocalClock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

// ============================================================================
// Task State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Stopped,
    Running,
}

/// Named periodic job owned by one scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledTask {
    pub name: String,
    pub interval: Duration,
    pub state: TaskState,
    /// Completed cycles since the scheduler started
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
}

/// State shared between the scheduler and its tasks
#[derive(Debug, Default)]
pub struct SchedulerContext {
    running: AtomicBool,
    tasks: Mutex<BTreeMap<String, ScheduledTask>>,
    last_check: Mutex<Option<DateTime<Utc>>>,
}

impl SchedulerContext {
    fn tasks_lock(&self) -> MutexGuard<'_, BTreeMap<String, ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn register(&self, name: &str, interval: Duration) {
        self.tasks_lock().insert(
            name.to_string(),
            ScheduledTask {
                name: name.to_string(),
                interval,
                state: TaskState::Stopped,
                runs: 0,
                last_run: None,
            },
        );
    }

    fn set_state(&self, name: &str, state: TaskState) {
        if let Some(task) = self.tasks_lock().get_mut(name) {
            task.state = state;
        }
    }

    fn stop_all(&self) {
        for task in self.tasks_lock().values_mut() {
            task.state = TaskState::Stopped;
        }
    }

    fn record_run(&self, name: &str) {
        let now = Utc::now();
        if let Some(task) = self.tasks_lock().get_mut(name) {
            task.runs += 1;
            task.last_run = Some(now);
        }
        *self.last_check.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        self.tasks_lock().values().cloned().collect()
    }

    pub fn task(&self, name: &str) -> Option<ScheduledTask> {
        self.tasks_lock().get(name).cloned()
    }

    /// Time of the most recent completed cycle of any task
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        *self.last_check.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable control surface of a scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    context: Arc<SchedulerContext>,
}

impl SchedulerHandle {
    /// Ask every task to finish after its current cycle
    pub fn stop(&self) {
        info!("Stopping trend monitoring");
        self.context.stop();
    }

    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.context
    }
}

// ============================================================================
// Single Check
// ============================================================================

/// Result of fetching once from one source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCheck {
    pub name: String,
    /// Item count, or the error message
    pub result: Result<usize, String>,
}

/// Outcome of [`PollingScheduler::run_single_check`]
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub sources: Vec<SourceCheck>,
    pub notifier_connected: bool,
}

impl CheckReport {
    pub fn all_ok(&self) -> bool {
        self.notifier_connected && self.sources.iter().all(|s| s.result.is_ok())
    }
}

// ============================================================================
// Polling Scheduler
// ============================================================================

struct SourceTask {
    source: SharedSource,
    interval: Duration,
}

pub struct PollingScheduler {
    context: Arc<SchedulerContext>,
    pipeline: Pipeline,
    sources: Vec<SourceTask>,
    clock: LocalClock,
}

impl PollingScheduler {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            context: Arc::new(SchedulerContext::default()),
            pipeline,
            sources: Vec::new(),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Scheduler with the Twitter and Reddit sources from `config`
    pub fn from_config(
        config: &Config,
        store: SharedTrendStore,
        notifier: SharedNotifier,
    ) -> anyhow::Result<Self> {
        let detector = EmergenceDetector::new(ScoreEngine::new(config.scoring));
        let pipeline = Pipeline::new(store, notifier, detector, config.scheduler.clone());
        let mut scheduler = Self::new(pipeline);

        scheduler.add_source(
            Arc::new(TwitterSource::new(&config.twitter)?),
            config.scheduler.twitter_interval(),
        )?;
        scheduler.add_source(
            Arc::new(RedditSource::new(&config.reddit)?),
            config.scheduler.reddit_interval(),
        )?;

        Ok(scheduler)
    }

    /// Replace the local wall-clock
    pub fn with_clock(mut self, clock: LocalClock) -> Self {
        self.clock = clock;
        self
    }

    /// Poll `source` every `interval`
    pub fn add_source(&mut self, source: SharedSource, interval: Duration) -> SchedulerResult<()> {
        if interval.is_zero() {
            return Err(SchedulerError::invalid_interval(source.name()));
        }
        self.sources.push(SourceTask { source, interval });
        Ok(())
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            context: Arc::clone(&self.context),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|t| t.source.name().to_string()).collect()
    }

    /// Run every task until stopped
    ///
    /// Returns once all tasks have observed the stop request, or with
    /// [`SchedulerError::TaskFailed`] as soon as one task dies.
    pub async fn run(&self) -> SchedulerResult<()> {
        let settings = self.pipeline.settings();
        let notification_interval = settings.notification_interval();
        if notification_interval.is_zero() {
            return Err(SchedulerError::invalid_interval(NOTIFICATION_TASK));
        }
        let trigger = DailyTrigger::new(settings.summary_hour)?;

        if self
            .context
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(sources = self.sources.len(), "Starting trend monitoring");

        let mut tasks = JoinSet::new();

        for task in &self.sources {
            let name = task.source.name().to_string();
            self.context.register(&name, task.interval);
            tasks.spawn(source_loop(
                Arc::clone(&self.context),
                self.pipeline.clone(),
                Arc::clone(&task.source),
                task.interval,
            ));
        }

        self.context.register(NOTIFICATION_TASK, notification_interval);
        tasks.spawn(notification_loop(
            Arc::clone(&self.context),
            self.pipeline.clone(),
            notification_interval,
        ));

        self.context
            .register(DAILY_SUMMARY_TASK, settings.summary_check_interval());
        tasks.spawn(daily_summary_loop(
            Arc::clone(&self.context),
            self.pipeline.clone(),
            trigger,
            Arc::clone(&self.clock),
        ));

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduled task failed, stopping scheduler");
                self.context.stop();
                tasks.abort_all();
                outcome = Err(SchedulerError::from(e));
                break;
            }
        }

        self.context.stop();
        self.context.stop_all();
        info!("Trend monitoring stopped");
        outcome
    }

    /// Run until `shutdown` resolves, then stop and let every task finish its cycle
    ///
    /// The run itself is never dropped early: fetches and writes in flight
    /// when `shutdown` fires still complete.
    pub async fn run_until<F>(&self, shutdown: F) -> SchedulerResult<()>
    where
        F: Future<Output = ()>,
    {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            biased;
            result = &mut run => return result,
            _ = shutdown => {
                info!("Shutdown requested, finishing current cycles");
                self.handle().stop();
            }
        }

        run.await
    }

    /// Fetch once from every source without persisting, then test the notifier connection
    pub async fn run_single_check(&self) -> CheckReport {
        info!("Running single trend check");
        let mut sources = Vec::with_capacity(self.sources.len());

        for task in &self.sources {
            let source = &task.source;
            let filters: Vec<String> = source.default_filters().iter().take(1).cloned().collect();

            let result = match source.fetch(&filters, SINGLE_CHECK_LIMIT).await {
                Ok(items) => {
                    info!(source = source.name(), count = items.len(), "Single check fetched");
                    Ok(items.len())
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Single check fetch failed");
                    Err(e.to_string())
                }
            };

            sources.push(SourceCheck {
                name: source.name().to_string(),
                result,
            });
        }

        let notifier_connected = self.pipeline.notifier().test_connection().await;
        info!(notifier_connected, "Single check complete");

        CheckReport {
            sources,
            notifier_connected,
        }
    }
}

// ============================================================================
// Task Loops
// ============================================================================

async fn source_loop(
    context: Arc<SchedulerContext>,
    pipeline: Pipeline,
    source: SharedSource,
    interval: Duration,
) {
    let name = source.name().to_string();
    context.set_state(&name, TaskState::Running);
    info!(task = %name, interval_secs = interval.as_secs(), "Source task started");

    while context.is_running() {
        pipeline.poll_source_once(source.as_ref()).await;
        context.record_run(&name);
        tokio::time::sleep(interval).await;
    }

    context.set_state(&name, TaskState::Stopped);
    info!(task = %name, "Source task stopped");
}

async fn notification_loop(context: Arc<SchedulerContext>, pipeline: Pipeline, interval: Duration) {
    context.set_state(NOTIFICATION_TASK, TaskState::Running);

    while context.is_running() {
        tokio::time::sleep(interval).await;
        if !context.is_running() {
            break;
        }
        pipeline.notify_emerging_once().await;
        context.record_run(NOTIFICATION_TASK);
    }

    context.set_state(NOTIFICATION_TASK, TaskState::Stopped);
}

async fn daily_summary_loop(
    context: Arc<SchedulerContext>,
    pipeline: Pipeline,
    mut trigger: DailyTrigger,
    clock: LocalClock,
) {
    let check_interval = pipeline.settings().summary_check_interval();
    let cooldown = pipeline.settings().summary_cooldown();
    context.set_state(DAILY_SUMMARY_TASK, TaskState::Running);

    while context.is_running() {
        if trigger.try_fire(clock()) {
            pipeline.send_daily_summary().await;
            context.record_run(DAILY_SUMMARY_TASK);
            tokio::time::sleep(cooldown).await;
        } else {
            tokio::time::sleep(check_interval).await;
        }
    }

    context.set_state(DAILY_SUMMARY_TASK, TaskState::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::notifications::NotificationDispatcher;
    use crate::storage::create_memory_store;

    fn scheduler(settings: SchedulerConfig) -> PollingScheduler {
        let pipeline = Pipeline::new(
            create_memory_store(),
            Arc::new(NotificationDispatcher::new()),
            EmergenceDetector::default(),
            settings,
        );
        PollingScheduler::new(pipeline)
    }

    #[test]
    fn test_context_tracks_tasks() {
        let context = SchedulerContext::default();
        context.register("twitter", Duration::from_secs(60));
        context.set_state("twitter", TaskState::Running);
        context.record_run("twitter");

        let task = context.task("twitter").unwrap();
        assert_eq!(task.state, TaskState::Running);
        assert_eq!(task.runs, 1);
        assert!(context.last_check().is_some());

        context.stop_all();
        assert_eq!(context.task("twitter").unwrap().state, TaskState::Stopped);
        assert!(context.task("missing").is_none());
    }

    #[tokio::test]
    async fn test_invalid_summary_hour_rejected() {
        let s = scheduler(SchedulerConfig {
            summary_hour: 30,
            ..Default::default()
        });
        assert!(matches!(s.run().await, Err(SchedulerError::InvalidHour { hour: 30 })));
        assert!(!s.handle().is_running());
    }

    #[test]
    fn test_check_report_all_ok() {
        let report = CheckReport {
            sources: vec![SourceCheck {
                name: "reddit".into(),
                result: Err("Missing credentials".into()),
            }],
            notifier_connected: true,
        };
        assert!(!report.all_ok());
    }
}
