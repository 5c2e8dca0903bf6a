//! Integration tests for the polling scheduler
//!
//! These tests run the scheduler on a paused tokio clock and verify:
//! - Each source is polled once per interval, starting immediately
//! - The daily summary fires once inside its window
//! - Stop is cooperative and leaves every task stopped
//! - A dying task stops the whole run
//! - Shutdown lets an in-flight fetch finish and persist its batch
//! - A failing source keeps being polled on its interval

mod common;

use chrono::NaiveDate;
use common::{FakeSource, RecordingNotifier};
use std::sync::Arc;
use std::time::Duration;

use trendbot::analytics::EmergenceDetector;
use trendbot::config::SchedulerConfig;
use trendbot::models::Platform;
use trendbot::notifications::AlertKind;
use trendbot::scheduler::{
    CheckReport, Pipeline, PollingScheduler, SchedulerError, TaskState,
};
use trendbot::storage::create_memory_store;

const MINUTE: Duration = Duration::from_secs(60);

fn scheduler(notifier: Arc<RecordingNotifier>) -> PollingScheduler {
    let pipeline = Pipeline::new(
        create_memory_store(),
        notifier,
        EmergenceDetector::default(),
        SchedulerConfig::default(),
    );

    PollingScheduler::new(pipeline).with_clock(Arc::new(|| {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(20, 1, 0)
            .unwrap()
    }))
}

// ============================================================================
// Run / Stop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sources_polled_on_their_intervals() {
    let notifier = Arc::new(RecordingNotifier::default());
    let twitter = Arc::new(FakeSource::new("twitter", Platform::Twitter));
    let reddit = Arc::new(FakeSource::new("reddit", Platform::Reddit));

    let mut scheduler = scheduler(notifier.clone());
    scheduler.add_source(twitter.clone(), 30 * MINUTE).unwrap();
    scheduler.add_source(reddit.clone(), 45 * MINUTE).unwrap();

    let scheduler = Arc::new(scheduler);
    let handle = scheduler.handle();
    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::time::sleep(95 * MINUTE).await;
    assert!(handle.is_running());
    assert!(matches!(
        scheduler.run().await,
        Err(SchedulerError::AlreadyRunning)
    ));

    handle.stop();
    runner.await.unwrap().unwrap();

    // t = 0, 30, 60, 90 and t = 0, 45, 90
    assert_eq!(twitter.fetches(), 4);
    assert_eq!(reddit.fetches(), 3);

    let tasks = handle.context().tasks();
    assert_eq!(tasks.len(), 4);
    assert!(tasks.iter().all(|t| t.state == TaskState::Stopped));
    assert_eq!(handle.context().task("twitter").unwrap().runs, 4);
    assert!(handle.context().last_check().is_some());
    assert!(!handle.is_running());

    // Fixed clock sits inside the 20:00 window on a single date
    assert_eq!(notifier.count(AlertKind::DailySummary), 1);
    // Steady fake engagement never looks emerging
    assert_eq!(notifier.count(AlertKind::Emerging), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_tick_still_polls_once() {
    let notifier = Arc::new(RecordingNotifier::default());
    let twitter = Arc::new(FakeSource::new("twitter", Platform::Twitter));

    let mut scheduler = scheduler(notifier);
    scheduler.add_source(twitter.clone(), 30 * MINUTE).unwrap();

    let scheduler = Arc::new(scheduler);
    let handle = scheduler.handle();
    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::time::sleep(MINUTE).await;
    handle.stop();
    runner.await.unwrap().unwrap();

    assert_eq!(twitter.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_fetch_keeps_the_batch() {
    let notifier = Arc::new(RecordingNotifier::default());
    let twitter = Arc::new(
        FakeSource::new("twitter", Platform::Twitter).with_delay(Duration::from_secs(10)),
    );

    let mut scheduler = scheduler(notifier);
    scheduler.add_source(twitter.clone(), 30 * MINUTE).unwrap();

    // Shutdown arrives while the first fetch is still waiting on the network
    scheduler
        .run_until(tokio::time::sleep(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(twitter.fetches(), 1);
    assert_eq!(twitter.completed(), 1);
    let stored = scheduler
        .pipeline()
        .store()
        .read_recent(None, 24, 100)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(scheduler.handle().context().task("twitter").unwrap().runs, 1);
    assert!(!scheduler.handle().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_ready_shutdown_returns_cleanly() {
    let twitter = Arc::new(FakeSource::new("twitter", Platform::Twitter));

    let mut scheduler = scheduler(Arc::new(RecordingNotifier::default()));
    scheduler.add_source(twitter.clone(), 30 * MINUTE).unwrap();

    scheduler.run_until(async {}).await.unwrap();

    assert!(twitter.fetches() <= 1);
    assert!(!scheduler.handle().is_running());
    let tasks = scheduler.handle().context().tasks();
    assert!(tasks.iter().all(|t| t.state == TaskState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_failing_source_keeps_polling() {
    let notifier = Arc::new(RecordingNotifier::default());
    let twitter = Arc::new(FakeSource::new("twitter", Platform::Twitter).failing());
    let reddit = Arc::new(FakeSource::new("reddit", Platform::Reddit));

    let mut scheduler = scheduler(notifier);
    scheduler.add_source(twitter.clone(), 30 * MINUTE).unwrap();
    scheduler.add_source(reddit.clone(), 45 * MINUTE).unwrap();

    scheduler
        .run_until(tokio::time::sleep(95 * MINUTE))
        .await
        .unwrap();

    assert_eq!(twitter.fetches(), 4);
    assert_eq!(reddit.fetches(), 3);
    let handle = scheduler.handle();
    let context = handle.context();
    assert_eq!(context.task("twitter").unwrap().runs, 4);
    assert_eq!(context.task("reddit").unwrap().runs, 3);

    let stored = scheduler
        .pipeline()
        .store()
        .read_recent(None, 24, 100)
        .await
        .unwrap();
    assert_eq!(stored.len(), 6);
    assert!(stored.iter().all(|o| o.platform() == Platform::Reddit));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_source_fails_the_run() {
    let notifier = Arc::new(RecordingNotifier::default());
    let healthy = Arc::new(FakeSource::new("reddit", Platform::Reddit));

    let mut scheduler = scheduler(notifier);
    scheduler
        .add_source(
            Arc::new(FakeSource::new("twitter", Platform::Twitter).panicking()),
            30 * MINUTE,
        )
        .unwrap();
    scheduler.add_source(healthy, 45 * MINUTE).unwrap();

    let err = scheduler.run().await.unwrap_err();
    assert!(matches!(err, SchedulerError::TaskFailed { .. }));
    assert!(!err.is_recoverable());
    assert!(!scheduler.handle().is_running());
}

#[test]
fn test_zero_interval_rejected() {
    let mut scheduler = scheduler(Arc::new(RecordingNotifier::default()));
    let err = scheduler
        .add_source(
            Arc::new(FakeSource::new("twitter", Platform::Twitter)),
            Duration::ZERO,
        )
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidInterval { .. }));
    assert!(scheduler.source_names().is_empty());
}

// ============================================================================
// Single Check
// ============================================================================

#[tokio::test]
async fn test_single_check_reports_each_source() {
    let notifier = Arc::new(RecordingNotifier::default());
    let twitter = Arc::new(FakeSource::new("twitter", Platform::Twitter));

    let mut scheduler = scheduler(notifier.clone());
    scheduler.add_source(twitter.clone(), 30 * MINUTE).unwrap();
    scheduler
        .add_source(
            Arc::new(FakeSource::new("reddit", Platform::Reddit).failing()),
            45 * MINUTE,
        )
        .unwrap();

    let report: CheckReport = scheduler.run_single_check().await;

    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.sources[0].result, Ok(3));
    assert!(report.sources[1].result.is_err());
    assert!(report.notifier_connected);
    assert!(!report.all_ok());

    // Nothing is persisted by a single check
    let stored = scheduler
        .pipeline()
        .store()
        .read_recent(None, 24, 100)
        .await
        .unwrap();
    assert!(stored.is_empty());
    assert_eq!(twitter.fetches(), 1);
}
