use std::{sync::Arc, time::Duration};

use iori_pacer::{PacerError, Representation, SchedulerState};

use crate::{
    support::{chunks, list, segment_url, settle, setup, wait_until, TestFetcher},
    AssertWrapper,
};

#[tokio::test]
async fn test_start_requires_representation() {
    let (scheduler, _sink, _fetcher) = setup(TestFetcher::default());
    assert!(matches!(
        scheduler.start(),
        Err(PacerError::NoRepresentation)
    ));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_start_only_once() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());
    scheduler
        .set_representation(Representation::new("a", 1000, list("a", true, 2, 2)))
        .assert_success();
    scheduler.start().assert_success();
    wait_until(|| sink.clears() == 1).await;

    assert!(matches!(scheduler.start(), Err(PacerError::AlreadyStarted)));
    assert!(matches!(
        scheduler.set_representation(Representation::new("b", 1000, list("b", true, 2, 2))),
        Err(PacerError::AlreadyStarted)
    ));

    scheduler.stop().await;
    assert!(matches!(scheduler.start(), Err(PacerError::AlreadyStarted)));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());

    // not started yet
    scheduler.stop().await;
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 2, 2)))
        .assert_success();
    wait_until(|| chunks(&sink).len() == 2).await;

    scheduler.stop().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(sink.is_ended());

    scheduler.stop().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test]
async fn test_static_content_ends_with_playback() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 20, 1)))
        .assert_success();

    wait_until(|| chunks(&sink).len() == 11).await;
    settle().await;
    assert_eq!(scheduler.state(), SchedulerState::Running);

    scheduler.on_time_updated(Duration::from_secs(20));
    wait_until(|| scheduler.state() == SchedulerState::Stopped).await;
    assert!(sink.is_ended());
    assert!(chunks(&sink).len() < 20);
}

#[tokio::test]
async fn test_live_content_does_not_end_with_playback() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 4, 2)))
        .assert_success();

    wait_until(|| chunks(&sink).len() == 4).await;
    scheduler.on_time_updated(Duration::from_secs(3600));
    settle().await;
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert!(!sink.is_ended());

    scheduler.stop().await;
}

#[tokio::test]
async fn test_suspend_parks_download_loop() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    let timeline = Arc::new(list("a", true, 2, 2));
    scheduler
        .start_with(Representation::new("a", 1000, timeline.clone()))
        .assert_success();
    wait_until(|| chunks(&sink).len() == 2).await;

    scheduler.suspend().await;
    assert_eq!(scheduler.state(), SchedulerState::Suspended);

    timeline.push(segment_url("a", 2), Duration::from_secs(2));
    timeline.push(segment_url("a", 3), Duration::from_secs(2));
    scheduler.on_time_updated(Duration::from_secs(1));
    settle().await;
    assert_eq!(fetcher.issued().len(), 2);

    scheduler.resume();
    wait_until(|| chunks(&sink).len() == 4).await;
    assert_eq!(chunks(&sink), vec!["a/0", "a/1", "a/2", "a/3"]);
    assert_eq!(scheduler.state(), SchedulerState::Running);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_stop_releases_suspended_loop() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 2, 2)))
        .assert_success();

    scheduler.suspend().await;
    scheduler.stop().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(sink.is_ended());

    // nothing left to park
    scheduler.suspend().await;
}

#[tokio::test]
async fn test_seek_restarts_at_segment() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 10, 4)))
        .assert_success();
    wait_until(|| chunks(&sink).len() == 3).await;

    assert_eq!(
        scheduler.seek(Duration::from_secs(21)).assert_success(),
        Duration::from_secs(20)
    );
    wait_until(|| sink.clears() == 2 && chunks(&sink).len() >= 3).await;
    assert_eq!(chunks(&sink)[..3], ["a/5", "a/6", "a/7"]);

    assert!(matches!(
        scheduler.seek(Duration::from_secs(100)),
        Err(PacerError::SegmentNotFound)
    ));

    scheduler.stop().await;
}
