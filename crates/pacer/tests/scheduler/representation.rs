use std::{sync::Arc, time::Duration};

use iori_pacer::{timeline::ListTimeline, PacerError, Representation, SchedulerState};

use crate::{
    support::{chunks, list, segment_url, settle, setup, wait_until, TestFetcher},
    AssertWrapper,
};

#[tokio::test]
async fn test_live_start_joins_behind_newest_segment() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    // 20s listed, 10s default buffer depth
    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 10, 2)))
        .assert_success();

    wait_until(|| !chunks(&sink).is_empty()).await;
    assert_eq!(fetcher.issued()[0], "a/5");

    scheduler.stop().await;
}

#[tokio::test]
async fn test_live_start_far_into_presentation() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    // segments 100 to 109 cover [200s, 220s)
    let timeline = ListTimeline::live().starting_at(100, Duration::from_secs(200));
    for number in 100..110 {
        timeline.push(segment_url("a", number), Duration::from_secs(2));
    }
    scheduler
        .start_with(Representation::new("a", 1000, timeline))
        .assert_success();

    wait_until(|| chunks(&sink).len() == 5).await;
    assert_eq!(fetcher.issued()[0], "a/105");
    assert_eq!(
        chunks(&sink),
        vec!["a/105", "a/106", "a/107", "a/108", "a/109"]
    );
    assert_eq!(
        scheduler.playback_position(),
        Some(Duration::from_secs(210))
    );

    scheduler.stop().await;
}

#[tokio::test]
async fn test_manifest_buffer_time_sets_target_depth() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    let timeline = list("a", false, 10, 2).with_minimum_buffer_time(Duration::from_secs(4));
    scheduler
        .start_with(Representation::new("a", 1000, timeline))
        .assert_success();

    // 6s pushed is past the 4s target
    wait_until(|| chunks(&sink).len() == 3).await;
    crate::support::settle().await;
    assert_eq!(chunks(&sink).len(), 3);
    assert!(fetcher.issued().len() <= 5);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_swap_continues_after_last_requested_segment() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 3, 2)))
        .assert_success();
    wait_until(|| chunks(&sink).len() == 3).await;

    let next = list("b", true, 6, 2).with_init("https://cdn.test/b/init.mp4".parse().unwrap());
    scheduler
        .update_representation(Representation::new("b", 2000, next))
        .assert_success();

    wait_until(|| chunks(&sink).len() == 7).await;
    assert_eq!(
        chunks(&sink),
        vec!["a/0", "a/1", "a/2", "b/init", "b/3", "b/4", "b/5"]
    );
    assert_eq!(scheduler.current_representation().unwrap().id(), "b");

    scheduler.stop().await;
}

#[tokio::test]
async fn test_update_requires_live_manifest() {
    let (scheduler, _sink, _fetcher) = setup(TestFetcher::default());
    assert!(matches!(
        scheduler.update_representation(Representation::new("a", 1000, list("a", true, 1, 2))),
        Err(PacerError::NotLive)
    ));

    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 4, 2)))
        .assert_success();
    assert!(matches!(
        scheduler.update_representation(Representation::new("b", 1000, list("b", false, 4, 2))),
        Err(PacerError::NotLive)
    ));

    scheduler.stop().await;
}

#[tokio::test]
async fn test_swap_waits_for_segment_after_last_requested() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 3, 2)))
        .assert_success();
    wait_until(|| chunks(&sink).len() == 3).await;

    // b ends where a/2 does, nothing to continue with yet
    let next = Arc::new(list("b", true, 3, 2));
    scheduler
        .update_representation(Representation::new("b", 2000, next.clone()))
        .assert_success();
    settle().await;
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert_eq!(scheduler.current_representation().unwrap().id(), "b");
    assert!(fetcher.issued().iter().all(|name| name.starts_with("a/")));

    next.push(segment_url("b", 3), Duration::from_secs(2));
    wait_until(|| chunks(&sink).len() == 4).await;
    assert_eq!(chunks(&sink), vec!["a/0", "a/1", "a/2", "b/3"]);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_seek_during_pending_swap_is_kept() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 10, 2)))
        .assert_success();
    wait_until(|| !chunks(&sink).is_empty()).await;

    scheduler.suspend().await;
    scheduler
        .update_representation(Representation::new("b", 2000, list("b", true, 10, 2)))
        .assert_success();
    // zero is a real position, not a request to join the live edge
    assert_eq!(
        scheduler.seek(Duration::ZERO).assert_success(),
        Duration::ZERO
    );
    scheduler.resume();

    wait_until(|| sink.clears() == 2 && !chunks(&sink).is_empty()).await;
    assert_eq!(chunks(&sink)[0], "b/0");
    let first_b = fetcher
        .issued()
        .into_iter()
        .find(|name| name.starts_with("b/"));
    assert_eq!(first_b.as_deref(), Some("b/0"));
    assert_eq!(scheduler.playback_position(), Some(Duration::ZERO));

    scheduler.stop().await;
}
