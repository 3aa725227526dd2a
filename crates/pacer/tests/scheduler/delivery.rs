use std::time::Duration;

use iori_pacer::{Representation, SchedulerState};

use crate::{
    support::{chunks, list, settle, setup, wait_until, TestFetcher},
    AssertWrapper,
};

#[tokio::test]
async fn test_delivers_in_issue_order() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::gated());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 4, 4)))
        .assert_success();

    wait_until(|| fetcher.issued().len() == 2).await;
    assert_eq!(fetcher.issued(), vec!["a/0", "a/1"]);

    // the second fetch finishing first must not overtake the first
    fetcher.release("a/1");
    settle().await;
    assert!(chunks(&sink).is_empty());

    fetcher.release("a/0");
    wait_until(|| chunks(&sink).len() == 2).await;
    assert_eq!(chunks(&sink), vec!["a/0", "a/1"]);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_at_most_two_in_flight() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::gated());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 8, 1)))
        .assert_success();

    wait_until(|| fetcher.issued().len() == 2).await;
    settle().await;
    assert_eq!(fetcher.issued().len(), 2);

    fetcher.open();
    wait_until(|| sink.is_ended()).await;
    assert_eq!(chunks(&sink).len(), 8);
    assert_eq!(fetcher.peak_in_flight(), 2);
}

#[tokio::test]
async fn test_buffer_fills_to_target_depth() {
    // four 4s segments against a 10s target
    let (scheduler, sink, fetcher) = setup(TestFetcher::gated());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 4, 4)))
        .assert_success();

    wait_until(|| fetcher.issued().len() == 2).await;
    fetcher.release("a/0");
    wait_until(|| fetcher.issued().len() == 3).await;
    fetcher.release("a/1");
    wait_until(|| fetcher.issued().len() == 4).await;
    fetcher.release("a/2");
    wait_until(|| chunks(&sink).len() == 3).await;

    // 12s pushed at playback 0 is over the target, a/3 has to wait
    fetcher.release("a/3");
    settle().await;
    assert_eq!(chunks(&sink).len(), 3);

    scheduler.on_time_updated(Duration::from_secs(2));
    wait_until(|| chunks(&sink).len() == 4).await;
    assert_eq!(chunks(&sink), vec!["a/0", "a/1", "a/2", "a/3"]);
    assert!(!sink.is_ended());

    scheduler.on_time_updated(Duration::from_secs(6));
    wait_until(|| sink.is_ended()).await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test]
async fn test_no_fetch_while_buffer_full() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 10, 4)))
        .assert_success();

    wait_until(|| chunks(&sink).len() == 3).await;
    settle().await;
    let issued = fetcher.issued().len();
    assert!(issued <= 5);
    settle().await;
    assert_eq!(fetcher.issued().len(), issued);
    assert_eq!(chunks(&sink).len(), 3);

    scheduler.on_time_updated(Duration::from_secs(6));
    wait_until(|| fetcher.issued().len() > issued).await;
    settle().await;
    let issued = fetcher.issued().len();
    settle().await;
    assert_eq!(fetcher.issued().len(), issued);

    scheduler.stop().await;
    assert!(fetcher.peak_in_flight() <= 2);
}

#[tokio::test]
async fn test_failed_segment_stops_after_three_attempts() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    fetcher.fail("a/1");
    scheduler
        .start_with(Representation::new("a", 1000, list("a", false, 4, 2)))
        .assert_success();

    wait_until(|| scheduler.state() == SchedulerState::Stopped).await;
    assert_eq!(fetcher.issued_count("a/1"), 3);
    assert_eq!(chunks(&sink), vec!["a/0"]);
    assert!(sink.is_ended());

    let issued = fetcher.issued().len();
    settle().await;
    assert_eq!(fetcher.issued().len(), issued);
}

#[tokio::test]
async fn test_live_failure_is_skipped() {
    let (scheduler, sink, fetcher) = setup(TestFetcher::default());
    fetcher.fail("a/1");
    scheduler
        .start_with(Representation::new("a", 1000, list("a", true, 4, 2)))
        .assert_success();

    wait_until(|| chunks(&sink).len() == 3).await;
    assert_eq!(chunks(&sink), vec!["a/0", "a/2", "a/3"]);
    assert_eq!(fetcher.issued_count("a/1"), 1);
    assert_eq!(scheduler.state(), SchedulerState::Running);

    scheduler.stop().await;
    assert!(sink.is_ended());
}

#[tokio::test]
async fn test_init_segment_comes_first() {
    let (scheduler, sink, _fetcher) = setup(TestFetcher::default());
    let timeline = list("a", false, 2, 2).with_init("https://cdn.test/a/init.mp4".parse().unwrap());
    scheduler
        .start_with(Representation::new("a", 1000, timeline))
        .assert_success();

    wait_until(|| sink.is_ended()).await;
    assert_eq!(chunks(&sink), vec!["a/init", "a/0", "a/1"]);
}
