use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use iori_pacer::{
    timeline::ListTimeline, MemorySink, PacerError, PacerResult, Scheduler, SchedulerBuilder,
    SchedulerConfig, SegmentDescriptor, SegmentFetcher, StreamType,
};
use url::Url;

pub type TestScheduler = Scheduler<Arc<MemorySink>, Arc<TestFetcher>>;

#[derive(Default)]
struct FetchLog {
    issued: Vec<String>,
    in_flight: usize,
    peak: usize,
}

/// Serves the name of each segment as its data.
///
/// A gated fetcher holds every fetch until the segment is released.
#[derive(Default)]
pub struct TestFetcher {
    log: Mutex<FetchLog>,
    gated: AtomicBool,
    released: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
}

struct InFlight<'a>(&'a TestFetcher);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.log.lock().unwrap().in_flight -= 1;
    }
}

impl TestFetcher {
    pub fn gated() -> Self {
        let fetcher = Self::default();
        fetcher.gated.store(true, Ordering::SeqCst);
        fetcher
    }

    pub fn release(&self, name: &str) {
        self.released.lock().unwrap().insert(name.to_string());
    }

    pub fn open(&self) {
        self.gated.store(false, Ordering::SeqCst);
    }

    /// Every fetch of `name` fails with a server error.
    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn issued(&self) -> Vec<String> {
        self.log.lock().unwrap().issued.clone()
    }

    pub fn issued_count(&self, name: &str) -> usize {
        self.issued().iter().filter(|issued| *issued == name).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.log.lock().unwrap().peak
    }

    fn is_released(&self, name: &str) -> bool {
        !self.gated.load(Ordering::SeqCst) || self.released.lock().unwrap().contains(name)
    }
}

impl SegmentFetcher for TestFetcher {
    async fn fetch(&self, segment: &SegmentDescriptor) -> PacerResult<Bytes> {
        let name = name_of(&segment.url);
        {
            let mut log = self.log.lock().unwrap();
            log.issued.push(name.clone());
            log.in_flight += 1;
            log.peak = log.peak.max(log.in_flight);
        }
        let _in_flight = InFlight(self);

        while !self.is_released(&name) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        if self.failing.lock().unwrap().contains(&name) {
            return Err(PacerError::HttpError(
                iori_pacer::reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        Ok(Bytes::from(name))
    }
}

/// `https://cdn.test/a/3.m4s` is named `a/3`.
fn name_of(url: &Url) -> String {
    let path = url.path().trim_start_matches('/');
    match path.rsplit_once('.') {
        Some((name, _)) => name.to_string(),
        None => path.to_string(),
    }
}

pub fn segment_url(representation: &str, name: impl std::fmt::Display) -> Url {
    Url::parse(&format!("https://cdn.test/{representation}/{name}.m4s")).unwrap()
}

/// A list of `count` segments of `seconds` each.
pub fn list(representation: &str, live: bool, count: u64, seconds: u64) -> ListTimeline {
    let timeline = ListTimeline::new(live);
    for number in 0..count {
        timeline.push(
            segment_url(representation, number),
            Duration::from_secs(seconds),
        );
    }
    timeline
}

pub fn config() -> SchedulerConfig {
    SchedulerConfig {
        fetch_wait: Duration::from_millis(10),
        tick_wait: Duration::from_millis(10),
        ..Default::default()
    }
}

pub fn setup(fetcher: TestFetcher) -> (TestScheduler, Arc<MemorySink>, Arc<TestFetcher>) {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let fetcher = Arc::new(fetcher);
    let scheduler = SchedulerBuilder::new(StreamType::Video)
        .config(config())
        .build(sink.clone(), fetcher.clone());
    (scheduler, sink, fetcher)
}

pub fn chunks(sink: &MemorySink) -> Vec<String> {
    sink.chunks()
        .into_iter()
        .map(|chunk| String::from_utf8_lossy(&chunk).into_owned())
        .collect()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met in time");
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
