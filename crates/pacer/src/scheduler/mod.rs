mod download_loop;

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use self::download_loop::DownloadLoop;
use crate::{
    fetch::SegmentFetcher, sink::DataSink, suspend::SuspendCoordinator, PacerError, PacerResult,
    Representation, SchedulerConfig, StreamType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started yet.
    Idle,
    Running,
    /// Parked by [`Scheduler::suspend`] until [`Scheduler::resume`].
    Suspended,
    /// Stopped by the caller, or ended on its own.
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingSeek {
    pub(crate) number: u64,
    pub(crate) anchor: Duration,
}

/// State shared between a [`Scheduler`] and its download loop.
pub(crate) struct Shared {
    /// Representation adopted by the loop.
    pub(crate) current: Mutex<Option<Arc<Representation>>>,
    /// Representation waiting to be adopted at the loop's next swap point.
    pub(crate) pending: Mutex<Option<Arc<Representation>>>,
    pub(crate) seek: Mutex<Option<PendingSeek>>,
    /// Playback clock, `None` until the caller or the loop positions it
    pub(crate) playback: watch::Sender<Option<Duration>>,
    pub(crate) suspend: SuspendCoordinator,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    fn active_representation(&self) -> Option<Arc<Representation>> {
        if let Some(pending) = self.pending.lock().clone() {
            return Some(pending);
        }
        self.current.lock().clone()
    }
}

enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Paces segment downloads of one elementary stream against playback.
///
/// A scheduler keeps a bounded number of fetches in flight, hands their data to the
/// sink strictly in segment order and stops fetching while the media pushed to the
/// sink runs more than the target buffer depth ahead of the playback clock.
///
/// ```text
///                  ┌────────────────┐  on_time_updated   ┌──────────────────┐
///                  │ Playback clock ├────────────────────►                  │
///                  └────────────────┘                    │                  │
///                                                        │  Download loop   │
/// ┌──────────────┐  update_representation  ┌─────────┐   │                  │
/// │   Manifest   ├─────────────────────────►  Swap   ├───►  cursor ─► queue │
/// │   refresh    │                         │ mailbox │   │  (at most N in   │
/// └──────────────┘                         └─────────┘   │     flight)      │
///                                                        └────────┬─────────┘
///                                                                 │ oldest first,
///                                                                 │ while not full
///                                                        ┌────────▼─────────┐
///                                                        │    Data sink     │
///                                                        └──────────────────┘
/// ```
pub struct Scheduler<S, F> {
    stream_type: StreamType,
    config: SchedulerConfig,
    sink: Arc<S>,
    fetcher: Arc<F>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl<S, F> Scheduler<S, F>
where
    S: DataSink,
    F: SegmentFetcher,
{
    pub fn new(stream_type: StreamType, sink: S, fetcher: F) -> Self {
        SchedulerBuilder::new(stream_type).build(sink, fetcher)
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        match &*self.lifecycle.lock() {
            Lifecycle::Idle => SchedulerState::Idle,
            Lifecycle::Running(handle) if handle.is_finished() => SchedulerState::Stopped,
            Lifecycle::Running(_) if self.shared.suspend.is_parked() => SchedulerState::Suspended,
            Lifecycle::Running(_) => SchedulerState::Running,
            Lifecycle::Stopped => SchedulerState::Stopped,
        }
    }

    /// The representation the download loop is currently fetching from.
    pub fn current_representation(&self) -> Option<Arc<Representation>> {
        self.shared.current.lock().clone()
    }

    /// Set the representation to begin with. Only allowed before [`Scheduler::start`].
    pub fn set_representation(&self, representation: Representation) -> PacerResult<()> {
        let lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(PacerError::AlreadyStarted);
        }
        *self.shared.pending.lock() = Some(Arc::new(representation));
        Ok(())
    }

    /// Clear the sink and start the download loop.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) -> PacerResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(PacerError::AlreadyStarted);
        }
        if self.shared.pending.lock().is_none() {
            return Err(PacerError::NoRepresentation);
        }

        let download_loop = DownloadLoop::new(
            self.shared.clone(),
            self.sink.clone(),
            self.fetcher.clone(),
            &self.config,
        );
        let span = tracing::info_span!("pacer", stream = %self.stream_type);
        let handle = tokio::spawn(download_loop.run().instrument(span));
        *lifecycle = Lifecycle::Running(handle);

        tracing::info!("Started {} scheduler", self.stream_type);
        Ok(())
    }

    pub fn start_with(&self, representation: Representation) -> PacerResult<()> {
        self.set_representation(representation)?;
        self.start()
    }

    /// Stop the download loop and wait for it to end the stream.
    ///
    /// Stopping a stopped scheduler does nothing.
    pub async fn stop(&self) {
        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(handle) => handle,
                Lifecycle::Idle => {
                    *lifecycle = Lifecycle::Idle;
                    return;
                }
                Lifecycle::Stopped => return,
            }
        };

        self.shared.cancel.cancel();
        self.shared.suspend.close();
        if let Err(e) = handle.await {
            if e.is_panic() {
                tracing::error!("Download loop panicked: {e}");
            }
        }
        tracing::info!("Stopped {} scheduler", self.stream_type);
    }

    /// Jump to `position` and return the start of the segment containing it, which is
    /// also published as the new playback time.
    pub fn seek(&self, position: Duration) -> PacerResult<Duration> {
        let representation = self
            .shared
            .active_representation()
            .ok_or(PacerError::NoRepresentation)?;
        let timeline = representation.timeline();
        let number = timeline
            .segment_at_time(position)
            .ok_or(PacerError::SegmentNotFound)?;
        let anchor = timeline
            .segment_at_position(number)
            .ok_or(PacerError::SegmentNotFound)?
            .period
            .start;

        tracing::info!(?position, ?anchor, "Seeking to segment {number}");
        *self.shared.seek.lock() = Some(PendingSeek { number, anchor });
        self.shared.playback.send_replace(Some(anchor));
        Ok(anchor)
    }

    /// Hand over a refreshed or different representation of a live manifest.
    ///
    /// The loop adopts it at its next swap point. A representation handed over before
    /// that replaces the previous candidate.
    pub fn update_representation(&self, representation: Representation) -> PacerResult<()> {
        let live = self
            .shared
            .active_representation()
            .is_some_and(|active| active.is_live());
        if !live {
            return Err(PacerError::NotLive);
        }
        *self.shared.pending.lock() = Some(Arc::new(representation));
        Ok(())
    }

    /// The playback position last reported, or the start the loop picked when nobody
    /// positioned it.
    pub fn playback_position(&self) -> Option<Duration> {
        *self.shared.playback.borrow()
    }

    /// Report the playback position.
    pub fn on_time_updated(&self, time: Duration) {
        self.shared.playback.send_replace(Some(time));
    }

    /// Park the download loop and wait until it is parked.
    ///
    /// Returns immediately if the loop is not running.
    pub async fn suspend(&self) {
        if self.state() != SchedulerState::Running {
            return;
        }
        self.shared.suspend.suspend().await;
    }

    pub fn resume(&self) {
        self.shared.suspend.resume();
    }
}

impl<S, F> Drop for Scheduler<S, F> {
    fn drop(&mut self) {
        if let Lifecycle::Running(handle) = &*self.lifecycle.lock() {
            if !handle.is_finished() {
                self.shared.cancel.cancel();
                self.shared.suspend.close();
            }
        }
    }
}

pub struct SchedulerBuilder {
    stream_type: StreamType,
    config: SchedulerConfig,
}

impl SchedulerBuilder {
    pub fn new(stream_type: StreamType) -> Self {
        Self {
            stream_type,
            config: SchedulerConfig::default(),
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_in_flight(mut self, max_in_flight: NonZeroUsize) -> Self {
        self.config.max_in_flight = max_in_flight;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn default_buffer_depth(mut self, depth: Duration) -> Self {
        self.config.default_buffer_depth = depth;
        self
    }

    pub fn build<S, F>(self, sink: S, fetcher: F) -> Scheduler<S, F>
    where
        S: DataSink,
        F: SegmentFetcher,
    {
        let (playback, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            current: Mutex::new(None),
            pending: Mutex::new(None),
            seek: Mutex::new(None),
            playback,
            suspend: SuspendCoordinator::new(),
            cancel: CancellationToken::new(),
        });

        Scheduler {
            stream_type: self.stream_type,
            config: self.config,
            sink: Arc::new(sink),
            fetcher: Arc::new(fetcher),
            shared,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }
}
