use std::{sync::Arc, time::Duration};

use super::{PendingSeek, Shared};
use crate::{
    buffer::{BufferController, WaitReason},
    fetch::SegmentFetcher,
    queue::RequestQueue,
    sink::DataSink,
    PacerError, PacerResult, Representation, SchedulerConfig, SegmentDescriptor, SegmentPeriod,
    Timeline,
};

/// Where the loop stands on the current timeline.
#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    /// Number of the next segment to request
    next: Option<u64>,
    /// Period of the last segment requested
    last_period: Option<SegmentPeriod>,
}

enum Exit {
    Stopped,
    /// Every segment of a static timeline has been delivered.
    EndOfStream,
    /// Playback reached the total duration.
    EndOfContent,
    Failed(PacerError),
}

pub(super) struct DownloadLoop<S, F> {
    shared: Arc<Shared>,
    sink: Arc<S>,
    queue: RequestQueue<F>,
    buffer: BufferController,
    default_buffer_depth: Duration,

    representation: Option<Arc<Representation>>,
    cursor: Cursor,
    /// Initialization segment to request before any further media segment
    init_pending: Option<SegmentDescriptor>,
    /// The static timeline has no more segments, only deliveries remain.
    draining: bool,
}

impl<S, F> DownloadLoop<S, F>
where
    S: DataSink,
    F: SegmentFetcher,
{
    pub(super) fn new(
        shared: Arc<Shared>,
        sink: Arc<S>,
        fetcher: Arc<F>,
        config: &SchedulerConfig,
    ) -> Self {
        let buffer = BufferController::new(
            shared.playback.subscribe(),
            config.default_buffer_depth,
            config,
        );
        let queue = RequestQueue::new(fetcher, config.max_in_flight.get(), config.max_retries);

        Self {
            shared,
            sink,
            queue,
            buffer,
            default_buffer_depth: config.default_buffer_depth,
            representation: None,
            cursor: Cursor::default(),
            init_pending: None,
            draining: false,
        }
    }

    pub(super) async fn run(mut self) {
        let exit = match self.sink.clear().await {
            Ok(()) => self.drive().await,
            Err(e) => Exit::Failed(e),
        };

        match exit {
            Exit::Stopped => tracing::info!("Download loop stopped"),
            Exit::EndOfStream => tracing::info!("All segments delivered"),
            Exit::EndOfContent => tracing::info!("Playback reached the end of the content"),
            Exit::Failed(e) => tracing::error!("Download loop failed: {e}"),
        }

        self.queue.clear();
        self.shared.suspend.close();
        if let Err(e) = self.sink.end_of_stream().await {
            tracing::warn!("Failed to end the stream: {e}");
        }
    }

    async fn drive(&mut self) -> Exit {
        loop {
            if self.shared.cancel.is_cancelled() || !self.shared.suspend.checkpoint().await {
                return Exit::Stopped;
            }

            if let Err(e) = self
                .queue
                .service_oldest(self.sink.as_ref(), &mut self.buffer)
                .await
            {
                return Exit::Failed(e);
            }

            if let Err(e) = self.apply_seek().await {
                return Exit::Failed(e);
            }
            self.apply_swap();

            let Some(representation) = self.representation.clone() else {
                self.wait(WaitReason::NoSegment).await;
                continue;
            };
            let timeline = representation.timeline();

            if self.draining {
                if self.queue.is_empty() {
                    return Exit::EndOfStream;
                }
                self.wait(WaitReason::Draining).await;
                continue;
            }

            let next = match self.cursor.next {
                Some(next) => next,
                None => match self.locate(timeline) {
                    Some(next) => next,
                    None => {
                        self.wait(WaitReason::NoSegment).await;
                        continue;
                    }
                },
            };

            if self.buffer.is_full() {
                self.wait(WaitReason::BufferFull).await;
                continue;
            }

            if let Some(init) = self.init_pending.clone() {
                match self.queue.enqueue(init, false, true) {
                    Ok(_) => self.init_pending = None,
                    Err(_) => self.wait(WaitReason::NoSlot).await,
                }
                continue;
            }

            let Some(segment) = timeline.segment_at_position(next) else {
                if timeline.is_live() {
                    self.wait(WaitReason::SegmentUnavailable).await;
                } else {
                    tracing::debug!("No segment {next}, draining the queue");
                    self.draining = true;
                }
                continue;
            };

            let period = segment.period;
            if self.queue.enqueue(segment, timeline.is_live(), false).is_err() {
                self.wait(WaitReason::NoSlot).await;
                continue;
            }
            self.cursor.last_period = Some(period);
            self.cursor.next = Some(next + 1);

            // Live content never ends here, only through `stop`.
            if !timeline.is_live() {
                if let Some(total) = timeline.total_duration() {
                    if self.buffer.playback_time() >= total {
                        return Exit::EndOfContent;
                    }
                }
            }
        }
    }

    async fn wait(&mut self, reason: WaitReason) {
        self.buffer
            .wait_for_progress(reason, &mut self.queue, &self.shared.cancel)
            .await;
    }

    /// Work out the next segment on `timeline`: right after the last one requested if
    /// there was one, otherwise where playback should start.
    fn locate(&mut self, timeline: &dyn Timeline) -> Option<u64> {
        let next = match self.cursor.last_period {
            Some(last_period) => timeline.refresh_anchor(self.cursor.next, last_period),
            None => {
                let position = self.buffer.position();
                let next = timeline.start_segment(position, self.buffer.target_depth())?;
                if let Some(segment) = timeline.segment_at_position(next) {
                    let start = segment.period.start;
                    self.buffer.anchor(start);
                    // An unpositioned clock starts where the first segment does.
                    self.shared.playback.send_if_modified(|time| match time {
                        Some(_) => false,
                        None => {
                            *time = Some(start);
                            true
                        }
                    });
                }
                Some(next)
            }
        };
        self.cursor.next = next;
        next
    }

    fn apply_swap(&mut self) {
        let Some(representation) = self.shared.pending.lock().take() else {
            return;
        };
        tracing::info!(
            id = representation.id(),
            bandwidth = representation.bandwidth(),
            "Switching representation"
        );

        let timeline = representation.timeline();
        self.buffer.set_target_depth(
            timeline
                .minimum_buffer_time()
                .unwrap_or(self.default_buffer_depth),
        );
        self.init_pending = timeline.init_segment();
        *self.shared.current.lock() = Some(representation.clone());

        // A cursor placed by a seek, with nothing requested since, stays where it is.
        let placed = self.cursor.next.is_some() && self.cursor.last_period.is_none();
        if !placed && self.locate(timeline).is_none() {
            tracing::warn!("Could not locate the next segment on the new representation");
        }
        self.representation = Some(representation);
    }

    async fn apply_seek(&mut self) -> PacerResult<()> {
        let Some(PendingSeek { number, anchor }) = self.shared.seek.lock().take() else {
            return Ok(());
        };
        tracing::debug!(?anchor, "Restarting at segment {number}");

        self.queue.clear();
        self.sink.clear().await?;
        self.buffer.anchor(anchor);
        self.cursor = Cursor {
            next: Some(number),
            last_period: None,
        };
        self.draining = false;
        self.init_pending = self
            .representation
            .as_ref()
            .and_then(|representation| representation.timeline().init_segment());
        Ok(())
    }
}
