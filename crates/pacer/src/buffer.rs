use std::{fmt, time::Duration};

use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{fetch::SegmentFetcher, queue::RequestQueue, SchedulerConfig};

/// Why the download loop is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitReason {
    /// No segment to start from could be located.
    NoSegment,
    /// The next segment has not been published yet.
    SegmentUnavailable,
    BufferFull,
    NoSlot,
    /// The timeline has ended, remaining requests are being delivered.
    Draining,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoSegment => "no segment to start from",
            Self::SegmentUnavailable => "next segment not available yet",
            Self::BufferFull => "buffer is full",
            Self::NoSlot => "no download slot available",
            Self::Draining => "delivering remaining segments",
        })
    }
}

/// Reports a wait reason at most once per window while it stays the same.
#[derive(Debug)]
pub(crate) struct WaitThrottle {
    window: Duration,
    last: Option<(WaitReason, Instant)>,
}

impl WaitThrottle {
    pub(crate) fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub(crate) fn should_report(&mut self, reason: WaitReason, now: Instant) -> bool {
        match self.last {
            Some((last, at)) if last == reason && now.duration_since(at) < self.window => false,
            _ => {
                self.last = Some((reason, now));
                true
            }
        }
    }
}

/// Tracks how far the pushed media runs ahead of playback.
pub(crate) struct BufferController {
    /// Presentation time up to which media has been written to the sink
    pushed: Duration,
    target_depth: Duration,
    /// Playback clock, `None` until it has been positioned
    playback: watch::Receiver<Option<Duration>>,
    fetch_wait: Duration,
    tick_wait: Duration,
    throttle: WaitThrottle,
}

impl BufferController {
    pub(crate) fn new(
        playback: watch::Receiver<Option<Duration>>,
        target_depth: Duration,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            pushed: Duration::ZERO,
            target_depth,
            playback,
            fetch_wait: config.fetch_wait,
            tick_wait: config.tick_wait,
            throttle: WaitThrottle::new(config.log_throttle),
        }
    }

    /// Latest playback position. Reading it marks the current tick as seen.
    pub(crate) fn position(&mut self) -> Option<Duration> {
        *self.playback.borrow_and_update()
    }

    pub(crate) fn playback_time(&mut self) -> Duration {
        self.position().unwrap_or_default()
    }

    pub(crate) fn pushed(&self) -> Duration {
        self.pushed
    }

    pub(crate) fn buffered(&mut self) -> Duration {
        self.pushed.saturating_sub(self.playback_time())
    }

    pub(crate) fn is_full(&mut self) -> bool {
        self.buffered() > self.target_depth
    }

    pub(crate) fn on_pushed(&mut self, duration: Duration) {
        self.pushed += duration;
    }

    /// Restart accounting at `position`, after a seek or a fresh start.
    pub(crate) fn anchor(&mut self, position: Duration) {
        self.pushed = position;
    }

    pub(crate) fn target_depth(&self) -> Duration {
        self.target_depth
    }

    pub(crate) fn set_target_depth(&mut self, target_depth: Duration) {
        self.target_depth = target_depth;
    }

    /// Sleep until something the loop is waiting on may have changed.
    ///
    /// With every slot taken by an unfinished fetch this waits for the oldest one,
    /// otherwise for the next playback tick. Both waits are bounded so that state
    /// changes nobody signals, like a manifest refresh, are still picked up.
    pub(crate) async fn wait_for_progress<F>(
        &mut self,
        reason: WaitReason,
        queue: &mut RequestQueue<F>,
        cancel: &CancellationToken,
    ) where
        F: SegmentFetcher,
    {
        if self.throttle.should_report(reason, Instant::now()) {
            let buffered = self.buffered();
            tracing::debug!(
                ?buffered,
                target = ?self.target_depth,
                in_flight = queue.len(),
                "Waiting: {reason}"
            );
        }

        let oldest = if queue.slot_available() {
            None
        } else {
            queue.oldest_mut().filter(|request| !request.is_finished())
        };

        match oldest {
            Some(request) => {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::timeout(self.fetch_wait, request.finished()) => {}
                }
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::timeout(self.tick_wait, self.playback.changed()) => {}
                }
            }
        }
    }
}
