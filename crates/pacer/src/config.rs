use std::{num::NonZeroUsize, time::Duration};

/// Tunables of a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Requests held by the queue at once, in flight or waiting for delivery.
    pub max_in_flight: NonZeroUsize,
    /// Failed attempts after which a non-tolerant request stops the scheduler.
    pub max_retries: u32,
    /// Buffer depth used when the manifest does not specify a minimum buffer time.
    pub default_buffer_depth: Duration,
    /// Longest wait on the oldest in-flight fetch before re-evaluating.
    pub fetch_wait: Duration,
    /// Longest wait on a playback clock tick before re-evaluating.
    pub tick_wait: Duration,
    /// Window during which an identical wait reason is reported only once.
    pub log_throttle: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: NonZeroUsize::new(2).unwrap(),
            max_retries: 3,
            default_buffer_depth: Duration::from_secs(10),
            fetch_wait: Duration::from_millis(250),
            tick_wait: Duration::from_millis(500),
            log_throttle: Duration::from_secs(5),
        }
    }
}
