mod clock;
mod list;
mod template;

pub use clock::Clock;
pub use list::ListTimeline;
pub use template::{Template, TemplateTimeline, TemplateTimelineBuilder};

use std::{fmt, sync::Arc, time::Duration};

use crate::{SegmentDescriptor, SegmentPeriod};

/// Segment index of one representation, as exposed by the manifest layer.
///
/// Segment numbers are consecutive: the segment following `n` is always `n + 1`.
/// A lookup returning `None` means the segment is unknown *right now*; on a live
/// manifest it may appear after a refresh.
pub trait Timeline: Send + Sync {
    /// The initialization segment which must precede any media segment, if any.
    fn init_segment(&self) -> Option<SegmentDescriptor> {
        None
    }

    /// The segment playback should begin with, given the playback position and the
    /// amount of media the scheduler wants buffered ahead of it.
    ///
    /// `time` is `None` while nobody has positioned the playback clock.
    fn start_segment(&self, time: Option<Duration>, _buffer_depth: Duration) -> Option<u64> {
        self.segment_at_time(time.unwrap_or_default())
    }

    fn segment_at_position(&self, number: u64) -> Option<SegmentDescriptor>;

    fn segment_at_time(&self, time: Duration) -> Option<u64>;

    /// Locate the segment following `last_period` after the timeline has been
    /// refreshed or replaced. `current` is the number the scheduler would have
    /// requested next on the previous timeline.
    fn refresh_anchor(&self, _current: Option<u64>, last_period: SegmentPeriod) -> Option<u64> {
        self.segment_at_time(last_period.end())
    }

    /// Total presentation duration, unknown for live manifests.
    fn total_duration(&self) -> Option<Duration>;

    fn is_live(&self) -> bool;

    fn minimum_buffer_time(&self) -> Option<Duration> {
        None
    }
}

impl<T> Timeline for Arc<T>
where
    T: Timeline + ?Sized,
{
    fn init_segment(&self) -> Option<SegmentDescriptor> {
        self.as_ref().init_segment()
    }

    fn start_segment(&self, time: Option<Duration>, buffer_depth: Duration) -> Option<u64> {
        self.as_ref().start_segment(time, buffer_depth)
    }

    fn segment_at_position(&self, number: u64) -> Option<SegmentDescriptor> {
        self.as_ref().segment_at_position(number)
    }

    fn segment_at_time(&self, time: Duration) -> Option<u64> {
        self.as_ref().segment_at_time(time)
    }

    fn refresh_anchor(&self, current: Option<u64>, last_period: SegmentPeriod) -> Option<u64> {
        self.as_ref().refresh_anchor(current, last_period)
    }

    fn total_duration(&self) -> Option<Duration> {
        self.as_ref().total_duration()
    }

    fn is_live(&self) -> bool {
        self.as_ref().is_live()
    }

    fn minimum_buffer_time(&self) -> Option<Duration> {
        self.as_ref().minimum_buffer_time()
    }
}

/// One quality variant of a stream.
pub struct Representation {
    id: String,
    bandwidth: u64,
    timeline: Box<dyn Timeline>,
}

impl Representation {
    pub fn new<T>(id: impl Into<String>, bandwidth: u64, timeline: T) -> Self
    where
        T: Timeline + 'static,
    {
        Self {
            id: id.into(),
            bandwidth,
            timeline: Box::new(timeline),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bandwidth(&self) -> u64 {
        self.bandwidth
    }

    pub fn timeline(&self) -> &dyn Timeline {
        self.timeline.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.timeline.is_live()
    }
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Representation")
            .field("id", &self.id)
            .field("bandwidth", &self.bandwidth)
            .field("live", &self.is_live())
            .finish()
    }
}
