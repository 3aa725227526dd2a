use std::{collections::VecDeque, time::Duration};

use parking_lot::RwLock;
use url::Url;

use super::Timeline;
use crate::{ByteRange, SegmentDescriptor, SegmentPeriod};

struct ListState {
    /// Number of the first segment still listed
    first_number: u64,
    segments: VecDeque<SegmentDescriptor>,
    /// Presentation time at which the next pushed segment starts
    next_start: Duration,
}

/// An explicit segment list, as described by `SegmentList` or `SegmentTimeline`.
///
/// A live list grows through [`ListTimeline::push`] as the manifest is refreshed and
/// may drop old entries with [`ListTimeline::expire_before`].
pub struct ListTimeline {
    live: bool,
    init: Option<SegmentDescriptor>,
    minimum_buffer_time: Option<Duration>,
    state: RwLock<ListState>,
}

impl ListTimeline {
    pub fn new(live: bool) -> Self {
        Self {
            live,
            init: None,
            minimum_buffer_time: None,
            state: RwLock::new(ListState {
                first_number: 0,
                segments: VecDeque::new(),
                next_start: Duration::ZERO,
            }),
        }
    }

    pub fn on_demand() -> Self {
        Self::new(false)
    }

    pub fn live() -> Self {
        Self::new(true)
    }

    /// Number the first segment `first_number`, starting at presentation time `start`.
    pub fn starting_at(self, first_number: u64, start: Duration) -> Self {
        {
            let mut state = self.state.write();
            state.first_number = first_number;
            state.next_start = start;
        }
        self
    }

    pub fn with_init(mut self, url: Url) -> Self {
        self.init = Some(SegmentDescriptor::initialization(url));
        self
    }

    pub fn with_minimum_buffer_time(mut self, minimum_buffer_time: Duration) -> Self {
        self.minimum_buffer_time = Some(minimum_buffer_time);
        self
    }

    /// Append a segment directly after the last one and return its number.
    pub fn push(&self, url: Url, duration: Duration) -> u64 {
        self.push_range(url, duration, None)
    }

    pub fn push_range(&self, url: Url, duration: Duration, byte_range: Option<ByteRange>) -> u64 {
        let mut state = self.state.write();
        let number = state.first_number + state.segments.len() as u64;
        let period = SegmentPeriod::new(state.next_start, duration);
        state.next_start = period.end();

        let mut segment = SegmentDescriptor::new(number, url, period);
        segment.byte_range = byte_range;
        state.segments.push_back(segment);
        number
    }

    /// Forget every segment numbered below `number`.
    pub fn expire_before(&self, number: u64) {
        let mut state = self.state.write();
        while state.first_number < number && state.segments.pop_front().is_some() {
            state.first_number += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Timeline for ListTimeline {
    fn init_segment(&self) -> Option<SegmentDescriptor> {
        self.init.clone()
    }

    fn start_segment(&self, time: Option<Duration>, buffer_depth: Duration) -> Option<u64> {
        if let Some(time) = time {
            return self.segment_at_time(time);
        }

        let (first, first_start, newest_end) = {
            let state = self.state.read();
            let front = state.segments.front()?;
            (front.number, front.period.start, state.segments.back()?.period.end())
        };
        if !self.live {
            return Some(first);
        }

        // Unpositioned live playback joins `buffer_depth` behind the newest segment.
        let target = newest_end.saturating_sub(buffer_depth);
        self.segment_at_time(target.max(first_start))
    }

    fn segment_at_position(&self, number: u64) -> Option<SegmentDescriptor> {
        let state = self.state.read();
        let index = number.checked_sub(state.first_number)?;
        state.segments.get(index as usize).cloned()
    }

    fn segment_at_time(&self, time: Duration) -> Option<u64> {
        let state = self.state.read();
        state
            .segments
            .iter()
            .find(|segment| segment.period.contains(time))
            .map(|segment| segment.number)
    }

    fn refresh_anchor(&self, _current: Option<u64>, last_period: SegmentPeriod) -> Option<u64> {
        // If segments expired in the meantime this lands on the oldest one still listed.
        let state = self.state.read();
        state
            .segments
            .iter()
            .find(|segment| segment.period.start >= last_period.end())
            .map(|segment| segment.number)
    }

    fn total_duration(&self) -> Option<Duration> {
        if self.live {
            return None;
        }
        let state = self.state.read();
        state.segments.back().map(|segment| segment.period.end())
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn minimum_buffer_time(&self) -> Option<Duration> {
        self.minimum_buffer_time
    }
}
