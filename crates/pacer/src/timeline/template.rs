// References:
// 1. https://github.com/clitic/vsd/blob/30ca1985e4a467ea3304b11c08d3176deaafd22a/vsd/src/dash/template.rs
// 2. https://dashif.org/Guidelines-TimingModel/#addressing-simple-to-explicit

use std::{collections::HashMap, sync::Arc, sync::LazyLock, time::Duration};

use chrono::{DateTime, Utc};
use regex::{Captures, Regex, Replacer};
use url::Url;

use super::{Clock, Timeline};
use crate::{PacerError, PacerResult, SegmentDescriptor, SegmentPeriod};

// Only %0[width]d is permitted as a format tag, so the substitution is done by hand
// instead of pulling in a printf implementation.
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(RepresentationID|Number|Time|Bandwidth)(?:%0(\d+)d)?\$")
        .expect("template regex is valid")
});

pub struct Template<'a> {
    args: HashMap<&'a str, String>,
}

impl Template<'_> {
    pub const REPRESENTATION_ID: &'static str = "RepresentationID";
    pub const NUMBER: &'static str = "Number";
    pub const TIME: &'static str = "Time";
    pub const BANDWIDTH: &'static str = "Bandwidth";

    pub fn new() -> Self {
        Self {
            args: HashMap::with_capacity(4),
        }
    }

    pub fn insert(&mut self, key: &'static str, value: String) {
        self.args.insert(key, value);
    }

    pub fn resolve(&self, template: &str) -> String {
        TEMPLATE_REGEX
            .replace_all(template, TemplateReplacer(&self.args))
            .to_string()
    }
}

impl Default for Template<'_> {
    fn default() -> Self {
        Self::new()
    }
}

struct TemplateReplacer<'a>(&'a HashMap<&'a str, String>);

impl Replacer for TemplateReplacer<'_> {
    fn replace_append(&mut self, caps: &Captures<'_>, dst: &mut String) {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let Some(value) = caps.get(1).and_then(|key| self.0.get(key.as_str())) else {
            dst.push_str(whole);
            return;
        };

        match caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) {
            Some(width) => dst.push_str(&format!("{value:0>width$}")),
            None => dst.push_str(value),
        }
    }
}

enum Availability {
    Static {
        total_duration: Duration,
    },
    Live {
        availability_start: DateTime<Utc>,
        time_shift_buffer_depth: Option<Duration>,
        suggested_presentation_delay: Duration,
        clock: Arc<Clock>,
    },
}

/// Number-based `SegmentTemplate` addressing with a constant segment duration.
///
/// Presentation time zero is the start of the period, which for live content
/// coincides with the availability start time.
pub struct TemplateTimeline {
    base_url: Url,
    representation_id: String,
    bandwidth: u64,
    media: String,
    initialization: Option<String>,
    start_number: u64,
    /// Segment duration in timescale units, used for `$Time$`
    duration_ticks: u64,
    segment_duration: Duration,
    minimum_buffer_time: Option<Duration>,
    availability: Availability,
}

impl TemplateTimeline {
    pub fn builder(base_url: Url, media: impl Into<String>) -> TemplateTimelineBuilder {
        TemplateTimelineBuilder {
            base_url,
            media: media.into(),
            representation_id: String::new(),
            bandwidth: 0,
            initialization: None,
            start_number: 1,
            timescale: 1,
            duration: None,
            minimum_buffer_time: None,
            availability: None,
        }
    }

    fn resolve_url(&self, template: &str, number: Option<u64>, time: Option<u64>) -> Option<Url> {
        let mut vars = Template::new();
        vars.insert(Template::REPRESENTATION_ID, self.representation_id.clone());
        vars.insert(Template::BANDWIDTH, self.bandwidth.to_string());
        if let Some(number) = number {
            vars.insert(Template::NUMBER, number.to_string());
        }
        if let Some(time) = time {
            vars.insert(Template::TIME, time.to_string());
        }

        let relative = vars.resolve(template);
        self.base_url
            .join(&relative)
            .inspect_err(|e| tracing::warn!("Failed to resolve segment url {relative}: {e}"))
            .ok()
    }

    fn index_of(&self, time: Duration) -> u64 {
        (time.as_nanos() / self.segment_duration.as_nanos()) as u64
    }

    fn period_of(&self, index: u64) -> SegmentPeriod {
        let start = Duration::from_nanos((self.segment_duration.as_nanos() * index as u128) as u64);
        SegmentPeriod::new(start, self.segment_duration)
    }

    /// Presentation time up to which segments have been published.
    fn live_edge(&self) -> Option<Duration> {
        match &self.availability {
            Availability::Static { .. } => None,
            Availability::Live {
                availability_start,
                clock,
                ..
            } => Some((clock.now() - *availability_start).to_std().unwrap_or_default()),
        }
    }

    /// Earliest presentation time still inside the time-shift window.
    fn window_start(&self, edge: Duration) -> Duration {
        match &self.availability {
            Availability::Live {
                time_shift_buffer_depth: Some(depth),
                ..
            } => edge.saturating_sub(*depth),
            _ => Duration::ZERO,
        }
    }
}

impl Timeline for TemplateTimeline {
    fn init_segment(&self) -> Option<SegmentDescriptor> {
        let initialization = self.initialization.as_deref()?;
        self.resolve_url(initialization, None, None)
            .map(SegmentDescriptor::initialization)
    }

    fn start_segment(&self, time: Option<Duration>, buffer_depth: Duration) -> Option<u64> {
        let Some(edge) = self.live_edge() else {
            return self.segment_at_time(time.unwrap_or_default());
        };

        let Availability::Live {
            suggested_presentation_delay,
            ..
        } = &self.availability
        else {
            return None;
        };

        // Start far enough behind the edge to fill the buffer. A positioned playback clock
        // is honoured as long as it stays inside the time-shift window.
        let target = edge.saturating_sub((*suggested_presentation_delay).max(buffer_depth));
        let position = match time {
            Some(time) => time.clamp(self.window_start(edge).min(target), target),
            None => target,
        };
        self.segment_at_time(position)
    }

    fn segment_at_position(&self, number: u64) -> Option<SegmentDescriptor> {
        let index = number.checked_sub(self.start_number)?;
        let mut period = self.period_of(index);

        match &self.availability {
            Availability::Static { total_duration } => {
                if period.start >= *total_duration {
                    return None;
                }
                period.duration = period.duration.min(*total_duration - period.start);
            }
            Availability::Live { .. } => {
                let edge = self.live_edge()?;
                if period.end() > edge || period.end() <= self.window_start(edge) {
                    return None;
                }
            }
        }

        let url = self.resolve_url(&self.media, Some(number), Some(index * self.duration_ticks))?;
        Some(SegmentDescriptor::new(number, url, period))
    }

    fn segment_at_time(&self, time: Duration) -> Option<u64> {
        if let Availability::Static { total_duration } = &self.availability {
            if time >= *total_duration {
                return None;
            }
        }
        Some(self.start_number + self.index_of(time))
    }

    fn refresh_anchor(&self, _current: Option<u64>, last_period: SegmentPeriod) -> Option<u64> {
        let next = self.segment_at_time(last_period.end())?;
        let Some(edge) = self.live_edge() else {
            return Some(next);
        };

        // Fell out of the time-shift window while switching: resume at its oldest segment.
        let earliest = self.start_number + self.index_of(self.window_start(edge));
        Some(next.max(earliest))
    }

    fn total_duration(&self) -> Option<Duration> {
        match &self.availability {
            Availability::Static { total_duration } => Some(*total_duration),
            Availability::Live { .. } => None,
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.availability, Availability::Live { .. })
    }

    fn minimum_buffer_time(&self) -> Option<Duration> {
        self.minimum_buffer_time
    }
}

pub struct TemplateTimelineBuilder {
    base_url: Url,
    media: String,
    representation_id: String,
    bandwidth: u64,
    initialization: Option<String>,
    start_number: u64,
    timescale: u64,
    duration: Option<u64>,
    minimum_buffer_time: Option<Duration>,
    availability: Option<Availability>,
}

impl TemplateTimelineBuilder {
    pub fn representation(mut self, id: impl Into<String>, bandwidth: u64) -> Self {
        self.representation_id = id.into();
        self.bandwidth = bandwidth;
        self
    }

    pub fn initialization(mut self, initialization: impl Into<String>) -> Self {
        self.initialization = Some(initialization.into());
        self
    }

    pub fn start_number(mut self, start_number: u64) -> Self {
        self.start_number = start_number;
        self
    }

    /// Segment duration expressed in `timescale` units per second.
    pub fn duration(mut self, duration: u64, timescale: u64) -> Self {
        self.duration = Some(duration);
        self.timescale = timescale;
        self
    }

    pub fn minimum_buffer_time(mut self, minimum_buffer_time: Duration) -> Self {
        self.minimum_buffer_time = Some(minimum_buffer_time);
        self
    }

    pub fn on_demand(mut self, total_duration: Duration) -> Self {
        self.availability = Some(Availability::Static { total_duration });
        self
    }

    pub fn live(
        mut self,
        availability_start: DateTime<Utc>,
        time_shift_buffer_depth: Option<Duration>,
        suggested_presentation_delay: Duration,
        clock: Arc<Clock>,
    ) -> Self {
        self.availability = Some(Availability::Live {
            availability_start,
            time_shift_buffer_depth,
            suggested_presentation_delay,
            clock,
        });
        self
    }

    pub fn build(self) -> PacerResult<TemplateTimeline> {
        let duration = self.duration.ok_or_else(|| {
            PacerError::InvalidTemplate("segment duration is required".to_string())
        })?;
        if duration == 0 || self.timescale == 0 {
            return Err(PacerError::InvalidTemplate(
                "segment duration and timescale must be positive".to_string(),
            ));
        }
        let availability = self.availability.ok_or_else(|| {
            PacerError::InvalidTemplate("either on_demand or live must be configured".to_string())
        })?;

        let segment_duration = Duration::from_secs_f64(duration as f64 / self.timescale as f64);
        if segment_duration.is_zero() {
            return Err(PacerError::InvalidTemplate(format!(
                "segment duration {duration}/{} is below one nanosecond",
                self.timescale
            )));
        }
        Ok(TemplateTimeline {
            base_url: self.base_url,
            representation_id: self.representation_id,
            bandwidth: self.bandwidth,
            media: self.media,
            initialization: self.initialization,
            start_number: self.start_number,
            duration_ticks: duration,
            segment_duration,
            minimum_buffer_time: self.minimum_buffer_time,
            availability,
        })
    }
}
