use std::{fmt, time::Duration};

use url::Url;

use crate::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamType {
    Video,
    Audio,
    Text,
}

impl StreamType {
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        if mime_type.starts_with("video") {
            Some(Self::Video)
        } else if mime_type.starts_with("audio") {
            Some(Self::Audio)
        } else if mime_type.starts_with("text") || mime_type == "application/ttml+xml" {
            Some(Self::Text)
        } else {
            None
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
        })
    }
}

/// Position of a segment on the presentation timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentPeriod {
    pub start: Duration,
    pub duration: Duration,
}

impl SegmentPeriod {
    pub fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    pub fn contains(&self, time: Duration) -> bool {
        time >= self.start && time < self.end()
    }
}

/// One fetchable unit of a representation.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    /// Position of the segment in its timeline. Consecutive segments have consecutive numbers.
    pub number: u64,
    pub url: Url,
    pub byte_range: Option<ByteRange>,
    pub period: SegmentPeriod,
}

impl SegmentDescriptor {
    pub fn new(number: u64, url: Url, period: SegmentPeriod) -> Self {
        Self {
            number,
            url,
            byte_range: None,
            period,
        }
    }

    /// An initialization segment occupies no time on the timeline.
    pub fn initialization(url: Url) -> Self {
        Self::new(0, url, SegmentPeriod::default())
    }

    pub fn with_byte_range(mut self, byte_range: ByteRange) -> Self {
        self.byte_range = Some(byte_range);
        self
    }
}
