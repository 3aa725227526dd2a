mod buffer;
mod config;
pub mod error;
pub mod fetch;
mod queue;
mod scheduler;
mod segment;
pub mod sink;
mod suspend;
pub mod timeline;
pub mod util;

pub use config::SchedulerConfig;
pub use error::{PacerError, PacerResult};
pub use fetch::{FetchErrorKind, FetchFailure, HttpFetcher, SegmentFetcher};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerState};
pub use segment::{SegmentDescriptor, SegmentPeriod, StreamType};
pub use sink::{DataSink, MemorySink, WriterSink};
pub use timeline::{Representation, Timeline};
pub use util::{http::HttpClient, range::ByteRange};

// Re-export reqwest so callers can configure the HTTP client.
pub use reqwest;
