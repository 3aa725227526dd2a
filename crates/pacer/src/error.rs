use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacerError {
    #[error("No download slot available")]
    NoSlot,

    #[error("Segment not found")]
    SegmentNotFound,

    #[error("Segment {number} failed after {attempts} attempts")]
    RetriesExhausted { number: u64, attempts: u32 },

    #[error("No representation has been set")]
    NoRepresentation,

    #[error("Representation updates require a live manifest")]
    NotLive,

    #[error("Scheduler has already been started")]
    AlreadyStarted,

    #[error("Data sink has been closed")]
    SinkClosed,

    #[error("Invalid segment template: {0}")]
    InvalidTemplate(String),

    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),
}

impl PacerError {
    /// Whether the error most likely originates from the network or the remote server.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::RequestError(_))
    }
}

pub type PacerResult<T> = Result<T, PacerError>;
