use std::{fmt, future::Future, sync::Arc};

use bytes::Bytes;
use reqwest::header::{HeaderMap, RANGE};

use crate::{
    error::{PacerError, PacerResult},
    util::http::HttpClient,
    SegmentDescriptor,
};

/// Transport used to retrieve segment data.
pub trait SegmentFetcher: Send + Sync + 'static {
    fn fetch(&self, segment: &SegmentDescriptor)
        -> impl Future<Output = PacerResult<Bytes>> + Send;
}

impl<F> SegmentFetcher for Arc<F>
where
    F: SegmentFetcher,
{
    fn fetch(
        &self,
        segment: &SegmentDescriptor,
    ) -> impl Future<Output = PacerResult<Bytes>> + Send {
        self.as_ref().fetch(segment)
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: HttpClient,
    headers: Option<HeaderMap>,
}

impl HttpFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }
}

impl SegmentFetcher for HttpFetcher {
    fn fetch(
        &self,
        segment: &SegmentDescriptor,
    ) -> impl Future<Output = PacerResult<Bytes>> + Send {
        let client = self.client.clone();
        let headers = self.headers.clone();
        let url = segment.url.clone();
        let byte_range = segment.byte_range.clone();
        async move {
            let mut request = client.get(url);
            if let Some(headers) = headers {
                request = request.headers(headers);
            }
            if let Some(byte_range) = byte_range {
                request = request.header(RANGE, byte_range.to_http_range());
            }
            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                if let Ok(body) = response.text().await {
                    tracing::debug!("Error body: {body}");
                }
                return Err(PacerError::HttpError(status));
            }

            let bytes = response.bytes().await?;
            Ok(bytes)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Most likely a network or HTTP failure.
    Network,
    Other,
}

/// A fetch error reduced to what the scheduler needs to report it.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl From<PacerError> for FetchFailure {
    fn from(error: PacerError) -> Self {
        let kind = if error.is_network() {
            FetchErrorKind::Network
        } else {
            FetchErrorKind::Other
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FetchErrorKind::Network => write!(f, "network error: {}", self.message),
            FetchErrorKind::Other => f.write_str(&self.message),
        }
    }
}
