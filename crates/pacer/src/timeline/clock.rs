use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::{HttpClient, PacerError, PacerResult};

/// Wall clock used to locate the live edge, optionally corrected against a time server.
#[derive(Debug, Default)]
pub struct Clock {
    /// How much time the local clock is behind the remote clock, in milliseconds
    offset_ms: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(offset: TimeDelta) -> Self {
        Self {
            offset_ms: AtomicI64::new(offset.num_milliseconds()),
        }
    }

    pub fn offset(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.offset_ms.load(Ordering::Relaxed))
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset()
    }

    fn set_time(
        &self,
        remote_now: DateTime<Utc>,
        before_request: DateTime<Utc>,
        after_request: DateTime<Utc>,
    ) {
        // The server produced `remote_now` roughly half a round trip before the response arrived.
        let half_rtt = (after_request - before_request) / 2;
        let offset = remote_now + half_rtt - after_request;
        self.offset_ms
            .store(offset.num_milliseconds(), Ordering::Relaxed);
        tracing::info!(offset_milliseconds = %offset.num_milliseconds(), "Clock time set to {remote_now}");
    }

    /// Synchronize with a `urn:mpeg:dash:utc:http-iso:2014` / `http-xsdate` endpoint.
    pub async fn sync_iso(&self, client: &HttpClient, url: &str) -> PacerResult<()> {
        let before_request = Utc::now();
        let response = client.get(url).send().await?;
        let after_request = Utc::now();
        if !response.status().is_success() {
            return Err(PacerError::HttpError(response.status()));
        }

        let text = response.text().await?;
        let remote_now = parse_iso8601(text.trim()).ok_or_else(|| {
            PacerError::IOError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid time response: {text}"),
            ))
        })?;
        self.set_time(remote_now, before_request, after_request);
        Ok(())
    }

    /// Synchronize with the `Date` header of a `urn:mpeg:dash:utc:http-head:2014` endpoint.
    pub async fn sync_http_head(&self, client: &HttpClient, url: &str) -> PacerResult<()> {
        let before_request = Utc::now();
        let response = client.head(url).send().await?;
        let after_request = Utc::now();
        if !response.status().is_success() {
            return Err(PacerError::HttpError(response.status()));
        }

        let remote_now = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|date| date.to_str().ok())
            .and_then(|date| DateTime::parse_from_rfc2822(date).ok())
            .map(|date| date.with_timezone(&Utc))
            .ok_or_else(|| {
                PacerError::IOError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "missing or invalid Date header",
                ))
            })?;
        self.set_time(remote_now, before_request, after_request);
        Ok(())
    }
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // xsdate values may omit the offset entirely
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .ok()
}
