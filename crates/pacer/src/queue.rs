use std::{collections::VecDeque, sync::Arc};

use bytes::Bytes;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    buffer::BufferController,
    fetch::{FetchErrorKind, FetchFailure, SegmentFetcher},
    sink::DataSink,
    PacerError, PacerResult, SegmentDescriptor,
};

#[derive(Debug, Clone)]
pub(crate) enum FetchState {
    Pending,
    Done(Bytes),
    Failed(FetchFailure),
}

impl FetchState {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// One fetch of one segment. Dropping the request aborts its fetch.
pub(crate) struct DownloadRequest {
    segment: SegmentDescriptor,
    sequence: u64,
    attempts: u32,
    tolerates_error: bool,
    is_init: bool,
    state: watch::Receiver<FetchState>,
    handle: JoinHandle<()>,
}

impl DownloadRequest {
    fn spawn<F>(
        fetcher: &Arc<F>,
        segment: SegmentDescriptor,
        sequence: u64,
        tolerates_error: bool,
        is_init: bool,
    ) -> Self
    where
        F: SegmentFetcher,
    {
        let (state, handle) = issue(fetcher, &segment);
        Self {
            segment,
            sequence,
            attempts: 1,
            tolerates_error,
            is_init,
            state,
            handle,
        }
    }

    fn reissue<F>(&mut self, fetcher: &Arc<F>)
    where
        F: SegmentFetcher,
    {
        self.handle.abort();
        let (state, handle) = issue(fetcher, &self.segment);
        self.state = state;
        self.handle = handle;
        self.attempts += 1;
    }

    pub(crate) fn is_finished(&self) -> bool {
        !self.outcome().is_pending()
    }

    /// Resolves once the current attempt has completed or failed.
    pub(crate) async fn finished(&mut self) {
        // An error means the fetch task is gone, which `outcome` reports as a failure.
        let _ = self.state.wait_for(|state| !state.is_pending()).await;
    }

    fn outcome(&self) -> FetchState {
        // Check for a closed channel first so a result sent just before closing is seen.
        let closed = self.state.has_changed().is_err();
        let state = self.state.borrow().clone();
        if state.is_pending() && closed {
            return FetchState::Failed(FetchFailure {
                kind: FetchErrorKind::Other,
                message: "fetch task ended without a result".to_string(),
            });
        }
        state
    }

    fn label(&self) -> String {
        if self.is_init {
            format!("init segment ({})", self.segment.url)
        } else {
            format!("segment {}", self.segment.number)
        }
    }
}

impl Drop for DownloadRequest {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn issue<F>(
    fetcher: &Arc<F>,
    segment: &SegmentDescriptor,
) -> (watch::Receiver<FetchState>, JoinHandle<()>)
where
    F: SegmentFetcher,
{
    let (sender, receiver) = watch::channel(FetchState::Pending);
    let fetcher = fetcher.clone();
    let segment = segment.clone();
    let handle = tokio::spawn(async move {
        let state = match fetcher.fetch(&segment).await {
            Ok(data) => FetchState::Done(data),
            Err(e) => FetchState::Failed(e.into()),
        };
        sender.send_replace(state);
    });
    (receiver, handle)
}

/// What servicing the oldest request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Serviced {
    Empty,
    InFlight,
    /// Data is ready but the buffer is full.
    Deferred,
    Delivered { sequence: u64 },
    Dropped { sequence: u64 },
    Retried { sequence: u64, attempt: u32 },
}

/// Requests in the order they were issued. New requests join the back, only the front is
/// ever delivered, so data reaches the sink in issue order whatever order fetches finish in.
pub(crate) struct RequestQueue<F> {
    fetcher: Arc<F>,
    requests: VecDeque<DownloadRequest>,
    capacity: usize,
    max_attempts: u32,
    next_sequence: u64,
}

impl<F> RequestQueue<F>
where
    F: SegmentFetcher,
{
    pub(crate) fn new(fetcher: Arc<F>, capacity: usize, max_attempts: u32) -> Self {
        Self {
            fetcher,
            requests: VecDeque::with_capacity(capacity),
            capacity,
            max_attempts,
            next_sequence: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub(crate) fn slot_available(&self) -> bool {
        self.requests.len() < self.capacity
    }

    pub(crate) fn oldest_mut(&mut self) -> Option<&mut DownloadRequest> {
        self.requests.front_mut()
    }

    /// Start fetching `segment` right away if a slot is free.
    pub(crate) fn enqueue(
        &mut self,
        segment: SegmentDescriptor,
        tolerates_error: bool,
        is_init: bool,
    ) -> PacerResult<u64> {
        if !self.slot_available() {
            return Err(PacerError::NoSlot);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let request =
            DownloadRequest::spawn(&self.fetcher, segment, sequence, tolerates_error, is_init);
        tracing::debug!("Requesting {}", request.label());
        self.requests.push_back(request);
        Ok(sequence)
    }

    /// Deliver, retry or drop the oldest request depending on how its fetch went.
    ///
    /// Fails when the sink rejects data or the request ran out of attempts, both of
    /// which end the download loop.
    pub(crate) async fn service_oldest<S>(
        &mut self,
        sink: &S,
        buffer: &mut BufferController,
    ) -> PacerResult<Serviced>
    where
        S: DataSink,
    {
        let Some(request) = self.requests.front_mut() else {
            return Ok(Serviced::Empty);
        };

        match request.outcome() {
            FetchState::Pending => Ok(Serviced::InFlight),
            FetchState::Done(data) => {
                if buffer.is_full() {
                    return Ok(Serviced::Deferred);
                }

                sink.write(data).await?;
                buffer.on_pushed(request.segment.period.duration);
                tracing::debug!(
                    buffered = ?buffer.buffered(),
                    "Delivered {}",
                    request.label()
                );

                let sequence = request.sequence;
                self.requests.pop_front();
                Ok(Serviced::Delivered { sequence })
            }
            FetchState::Failed(failure) if request.tolerates_error => {
                tracing::debug!("Dropping {}: {failure}", request.label());
                let sequence = request.sequence;
                self.requests.pop_front();
                Ok(Serviced::Dropped { sequence })
            }
            FetchState::Failed(failure) => {
                if request.attempts >= self.max_attempts {
                    tracing::error!(
                        "Fetching {} failed after {} attempts: {failure}",
                        request.label(),
                        request.attempts
                    );
                    let number = request.segment.number;
                    let attempts = request.attempts;
                    self.requests.pop_front();
                    return Err(PacerError::RetriesExhausted { number, attempts });
                }

                tracing::warn!("Fetching {} failed, retrying. {failure}", request.label());
                request.reissue(&self.fetcher);
                Ok(Serviced::Retried {
                    sequence: request.sequence,
                    attempt: request.attempts,
                })
            }
        }
    }

    /// Drop every request, aborting fetches still in flight.
    pub(crate) fn clear(&mut self) {
        self.requests.clear();
    }
}
