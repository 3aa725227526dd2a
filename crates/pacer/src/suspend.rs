use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    SuspendRequested,
    Parked,
    Closed,
}

/// Rendezvous between a caller asking the download loop to pause and the loop itself.
///
/// [`SuspendCoordinator::suspend`] returns only once the loop has parked at its
/// checkpoint, so that no fetch is issued after it returns and before
/// [`SuspendCoordinator::resume`].
pub(crate) struct SuspendCoordinator {
    phase: watch::Sender<Phase>,
}

impl SuspendCoordinator {
    pub(crate) fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self { phase }
    }

    /// Ask the loop to park and wait until it has.
    ///
    /// Also returns when the request is withdrawn by [`SuspendCoordinator::resume`]
    /// or the coordinator is closed.
    pub(crate) async fn suspend(&self) {
        let mut phase = self.phase.subscribe();
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::SuspendRequested;
                true
            } else {
                false
            }
        });
        let _ = phase
            .wait_for(|phase| *phase != Phase::SuspendRequested)
            .await;
    }

    pub(crate) fn resume(&self) {
        self.phase.send_if_modified(|phase| {
            if matches!(phase, Phase::SuspendRequested | Phase::Parked) {
                *phase = Phase::Running;
                true
            } else {
                false
            }
        });
    }

    /// Release everyone waiting, for good.
    pub(crate) fn close(&self) {
        self.phase.send_replace(Phase::Closed);
    }

    pub(crate) fn is_parked(&self) -> bool {
        *self.phase.borrow() == Phase::Parked
    }

    /// Called by the loop once per iteration. Parks while a suspension is pending.
    ///
    /// Returns `false` if the coordinator was closed.
    pub(crate) async fn checkpoint(&self) -> bool {
        let mut phase = self.phase.subscribe();
        let parked = self.phase.send_if_modified(|phase| {
            if *phase == Phase::SuspendRequested {
                *phase = Phase::Parked;
                true
            } else {
                false
            }
        });
        if !parked {
            return *phase.borrow() != Phase::Closed;
        }

        tracing::info!("Download loop suspended");
        let running = match phase
            .wait_for(|phase| matches!(phase, Phase::Running | Phase::Closed))
            .await
        {
            Ok(phase) => *phase == Phase::Running,
            Err(_) => false,
        };
        if running {
            tracing::info!("Download loop resumed");
        }
        running
    }
}
