//! Stop signal shared between the controller and its broadcast loop.

use std::future::Future;
use tokio::sync::watch;

/// Sending half, held by the controller for one run.
///
/// Dropping it also counts as a stop.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
}

/// Receiving half, held by the broadcast loop.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> (Self, StopListener) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, StopListener { rx })
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl StopListener {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // Err means the signal was dropped, which is a stop too
        rx.wait_for(|stopped| *stopped).await.ok();
    }

    /// Drive `fut` unless a stop arrives first.
    ///
    /// Returns `None` when stopped, including when `fut` finished in the same
    /// poll as the stop. A pending `fut` is dropped, so no work it would start
    /// afterwards ever begins.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.stopped() => None,
            output = fut => (!self.is_stopped()).then_some(output),
        }
    }
}
