//! # Dispatched Calls
//!
//! A dispatched call runs on its own task. The caller keeps a `PendingCall`:
//! a future that resolves exactly once with the call's outcome, plus a way to
//! cancel it and to watch its state.

use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use tokio::sync::oneshot;
use tokio::sync::watch;
use xmlwire::Value;

use crate::call::CallState;
use crate::error::Error;
use crate::error::Result;
use crate::stats::CallStats;
use crate::stats::StatsHandle;

/// Receiving side of a cancellation request.
pub(crate) struct AbortSignal(Option<oneshot::Receiver<()>>);

impl AbortSignal {
    pub(crate) fn new() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(Some(rx)))
    }

    /// A signal that never fires.
    pub(crate) fn never() -> Self {
        Self(None)
    }

    /// Resolves once an abort was requested.
    ///
    /// A dropped sender is not an abort; the signal then never fires.
    pub(crate) async fn aborted(&mut self) {
        if let Some(rx) = self.0.as_mut() {
            if rx.await.is_ok() {
                return;
            }
            self.0 = None;
        }
        std::future::pending::<()>().await
    }
}

/// Handle to a call running on its own task.
///
/// Awaiting it yields the call's value or its error. Dropping it does not
/// cancel the call.
pub struct PendingCall {
    done: oneshot::Receiver<Result<Value>>,
    abort: Option<oneshot::Sender<()>>,
    state: watch::Receiver<CallState>,
    stats: StatsHandle,
}

impl PendingCall {
    pub(crate) fn new(
        done: oneshot::Receiver<Result<Value>>,
        abort: oneshot::Sender<()>,
        state: watch::Receiver<CallState>,
        stats: StatsHandle,
    ) -> Self {
        Self { done, abort: Some(abort), state, stats }
    }

    /// Cancels the call. If it has not completed yet, it fails with `Error::Aborted`
    /// and its transport exchange is torn down.
    pub fn abort(&mut self) {
        if let Some(tx) = self.abort.take() {
            let _ = tx.send(());
        }
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// A receiver notified on every state transition.
    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state.clone()
    }

    pub fn stats(&self) -> CallStats {
        self.stats.snapshot()
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // the task only drops its sender without sending if it was cancelled
        Pin::new(&mut self.done).poll(cx).map(|r| r.unwrap_or(Err(Error::Aborted)))
    }
}
